//! 错误类型定义模块
//!
//! 定义 RinBSON 公共层的统一错误类型 RinError 和 Result 别名。

use thiserror::Error;

/// RinBSON 公共层错误类型
///
/// 包含公共类型解析、验证过程中可能出现的错误情况。
#[derive(Error, Debug)]
pub enum RinError {
    /// ObjectId 无效
    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    /// 版本号无效
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// 验证错误
    #[error("Validation error: {0}")]
    Validation(String),
}

/// RinBSON 公共层 Result 类型别名
pub type RinResult<T> = Result<T, RinError>;
