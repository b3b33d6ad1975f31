//! 公共类型定义模块
//!
//! 定义 RinBSON 的核心公共类型:
//! - ObjectId: 12 字节唯一标识符(与 MongoDB ObjectId 相同的布局)
//! - Version: 四段式版本号(major.minor.build.revision)

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// ObjectId - 12 字节唯一标识符
///
/// 格式:
/// - 前 4 字节: 时间戳(秒,大端)
/// - 后 8 字节: 随机数(/dev/urandom 或系统熵)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());
        let random: [u8; 8] = rand_bytes();
        bytes[4..12].copy_from_slice(&random);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, crate::error::RinError> {
        let bytes = hex::decode(s)
            .map_err(|e| crate::error::RinError::InvalidObjectId(format!("Invalid hex: {}", e)))?;
        if bytes.len() != 12 {
            return Err(crate::error::RinError::InvalidObjectId(
                "ObjectId must be 12 bytes".to_string(),
            ));
        }
        let mut arr = [0u8; 12];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn rand_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    #[cfg(target_os = "linux")]
    {
        use std::fs::File;
        use std::io::Read;
        if let Ok(mut f) = File::open("/dev/urandom") {
            let _ = f.read_exact(&mut bytes);
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        use std::collections::hash_map::RandomState;
        use std::hash::{BuildHasher, Hasher};
        let state = RandomState::new();
        for chunk in bytes.chunks_mut(8) {
            let hash = state.build_hasher().finish().to_le_bytes();
            let len = chunk.len().min(8);
            chunk.copy_from_slice(&hash[..len]);
        }
    }
    bytes
}

/// 四段式版本号
///
/// 表示 major.minor.build.revision 形式的版本号,
/// build 和 revision 段可以省略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: Option<u32>,
    pub revision: Option<u32>,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    pub fn with_build(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build: Some(build),
            revision: None,
        }
    }

    pub fn with_revision(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build: Some(build),
            revision: Some(revision),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
            if let Some(revision) = self.revision {
                write!(f, ".{}", revision)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = crate::error::RinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(crate::error::RinError::InvalidVersion(format!(
                "Expected 2 to 4 components, got {}",
                parts.len()
            )));
        }
        let parse = |p: &str| {
            p.parse::<u32>()
                .map_err(|e| crate::error::RinError::InvalidVersion(format!("{}: {}", p, e)))
        };
        Ok(Self {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            build: parts.get(2).map(|p| parse(p)).transpose()?,
            revision: parts.get(3).map(|p| parse(p)).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_hex_roundtrip() {
        let id = ObjectId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(ObjectId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn test_object_id_from_hex_rejects_bad_input() {
        assert!(ObjectId::from_hex("zz").is_err());
        assert!(ObjectId::from_hex("0102").is_err());
    }

    #[test]
    fn test_version_parse_display() {
        let v: Version = "1.2.3.4".parse().unwrap();
        assert_eq!(v, Version::with_revision(1, 2, 3, 4));
        assert_eq!(v.to_string(), "1.2.3.4");

        let v: Version = "1.2".parse().unwrap();
        assert_eq!(v, Version::new(1, 2));
        assert_eq!(v.to_string(), "1.2");

        assert!("1".parse::<Version>().is_err());
        assert!("1.2.3.4.5".parse::<Version>().is_err());
    }
}
