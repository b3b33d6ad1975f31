pub mod error;
pub mod types;

pub use error::{RinError, RinResult};
pub use types::*;
