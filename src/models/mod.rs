pub mod enums;
pub mod record;

pub use enums::*;
pub use record::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value for {kind}: {value}")]
pub struct InvalidEnum {
    pub kind: String,
    pub value: String,
}
