//! Record stores. Each table keeps a partition/sort key pair plus two
//! secondary key pairs, and the full record as a JSON body.

mod irp;
mod validation_record;

pub use irp::*;
pub use validation_record::*;

/// Primary and secondary keys of one stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKeys {
    pub pk: String,
    pub sk: String,
    pub gsi1pk: String,
    pub gsi1sk: String,
    pub gsi2pk: String,
    pub gsi2sk: String,
}
