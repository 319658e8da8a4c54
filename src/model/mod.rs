//! Types that represent the core data model, such as `Amount` and
//! `NormalizedTransaction`.
mod amount;
mod transaction;

pub use amount::{Amount, AmountError};
pub use transaction::NormalizedTransaction;
