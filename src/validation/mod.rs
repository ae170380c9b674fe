//! Validation module - amounts, transactions and the transaction handler

mod amount;
mod handler;
mod transaction;

pub use amount::*;
pub use handler::*;
pub use transaction::*;
