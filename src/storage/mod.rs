//! Storage module - UTXO pool, chain state, pending pool and persistence

mod mempool;
mod state;
mod utxo;
pub mod db;

pub use db::ChainDb;
pub use mempool::*;
pub use state::*;
pub use utxo::*;
