//! Mining module - nonce search over block templates

mod miner;

pub use miner::*;
