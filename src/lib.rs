//! powchain core library
//!
//! A minimal proof-of-work blockchain: UTXO transactions signed with
//! Schnorr keys, blocks chained by SHA-256, a multi-branch chain state with
//! height-based fork choice and a finality checkpoint that trails the tip.

pub mod codec;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod mining;
pub mod node;
pub mod storage;
pub mod validation;

pub use error::{ChainError, Result};

/// Protocol constants
pub mod constants {
    use crate::validation::Amount;

    /// Number of decimal places in an amount
    pub const DECIMAL_PLACES: u8 = 8;

    /// Height of the genesis block
    pub const GENESIS_HEIGHT: u64 = 1;

    /// Fixed nonce of the genesis block
    pub const GENESIS_NONCE: u64 = 13;

    /// Coinbase reward per block
    pub const COINBASE_REWARD: Amount = Amount::from_coins(25);

    /// Leading hex zeros required of a block's puzzle digest
    pub const DEFAULT_DIFFICULTY: usize = 4;

    /// How many blocks past the final view a new block may be
    pub const DEFAULT_CUTOFF_AGE: u64 = 10;

    /// How many blocks the final view trails the tip
    pub const DEFAULT_FINALITY_DEPTH: u64 = 6;
}
