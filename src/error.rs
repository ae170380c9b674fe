//! Error types for encoding, validation and chain-state operations

use thiserror::Error;

use crate::crypto::Hash;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Stored hash does not match recomputed hash")]
    HashMismatch,

    #[error("Unknown parent block {0}")]
    UnknownParent(Hash),

    #[error("Unknown view {0}")]
    UnknownView(Hash),

    #[error("Invalid signature on input {input}")]
    InvalidSignature { input: usize },

    #[error("Double spend or unknown output {tx_hash}:{index}")]
    DoubleSpend { tx_hash: Hash, index: u32 },

    #[error("Input index {0} out of range")]
    InputOutOfRange(usize),

    #[error("Outputs exceed inputs")]
    ValueConservationViolation,

    #[error("Negative output value at position {0}")]
    NegativeOutput(usize),

    #[error("Height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("Block height {height} exceeds cutoff {limit}")]
    CutoffExceeded { height: u64, limit: u64 },

    #[error("Invalid coinbase: {0}")]
    InvalidCoinbase(String),

    #[error("Insufficient proof of work")]
    ProofOfWorkInsufficient,

    #[error("UTXO {tx_hash}:{index} already exists")]
    DuplicateUtxo { tx_hash: Hash, index: u32 },

    #[error("View {0} is final and cannot be deleted")]
    FinalViewProtected(Hash),

    #[error("Block {0} already known")]
    DuplicateBlock(Hash),

    #[error("Only {accepted} of {total} transactions in block are valid")]
    PartialBlock { accepted: usize, total: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sled::Error> for ChainError {
    fn from(e: sled::Error) -> Self {
        ChainError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
