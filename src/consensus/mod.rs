//! Consensus module - Block structure, proof of work and block admission

mod block;
mod chain;
mod pow;

pub use block::*;
pub use chain::*;
pub use pow::*;
