//! Genesis block generation
//!
//! The genesis block has an all-zero parent, height `GENESIS_HEIGHT` and the
//! fixed nonce `GENESIS_NONCE`. It is never mined; its only content is a
//! coinbase paying the reward to the chosen beneficiary, so the same
//! beneficiary always yields a byte-identical genesis.

use crate::constants::{GENESIS_HEIGHT, GENESIS_NONCE};
use crate::consensus::Block;
use crate::crypto::{Hash, PublicKey};
use crate::validation::Amount;

/// Create the genesis block
pub fn create_genesis_block(beneficiary: PublicKey, reward: Amount) -> Block {
    Block::new(
        Hash::zero(),
        GENESIS_HEIGHT,
        GENESIS_NONCE,
        beneficiary,
        reward,
        vec![],
    )
}

/// Whether `block` has the shape of a genesis block
pub fn is_genesis_block(block: &Block) -> bool {
    block.is_genesis()
        && block.height == GENESIS_HEIGHT
        && block.nonce == GENESIS_NONCE
        && block.transactions.is_empty()
        && block.coinbase.outputs.len() == 1
}

/// Genesis block statistics
#[derive(Debug)]
pub struct GenesisInfo {
    pub hash: Hash,
    pub height: u64,
    pub nonce: u64,
    pub beneficiary: PublicKey,
    pub reward: Amount,
}

impl GenesisInfo {
    /// `None` when the coinbase pays nobody
    pub fn new(genesis: &Block) -> Option<Self> {
        let payout = genesis.coinbase.outputs.first()?;
        Some(Self {
            hash: genesis.hash(),
            height: genesis.height,
            nonce: genesis.nonce,
            beneficiary: payout.owner,
            reward: payout.value,
        })
    }
}
