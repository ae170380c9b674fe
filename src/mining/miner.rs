//! Block miner implementation
//!
//! Searches a nonce for a block template and assembles the finished block.
//! The search can be interrupted through a shared stop signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::consensus::{search_nonce, Block, BlockTemplate};
use crate::crypto::PublicKey;

/// Mining result
#[derive(Debug)]
pub enum MiningResult {
    /// Successfully mined a block
    Success(Block),
    /// Mining was interrupted
    Interrupted,
}

/// Block miner
#[derive(Debug, Clone)]
pub struct Miner {
    /// Receives the coinbase of every mined block
    beneficiary: PublicKey,
    /// Stop signal
    stop_signal: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(beneficiary: PublicKey) -> Self {
        Self {
            beneficiary,
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn beneficiary(&self) -> &PublicKey {
        &self.beneficiary
    }

    /// Get a stop signal handle
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Stop mining
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Reset stop signal
    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Mine a block (find valid nonce)
    ///
    /// Tries nonces upward from zero until one answers the parent's puzzle
    /// or the stop signal is raised.
    pub fn mine(&self, template: BlockTemplate) -> MiningResult {
        debug!(
            "Mining height {} on {} (difficulty {})",
            template.height, template.parent_hash, template.difficulty
        );
        match search_nonce(
            template.parent_nonce,
            &template.parent_hash,
            template.difficulty,
            0,
            &self.stop_signal,
        ) {
            Some(nonce) => MiningResult::Success(template.into_block(nonce, self.beneficiary)),
            None => MiningResult::Interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::validate_proof_of_work;
    use crate::crypto::{hash_bytes, PrivateKey};
    use crate::validation::Amount;

    fn template() -> BlockTemplate {
        BlockTemplate {
            parent_hash: hash_bytes(b"parent"),
            parent_nonce: 13,
            height: 2,
            reward: Amount::from_coins(25),
            difficulty: 2,
            transactions: vec![],
        }
    }

    fn miner() -> Miner {
        Miner::new(PrivateKey::from_bytes(&[7u8; 32]).unwrap().public_key())
    }

    #[test]
    fn test_mined_block_answers_puzzle() {
        let miner = miner();
        let t = template();
        let MiningResult::Success(block) = miner.mine(t.clone()) else {
            panic!("mining was interrupted");
        };
        assert!(validate_proof_of_work(
            t.parent_nonce,
            &t.parent_hash,
            block.nonce,
            t.difficulty
        ));
        assert_eq!(block.prev_block_hash, t.parent_hash);
        assert_eq!(block.height, 2);
        assert_eq!(block.coinbase.outputs[0].owner, *miner.beneficiary());
        assert!(block.verify_hash().is_ok());
    }

    #[test]
    fn test_miner_stop_signal() {
        let miner = miner();
        let signal = miner.stop_signal();

        assert!(!signal.load(Ordering::SeqCst));

        miner.stop();
        assert!(signal.load(Ordering::SeqCst));
        assert!(matches!(miner.mine(template()), MiningResult::Interrupted));

        miner.reset();
        assert!(!miner.is_stopped());
    }
}
