//! Block and transaction admission
//!
//! `BlockChain` ties the view tree, the pending pool and the consensus rules
//! together. Every block, whether mined locally or received from a peer,
//! goes through `try_add_block`.
//!
//! Fork choice is plain height: a new block becomes the tip when its height
//! is at least the current tip's. Two blocks at the same height therefore
//! resolve to whichever was admitted last.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::constants::{
    COINBASE_REWARD, DEFAULT_CUTOFF_AGE, DEFAULT_DIFFICULTY, DEFAULT_FINALITY_DEPTH,
};
use crate::crypto::{Hash, PublicKey};
use crate::error::{ChainError, Result};
use crate::storage::{ChainState, TransactionPool, UtxoPool, View};
use crate::validation::{Amount, Transaction, TxHandler};

use super::{generate_proof_of_work, validate_proof_of_work, Block, MAX_DIFFICULTY};

/// Consensus parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    /// Leading hex zeros required of the puzzle digest
    pub difficulty: usize,
    /// How far past the final view a block may be
    pub cutoff_age: u64,
    /// Distance kept between the tip and the final view
    pub finality_depth: u64,
    pub coinbase_reward: Amount,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            cutoff_age: DEFAULT_CUTOFF_AGE,
            finality_depth: DEFAULT_FINALITY_DEPTH,
            coinbase_reward: COINBASE_REWARD,
        }
    }
}

/// Everything a miner needs to build the next block except the nonce
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub parent_hash: Hash,
    pub parent_nonce: u64,
    pub height: u64,
    pub reward: Amount,
    pub difficulty: usize,
    pub transactions: Vec<Transaction>,
}

impl BlockTemplate {
    /// Finished block paying the reward to `beneficiary`
    pub fn into_block(self, nonce: u64, beneficiary: PublicKey) -> Block {
        Block::new(
            self.parent_hash,
            self.height,
            nonce,
            beneficiary,
            self.reward,
            self.transactions,
        )
    }
}

/// Chain statistics
#[derive(Debug, Clone, Serialize)]
pub struct ChainStats {
    pub latest_height: u64,
    pub latest_hash: String,
    pub final_height: u64,
    pub final_hash: String,
    pub view_count: usize,
    pub pending: usize,
    pub utxo_count: usize,
}

#[derive(Debug)]
pub struct BlockChain {
    state: ChainState,
    pending: TransactionPool,
    params: ChainParams,
}

impl BlockChain {
    pub fn new(genesis: Block, params: ChainParams) -> Result<Self> {
        if params.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::Config(format!(
                "difficulty {} exceeds {}",
                params.difficulty, MAX_DIFFICULTY
            )));
        }
        if params.finality_depth == 0 || params.finality_depth >= params.cutoff_age {
            return Err(ChainError::Config(format!(
                "finality depth {} must be in 1..{}",
                params.finality_depth, params.cutoff_age
            )));
        }
        info!("Chain initialized at genesis {}", genesis.hash());
        Ok(Self {
            state: ChainState::new(genesis)?,
            pending: TransactionPool::new(),
            params,
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Admit `block`, logging the reason when it is rejected
    pub fn add_block(&mut self, block: Block) -> bool {
        let hash = block.hash();
        let height = block.height;
        match self.try_add_block(block) {
            Ok(()) => {
                info!("Accepted block {} at height {}", hash, height);
                true
            }
            Err(e @ ChainError::DuplicateBlock(_)) => {
                debug!("Ignoring block {}: {}", hash, e);
                false
            }
            Err(e) => {
                warn!("Rejected block {} at height {}: {}", hash, height, e);
                false
            }
        }
    }

    /// Validate `block` against its parent view and, if it passes, add it to
    /// the view tree, move the tip and advance finality.
    pub fn try_add_block(&mut self, block: Block) -> Result<()> {
        let parent = self
            .state
            .get_view_by_hash(&block.prev_block_hash)
            .ok_or(ChainError::UnknownParent(block.prev_block_hash))?;
        if self.state.contains(&block.hash()) {
            return Err(ChainError::DuplicateBlock(block.hash()));
        }
        block.verify_hash()?;

        let expected = parent.height() + 1;
        if block.height != expected {
            return Err(ChainError::HeightMismatch {
                expected,
                got: block.height,
            });
        }
        let limit = self.state.final_view().height() + self.params.cutoff_age;
        if block.height > limit {
            return Err(ChainError::CutoffExceeded {
                height: block.height,
                limit,
            });
        }
        if !validate_proof_of_work(
            parent.block().nonce,
            &parent.hash(),
            block.nonce,
            self.params.difficulty,
        ) {
            return Err(ChainError::ProofOfWorkInsufficient);
        }
        self.check_coinbase(&block)?;

        let mut handler = TxHandler::new(parent.utxo_pool().clone());
        let accepted = handler.handle_txs(&block.transactions);
        if accepted.len() != block.transactions.len() {
            return Err(ChainError::PartialBlock {
                accepted: accepted.len(),
                total: block.transactions.len(),
            });
        }

        let included: Vec<Hash> = block
            .transactions
            .iter()
            .filter_map(Transaction::hash)
            .collect();
        let view = self.state.add_view(block)?;

        let latest_height = self.state.latest_view().height();
        if view.height() >= latest_height {
            if view.height() == latest_height {
                debug!("Tip tie at height {}, switching to {}", latest_height, view.hash());
            }
            self.state.update_latest_view(&view.hash())?;
        }
        self.advance_finality()?;

        self.pending.remove_all(included.iter());
        Ok(())
    }

    fn check_coinbase(&self, block: &Block) -> Result<()> {
        let coinbase = &block.coinbase;
        if !coinbase.is_coinbase() {
            return Err(ChainError::InvalidCoinbase("coinbase flag not set".to_string()));
        }
        if !coinbase.inputs.is_empty() {
            return Err(ChainError::InvalidCoinbase("coinbase spends inputs".to_string()));
        }
        if coinbase.coinbase_height() != block.height {
            return Err(ChainError::InvalidCoinbase(format!(
                "coinbase height {} in block at height {}",
                coinbase.coinbase_height(),
                block.height
            )));
        }
        if let Some(index) = coinbase.outputs.iter().position(|o| o.value.is_negative()) {
            return Err(ChainError::NegativeOutput(index));
        }
        match coinbase.total_output_value() {
            Some(total) if total <= self.params.coinbase_reward => Ok(()),
            _ => Err(ChainError::InvalidCoinbase(format!(
                "coinbase pays more than {}",
                self.params.coinbase_reward
            ))),
        }
    }

    /// Keep the final view `finality_depth` blocks behind the tip
    fn advance_finality(&mut self) -> Result<()> {
        let latest = self.state.latest_view();
        let final_height = self.state.final_view().height();
        if latest.height() - final_height <= self.params.finality_depth {
            return Ok(());
        }
        let target_height = latest.height() - self.params.finality_depth;
        let target = self
            .state
            .ancestor_at(&latest.hash(), target_height)
            .unwrap_or_else(|| {
                panic!(
                    "tip {} has no ancestor at height {}",
                    latest.hash(),
                    target_height
                )
            });
        self.state.update_final_view(&target.hash(), target_height)
    }

    /// Move the tip to a known view at the current best height
    pub fn restore_tip(&mut self, hash: &Hash) -> Result<()> {
        let view = self
            .state
            .get_view_by_hash(hash)
            .ok_or(ChainError::UnknownView(*hash))?;
        let latest_height = self.state.latest_view().height();
        if view.height() != latest_height {
            return Err(ChainError::HeightMismatch {
                expected: latest_height,
                got: view.height(),
            });
        }
        self.state.update_latest_view(hash)
    }

    /// Queue a transaction for mining. No validation happens here.
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        let added = self.pending.add(tx);
        if !added {
            debug!("Transaction already pending");
        }
        added
    }

    /// Template on top of the current tip. Pending transactions are retried
    /// until a pass accepts nothing new, so a child queued ahead of its
    /// parent still lands after it. Whatever is left cannot be spent from
    /// the tip plus the rest of the pool and is evicted.
    pub fn block_template(&mut self) -> BlockTemplate {
        let tip = self.state.latest_view();
        let mut remaining = self.pending.transactions().to_vec();
        let mut handler = TxHandler::new(tip.utxo_pool().clone());
        let mut accepted = Vec::with_capacity(remaining.len());
        loop {
            let batch = handler.handle_txs(&remaining);
            if batch.is_empty() {
                break;
            }
            remaining.retain(|tx| !batch.contains(tx));
            accepted.extend(batch);
        }

        if !remaining.is_empty() {
            let evicted: Vec<Hash> = remaining
                .iter()
                .map(|tx| tx.hash().unwrap_or_else(|| tx.compute_hash()))
                .collect();
            let removed = self.pending.remove_all(evicted.iter());
            debug!("Evicted {} invalid pending transactions", removed);
        }

        BlockTemplate {
            parent_hash: tip.hash(),
            parent_nonce: tip.block().nonce,
            height: tip.height() + 1,
            reward: self.params.coinbase_reward,
            difficulty: self.params.difficulty,
            transactions: accepted,
        }
    }

    /// Mine a block on the current tip synchronously and admit it. Returns
    /// the block only if it was accepted.
    pub fn create_block(&mut self, beneficiary: PublicKey) -> Option<Block> {
        let template = self.block_template();
        let tip = self.state.latest_view();
        let nonce = generate_proof_of_work(tip.block(), template.difficulty);
        let block = template.into_block(nonce, beneficiary);
        self.add_block(block.clone()).then_some(block)
    }

    pub fn max_height_view(&self) -> Arc<View> {
        self.state.latest_view()
    }

    pub fn max_height_block(&self) -> Block {
        self.state.latest_view().block().clone()
    }

    pub fn max_height_utxo_pool(&self) -> UtxoPool {
        self.state.latest_view().utxo_pool().clone()
    }

    pub fn transaction_pool(&self) -> &TransactionPool {
        &self.pending
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn stats(&self) -> ChainStats {
        let latest = self.state.latest_view();
        let final_view = self.state.final_view();
        ChainStats {
            latest_height: latest.height(),
            latest_hash: latest.hash().to_hex(),
            final_height: final_view.height(),
            final_hash: final_view.hash().to_hex(),
            view_count: self.state.len(),
            pending: self.pending.len(),
            utxo_count: latest.utxo_pool().len(),
        }
    }
}
