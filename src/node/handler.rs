//! Block handler
//!
//! Thread-safe entry point for everything that touches the chain: blocks
//! from peers, locally mined blocks and pending transactions. All chain
//! mutations happen under one mutex. Nonce search runs outside it, so a
//! block admitted from the network while mining stops the in-flight search.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::consensus::{Block, BlockChain, ChainStats};
use crate::crypto::{Hash, PublicKey};
use crate::error::{ChainError, Result};
use crate::mining::{Miner, MiningResult};
use crate::storage::{ChainDb, View};
use crate::validation::Transaction;

use super::{create_genesis_block, is_genesis_block, GenesisInfo};

#[derive(Debug)]
pub struct BlockHandler {
    chain: Mutex<BlockChain>,
    miner: Miner,
    db: Option<ChainDb>,
    genesis: GenesisInfo,
}

impl BlockHandler {
    /// Wrap a chain that has not advanced past its genesis yet
    pub fn new(chain: BlockChain, miner: Miner, db: Option<ChainDb>) -> Result<Self> {
        let genesis = GenesisInfo::new(chain.state().final_view().block()).ok_or_else(|| {
            ChainError::InvalidCoinbase("genesis coinbase has no outputs".to_string())
        })?;
        Ok(Self {
            chain: Mutex::new(chain),
            miner,
            db,
            genesis,
        })
    }

    /// Build a handler from `config`. With a database configured, the stored
    /// genesis and blocks are replayed; otherwise a fresh genesis paying
    /// `beneficiary` is created.
    pub fn open(config: &NodeConfig, beneficiary: PublicKey) -> Result<Self> {
        let params = config.chain_params()?;
        let db = config.database_path.as_ref().map(ChainDb::open).transpose()?;

        let mut stored = match &db {
            Some(db) => db.iter_blocks().collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        stored.sort_by_key(|b| (b.height, b.hash()));
        let genesis = match stored.iter().position(is_genesis_block) {
            Some(index) => stored.remove(index),
            None => {
                let genesis = create_genesis_block(beneficiary, params.coinbase_reward);
                if let Some(db) = &db {
                    db.store_block(&genesis, &genesis.hash())?;
                }
                genesis
            }
        };

        let chain = BlockChain::new(genesis, params)?;
        let handler = Self::new(chain, Miner::new(beneficiary), db)?;
        let mut replayed = 0usize;
        {
            let mut chain = handler.chain();
            for block in stored {
                let hash = block.hash();
                match chain.try_add_block(block) {
                    Ok(()) => replayed += 1,
                    Err(e) => debug!("Skipping stored block {}: {}", hash, e),
                }
            }
            // equal-height forks replay in key order, not arrival order
            let stored_tip = handler.db.as_ref().map(ChainDb::get_tip).transpose()?.flatten();
            if let Some(tip) = stored_tip {
                if let Err(e) = chain.restore_tip(&tip) {
                    debug!("Keeping replayed tip over stored tip {}: {}", tip, e);
                }
            }
        }
        if replayed > 0 {
            info!("Replayed {} stored blocks", replayed);
        }
        Ok(handler)
    }

    fn chain(&self) -> MutexGuard<'_, BlockChain> {
        self.chain.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, block: &Block, tip: &Hash) {
        if let Some(db) = &self.db {
            if let Err(e) = db.store_block(block, tip) {
                warn!("Failed to persist block {}: {}", block.hash(), e);
            }
        }
    }

    /// Admit a block received from the network
    pub fn process_block(&self, block: Block) -> bool {
        let mut chain = self.chain();
        let tip_before = chain.max_height_view().hash();
        if !chain.add_block(block.clone()) {
            return false;
        }
        let tip = chain.max_height_view().hash();
        self.persist(&block, &tip);
        if tip != tip_before {
            debug!("Tip moved to {}, interrupting miner", block.hash());
            self.miner.stop();
        }
        true
    }

    /// Queue a transaction for the next mined block
    pub fn process_transaction(&self, tx: Transaction) -> bool {
        self.chain().add_transaction(tx)
    }

    /// Mine one block on the current tip and admit it. Returns `None` when
    /// the search was interrupted or the block lost its parent meanwhile.
    pub fn create_block(&self) -> Option<Block> {
        let template = {
            let mut chain = self.chain();
            let template = chain.block_template();
            // under the lock, so a stop from `process_block` is never lost
            self.miner.reset();
            template
        };

        match self.miner.mine(template) {
            MiningResult::Success(block) => {
                let mut chain = self.chain();
                if !chain.add_block(block.clone()) {
                    return None;
                }
                self.persist(&block, &chain.max_height_view().hash());
                Some(block)
            }
            MiningResult::Interrupted => {
                debug!("Mining interrupted");
                None
            }
        }
    }

    pub fn stop_mining(&self) {
        self.miner.stop();
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    /// Snapshot of the current tip
    pub fn latest_view(&self) -> Arc<View> {
        self.chain().max_height_view()
    }

    pub fn stats(&self) -> ChainStats {
        self.chain().stats()
    }

    pub fn genesis(&self) -> &GenesisInfo {
        &self.genesis
    }

    pub fn database(&self) -> Option<&ChainDb> {
        self.db.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{generate_proof_of_work, ChainParams};
    use crate::crypto::PrivateKey;
    use crate::validation::Amount;
    use std::time::Duration;

    fn key(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[seed; 32]).unwrap()
    }

    fn params(difficulty: usize) -> ChainParams {
        ChainParams {
            difficulty,
            ..ChainParams::default()
        }
    }

    fn handler(difficulty: usize) -> BlockHandler {
        let genesis = create_genesis_block(key(1).public_key(), Amount::from_coins(25));
        let chain = BlockChain::new(genesis, params(difficulty)).unwrap();
        BlockHandler::new(chain, Miner::new(key(1).public_key()), None).unwrap()
    }

    #[test]
    fn test_create_block_extends_tip() {
        let handler = handler(1);
        let block = handler.create_block().unwrap();
        assert_eq!(handler.latest_view().hash(), block.hash());
        assert_eq!(handler.stats().latest_height, block.height);
    }

    #[test]
    fn test_process_block_interrupts_miner_on_new_tip() {
        let handler = handler(1);
        let genesis = handler.latest_view().block().clone();
        let nonce = generate_proof_of_work(&genesis, 1);
        let block = Block::new(
            genesis.hash(),
            genesis.height + 1,
            nonce,
            key(2).public_key(),
            Amount::from_coins(25),
            vec![],
        );

        assert!(handler.process_block(block.clone()));
        assert!(handler.miner().is_stopped());
        assert!(!handler.process_block(block));
    }

    #[test]
    fn test_create_block_after_tip_change_mines_on_new_tip() {
        let handler = handler(1);
        let genesis = handler.latest_view().block().clone();
        let nonce = generate_proof_of_work(&genesis, 1);
        let incoming = Block::new(
            genesis.hash(),
            genesis.height + 1,
            nonce,
            key(2).public_key(),
            Amount::from_coins(25),
            vec![],
        );
        assert!(handler.process_block(incoming.clone()));
        assert!(handler.miner().is_stopped());

        let block = handler.create_block().unwrap();
        assert_eq!(block.prev_block_hash, incoming.hash());
        assert!(!handler.miner().is_stopped());
    }

    #[test]
    fn test_new_rejects_genesis_without_payout() {
        let mut coinbase = Transaction::coinbase(Amount::from_coins(25), key(1).public_key(), 1);
        coinbase.outputs.clear();
        coinbase.finalize();
        let genesis = Block::with_coinbase(Hash::zero(), 1, 13, coinbase, vec![]);
        let chain = BlockChain::new(genesis, params(1)).unwrap();

        assert!(matches!(
            BlockHandler::new(chain, Miner::new(key(1).public_key()), None),
            Err(ChainError::InvalidCoinbase(_))
        ));
    }

    #[test]
    fn test_stop_mining_interrupts_search() {
        // far too hard to finish during the test
        let handler = handler(12);
        std::thread::scope(|s| {
            let worker = s.spawn(|| handler.create_block());
            while !worker.is_finished() {
                handler.stop_mining();
                std::thread::sleep(Duration::from_millis(5));
            }
            assert!(worker.join().unwrap().is_none());
        });
    }

    #[test]
    fn test_transactions_flow_into_mined_block() {
        let handler = handler(1);
        let genesis = handler.latest_view().block().clone();
        let mut tx = Transaction::new();
        tx.add_input(genesis.coinbase.hash().unwrap(), 0);
        tx.add_output(Amount::from_coins(25), key(3).public_key());
        tx.sign_input(0, &key(1)).unwrap();
        tx.finalize();

        assert!(handler.process_transaction(tx.clone()));
        let block = handler.create_block().unwrap();
        assert_eq!(block.transactions, vec![tx]);
        assert_eq!(handler.stats().pending, 0);
    }

    #[test]
    fn test_open_replays_database() {
        let dir = std::env::temp_dir().join(format!("powchain-handler-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let config = NodeConfig {
            difficulty: 1,
            database_path: Some(dir.clone()),
            ..NodeConfig::default()
        };
        let beneficiary = key(4).public_key();

        let mined = {
            let handler = BlockHandler::open(&config, beneficiary).unwrap();
            let first = handler.create_block().unwrap();
            let second = handler.create_block().unwrap();
            assert_eq!(second.prev_block_hash, first.hash());
            second
        };

        let reopened = BlockHandler::open(&config, key(5).public_key()).unwrap();
        assert_eq!(reopened.latest_view().hash(), mined.hash());
        assert_eq!(reopened.genesis().beneficiary, beneficiary);
        assert_eq!(reopened.database().unwrap().block_count(), 3);

        drop(reopened);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_open_keeps_tip_between_equal_height_siblings() {
        let dir = std::env::temp_dir().join(format!("powchain-siblings-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let config = NodeConfig {
            difficulty: 1,
            database_path: Some(dir.clone()),
            ..NodeConfig::default()
        };
        let beneficiary = key(4).public_key();

        let siblings = {
            let handler = BlockHandler::open(&config, beneficiary).unwrap();
            let genesis = handler.latest_view().block().clone();
            let nonce = generate_proof_of_work(&genesis, 1);
            let sibling = |seed: u8| {
                Block::new(
                    genesis.hash(),
                    genesis.height + 1,
                    nonce,
                    key(seed).public_key(),
                    Amount::from_coins(25),
                    vec![],
                )
            };
            let (a, b) = (sibling(6), sibling(7));
            assert!(handler.process_block(a.clone()));
            assert!(handler.process_block(b.clone()));
            assert_eq!(handler.latest_view().hash(), b.hash());
            [a, b]
        };

        // whichever sibling arrived last stays the tip, whatever the hash order
        for tip in [&siblings[0], &siblings[1]] {
            let db = ChainDb::open(&dir).unwrap();
            db.store_block(tip, &tip.hash()).unwrap();
            drop(db);

            let reopened = BlockHandler::open(&config, beneficiary).unwrap();
            assert_eq!(reopened.latest_view().hash(), tip.hash());
            assert_eq!(reopened.stats().view_count, 3);
        }

        let _ = std::fs::remove_dir_all(dir);
    }
}
