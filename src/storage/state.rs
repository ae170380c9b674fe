//! Chain state management
//!
//! Keeps one view (block plus the UTXO pool right after it) per known block,
//! across all competing branches. Views are indexed by hash, by height and
//! by parent hash. `latest` is the current best tip; `final_view` is the
//! checkpoint behind which nothing is retained.
//!
//! Views are immutable once built and shared as `Arc<View>`, so callers can
//! take cheap snapshots of the tip without holding any lock.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::consensus::Block;
use crate::crypto::Hash;
use crate::error::{ChainError, Result};

use super::UtxoPool;

/// Ledger state immediately after applying `block`
#[derive(Debug, Clone)]
pub struct View {
    utxo_pool: UtxoPool,
    block: Block,
}

impl View {
    pub fn utxo_pool(&self) -> &UtxoPool {
        &self.utxo_pool
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn height(&self) -> u64 {
        self.block.height
    }

    pub fn hash(&self) -> Hash {
        self.block.hash()
    }
}

/// Pool produced by applying `block`'s coinbase and transactions on top of `base`
fn apply_block(mut pool: UtxoPool, block: &Block) -> Result<UtxoPool> {
    let coinbase_hash = block.coinbase.verify_hash()?;
    pool.apply_transaction(&block.coinbase, coinbase_hash)?;
    for tx in &block.transactions {
        let tx_hash = tx.verify_hash()?;
        pool.apply_transaction(tx, tx_hash)?;
    }
    Ok(pool)
}

#[derive(Debug)]
pub struct ChainState {
    view_by_hash: HashMap<Hash, Arc<View>>,
    hashes_by_height: BTreeMap<u64, BTreeSet<Hash>>,
    hashes_by_parent: HashMap<Hash, BTreeSet<Hash>>,
    latest: Arc<View>,
    final_view: Arc<View>,
}

impl ChainState {
    /// Create a chain state rooted at `genesis`, which becomes both the latest
    /// and the final view.
    pub fn new(genesis: Block) -> Result<Self> {
        genesis.verify_hash()?;
        let utxo_pool = apply_block(UtxoPool::new(), &genesis)?;
        let view = Arc::new(View {
            utxo_pool,
            block: genesis,
        });

        let mut state = Self {
            view_by_hash: HashMap::new(),
            hashes_by_height: BTreeMap::new(),
            hashes_by_parent: HashMap::new(),
            latest: Arc::clone(&view),
            final_view: Arc::clone(&view),
        };
        state.index(view);
        Ok(state)
    }

    fn index(&mut self, view: Arc<View>) {
        let hash = view.hash();
        self.hashes_by_height
            .entry(view.height())
            .or_default()
            .insert(hash);
        self.hashes_by_parent
            .entry(view.block.prev_block_hash)
            .or_default()
            .insert(hash);
        self.view_by_hash.insert(hash, view);
    }

    /// Build and index the view for `block` on top of its parent's view.
    /// Does not move the latest view.
    pub fn add_view(&mut self, block: Block) -> Result<Arc<View>> {
        let hash = block.hash();
        if self.view_by_hash.contains_key(&hash) {
            return Err(ChainError::DuplicateBlock(hash));
        }
        let parent = self
            .view_by_hash
            .get(&block.prev_block_hash)
            .ok_or(ChainError::UnknownParent(block.prev_block_hash))?;

        let utxo_pool = apply_block(parent.utxo_pool.clone(), &block)?;
        let view = Arc::new(View { utxo_pool, block });
        self.index(Arc::clone(&view));
        debug!("Added view {} at height {}", hash, view.height());
        self.assert_indices();
        Ok(view)
    }

    /// Make the view for `hash` the current best tip
    pub fn update_latest_view(&mut self, hash: &Hash) -> Result<()> {
        let view = self
            .view_by_hash
            .get(hash)
            .ok_or(ChainError::UnknownView(*hash))?;
        self.latest = Arc::clone(view);
        Ok(())
    }

    /// Remove the view `root_hash` and every descendant of it. Returns the
    /// number of views removed.
    pub fn delete_branch(&mut self, root_height: u64, root_hash: &Hash) -> Result<usize> {
        let root = self
            .view_by_hash
            .get(root_hash)
            .ok_or(ChainError::UnknownView(*root_hash))?;
        if root.height() != root_height {
            return Err(ChainError::HeightMismatch {
                expected: root.height(),
                got: root_height,
            });
        }
        if *root_hash == self.final_view.hash() {
            return Err(ChainError::FinalViewProtected(*root_hash));
        }

        let parent_hash = root.block.prev_block_hash;
        if let Some(siblings) = self.hashes_by_parent.get_mut(&parent_hash) {
            siblings.remove(root_hash);
            if siblings.is_empty() {
                self.hashes_by_parent.remove(&parent_hash);
            }
        }

        let mut removed = 0;
        let mut queue = VecDeque::from([(*root_hash, root_height)]);
        while let Some((hash, height)) = queue.pop_front() {
            self.unindex_height(height, &hash);
            let view = self.view_by_hash.remove(&hash);
            assert!(
                view.is_some(),
                "chain state index references missing view {hash}"
            );
            removed += 1;
            if let Some(children) = self.hashes_by_parent.remove(&hash) {
                queue.extend(children.into_iter().map(|child| (child, height + 1)));
            }
        }

        debug!("Deleted branch at {} ({} views)", root_hash, removed);
        self.reselect_latest_if_pruned();
        self.assert_indices();
        Ok(removed)
    }

    /// Advance the final view to `hash` at `height`. Everything below the new
    /// final height is dropped, as are all competitors at that height and
    /// their descendants.
    pub fn update_final_view(&mut self, hash: &Hash, height: u64) -> Result<()> {
        let target = self
            .view_by_hash
            .get(hash)
            .cloned()
            .ok_or(ChainError::UnknownView(*hash))?;
        if target.height() != height {
            return Err(ChainError::HeightMismatch {
                expected: target.height(),
                got: height,
            });
        }
        let old_height = self.final_view.height();
        if height < old_height {
            return Err(ChainError::HeightMismatch {
                expected: old_height,
                got: height,
            });
        }
        if target.hash() == self.final_view.hash() {
            return Ok(());
        }

        for h in old_height..height {
            let Some(hashes) = self.hashes_by_height.remove(&h) else {
                continue;
            };
            for pruned in hashes {
                let view = self.view_by_hash.remove(&pruned);
                assert!(
                    view.is_some(),
                    "chain state index references missing view {pruned}"
                );
                self.hashes_by_parent.remove(&pruned);
            }
        }

        let competitors: Vec<Hash> = self
            .hashes_by_height
            .get(&height)
            .map(|set| set.iter().filter(|h| *h != hash).copied().collect())
            .unwrap_or_default();
        self.final_view = target;
        for competitor in competitors {
            self.delete_branch(height, &competitor)?;
        }

        info!("Final view advanced to {} at height {}", hash, height);
        self.reselect_latest_if_pruned();
        self.assert_indices();
        Ok(())
    }

    pub fn get_view_by_hash(&self, hash: &Hash) -> Option<Arc<View>> {
        self.view_by_hash.get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.view_by_hash.contains_key(hash)
    }

    pub fn latest_view(&self) -> Arc<View> {
        Arc::clone(&self.latest)
    }

    pub fn final_view(&self) -> Arc<View> {
        Arc::clone(&self.final_view)
    }

    /// Views at `height`, across all branches
    pub fn views_at_height(&self, height: u64) -> Vec<Arc<View>> {
        self.hashes_by_height
            .get(&height)
            .map(|set| {
                set.iter()
                    .filter_map(|h| self.view_by_hash.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hashes of the known children of `hash`
    pub fn children_of(&self, hash: &Hash) -> Vec<Hash> {
        self.hashes_by_parent
            .get(hash)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Walk back from `hash` to its ancestor (or itself) at `height`
    pub fn ancestor_at(&self, hash: &Hash, height: u64) -> Option<Arc<View>> {
        let mut view = self.view_by_hash.get(hash)?;
        while view.height() > height {
            view = self.view_by_hash.get(&view.block.prev_block_hash)?;
        }
        (view.height() == height).then(|| Arc::clone(view))
    }

    pub fn len(&self) -> usize {
        self.view_by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view_by_hash.is_empty()
    }

    fn unindex_height(&mut self, height: u64, hash: &Hash) {
        if let Some(set) = self.hashes_by_height.get_mut(&height) {
            set.remove(hash);
            if set.is_empty() {
                self.hashes_by_height.remove(&height);
            }
        }
    }

    /// If the latest view was pruned, fall back to the highest retained view
    fn reselect_latest_if_pruned(&mut self) {
        if self.view_by_hash.contains_key(&self.latest.hash()) {
            return;
        }
        let best = self
            .hashes_by_height
            .iter()
            .next_back()
            .and_then(|(_, set)| set.iter().next())
            .and_then(|h| self.view_by_hash.get(h))
            .cloned();
        self.latest = best.unwrap_or_else(|| Arc::clone(&self.final_view));
        info!("Latest view reset to {}", self.latest.hash());
    }

    fn assert_indices(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        let by_height: usize = self.hashes_by_height.values().map(BTreeSet::len).sum();
        assert_eq!(
            by_height,
            self.view_by_hash.len(),
            "height index out of sync with views"
        );
        for (parent, children) in &self.hashes_by_parent {
            for child in children {
                let view = self
                    .view_by_hash
                    .get(child)
                    .unwrap_or_else(|| panic!("parent index references missing view {child}"));
                assert_eq!(view.block.prev_block_hash, *parent, "parent index mismatch");
            }
        }
        assert!(self.view_by_hash.contains_key(&self.latest.hash()), "latest view pruned");
        assert!(
            self.view_by_hash.contains_key(&self.final_view.hash()),
            "final view pruned"
        );
    }
}
