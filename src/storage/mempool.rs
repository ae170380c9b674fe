//! Pending transaction pool
//!
//! Transactions waiting to be mined, kept in arrival order. Admission does
//! not validate anything; a transaction is only checked when a block
//! template is assembled against the current tip.

use std::collections::HashSet;

use crate::crypto::Hash;
use crate::validation::Transaction;

#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
    hashes: HashSet<Hash>,
}

/// Identity used for deduplication. Unfinalized transactions are keyed by
/// what their hash would be.
fn pool_key(tx: &Transaction) -> Hash {
    tx.hash().unwrap_or_else(|| tx.compute_hash())
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `tx`. Returns false if the same transaction is already pending.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if !self.hashes.insert(pool_key(&tx)) {
            return false;
        }
        self.transactions.push(tx);
        true
    }

    /// Drop a pending transaction by hash
    pub fn remove(&mut self, hash: &Hash) -> Option<Transaction> {
        if !self.hashes.remove(hash) {
            return None;
        }
        let position = self
            .transactions
            .iter()
            .position(|tx| pool_key(tx) == *hash)?;
        Some(self.transactions.remove(position))
    }

    /// Drop every pending transaction whose hash is in `hashes`
    pub fn remove_all<'a>(&mut self, hashes: impl IntoIterator<Item = &'a Hash>) -> usize {
        let doomed: HashSet<Hash> = hashes
            .into_iter()
            .filter(|h| self.hashes.contains(*h))
            .copied()
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.transactions.retain(|tx| !doomed.contains(&pool_key(tx)));
        for hash in &doomed {
            self.hashes.remove(hash);
        }
        doomed.len()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.hashes.contains(hash)
    }

    /// Pending transactions in arrival order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;
    use crate::validation::Amount;

    fn tx(coins: i64) -> Transaction {
        let owner = PrivateKey::from_bytes(&[6u8; 32]).unwrap().public_key();
        let mut tx = Transaction::new();
        tx.add_output(Amount::from_coins(coins), owner);
        tx.finalize();
        tx
    }

    #[test]
    fn test_add_dedups_by_hash() {
        let mut pool = TransactionPool::new();
        assert!(pool.add(tx(1)));
        assert!(!pool.add(tx(1)));
        assert!(pool.add(tx(2)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_preserves_arrival_order() {
        let mut pool = TransactionPool::new();
        let txs: Vec<_> = (1..=4).map(tx).collect();
        for t in txs.iter().rev() {
            pool.add(t.clone());
        }
        let order: Vec<_> = pool.transactions().iter().map(|t| t.hash()).collect();
        let expected: Vec<_> = txs.iter().rev().map(|t| t.hash()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_remove_and_remove_all() {
        let mut pool = TransactionPool::new();
        let (a, b, c) = (tx(1), tx(2), tx(3));
        for t in [&a, &b, &c] {
            pool.add(t.clone());
        }

        let removed = pool.remove(&b.hash().unwrap()).unwrap();
        assert_eq!(removed, b);
        assert!(pool.remove(&b.hash().unwrap()).is_none());

        let hashes = [a.hash().unwrap(), b.hash().unwrap()];
        assert_eq!(pool.remove_all(hashes.iter()), 1);
        assert_eq!(pool.transactions(), &[c.clone()]);
        assert!(pool.contains(&c.hash().unwrap()));
        assert!(!pool.contains(&a.hash().unwrap()));
    }
}
