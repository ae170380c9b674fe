//! UTXO pool
//!
//! In-memory map of unspent transaction outputs. A pool is a plain owned
//! value: cloning it yields an independent copy.

use std::collections::{HashMap, HashSet};

use crate::crypto::{Hash, PublicKey};
use crate::error::{ChainError, Result};
use crate::validation::{Amount, Transaction, TxOutput};

/// Identifier of an unspent output: (producing tx hash, output position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtxoKey {
    pub tx_hash: Hash,
    pub index: u32,
}

impl UtxoKey {
    pub fn new(tx_hash: Hash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

/// Set of all unspent transaction outputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoPool {
    utxos: HashMap<UtxoKey, TxOutput>,
}

impl UtxoPool {
    pub fn new() -> Self {
        Self {
            utxos: HashMap::new(),
        }
    }

    pub fn contains(&self, key: &UtxoKey) -> bool {
        self.utxos.contains_key(key)
    }

    pub fn get(&self, key: &UtxoKey) -> Option<&TxOutput> {
        self.utxos.get(key)
    }

    /// Add an output. An existing entry under the same key is never
    /// overwritten.
    pub fn add(&mut self, key: UtxoKey, output: TxOutput) -> Result<()> {
        if self.utxos.contains_key(&key) {
            return Err(ChainError::DuplicateUtxo {
                tx_hash: key.tx_hash,
                index: key.index,
            });
        }
        self.utxos.insert(key, output);
        Ok(())
    }

    /// Remove an output, returning it if it was present
    pub fn remove(&mut self, key: &UtxoKey) -> Option<TxOutput> {
        self.utxos.remove(key)
    }

    /// Apply a transaction: drop what it spends, add what it produces under
    /// `tx_hash`. All-or-nothing: on error the pool is left untouched.
    pub fn apply_transaction(&mut self, tx: &Transaction, tx_hash: Hash) -> Result<()> {
        let spent: Vec<UtxoKey> = tx
            .inputs
            .iter()
            .map(|input| UtxoKey::new(input.prev_tx_hash, input.output_index))
            .collect();
        let mut seen = HashSet::with_capacity(spent.len());
        for key in &spent {
            if !self.contains(key) || !seen.insert(*key) {
                return Err(ChainError::DoubleSpend {
                    tx_hash: key.tx_hash,
                    index: key.index,
                });
            }
        }
        for index in 0..tx.outputs.len() as u32 {
            let key = UtxoKey::new(tx_hash, index);
            if self.contains(&key) {
                return Err(ChainError::DuplicateUtxo { tx_hash, index });
            }
        }

        for key in &spent {
            self.utxos.remove(key);
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            self.utxos
                .insert(UtxoKey::new(tx_hash, index as u32), output.clone());
        }
        Ok(())
    }

    /// All outputs spendable by `owner`
    pub fn get_by_owner(&self, owner: &PublicKey) -> Vec<(UtxoKey, &TxOutput)> {
        self.utxos
            .iter()
            .filter(|(_, output)| output.owner == *owner)
            .map(|(key, output)| (*key, output))
            .collect()
    }

    /// Total value owned by `owner`
    pub fn get_balance(&self, owner: &PublicKey) -> Amount {
        self.get_by_owner(owner)
            .iter()
            .fold(Amount::ZERO, |acc, (_, o)| {
                acc.checked_add(o.value).unwrap_or(acc)
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &UtxoKey> {
        self.utxos.keys()
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hash_bytes, PrivateKey};

    fn owner() -> PublicKey {
        PrivateKey::from_bytes(&[3u8; 32]).unwrap().public_key()
    }

    fn output(coins: i64) -> TxOutput {
        TxOutput::new(Amount::from_coins(coins), owner())
    }

    #[test]
    fn test_utxo_add_and_get() {
        let mut pool = UtxoPool::new();
        let key = UtxoKey::new(hash_bytes(b"tx1"), 0);

        pool.add(key, output(100)).unwrap();

        assert!(pool.contains(&key));
        assert!(!pool.contains(&UtxoKey::new(key.tx_hash, 1)));
        assert_eq!(pool.get(&key).unwrap().value, Amount::from_coins(100));
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut pool = UtxoPool::new();
        let key = UtxoKey::new(hash_bytes(b"tx1"), 0);
        pool.add(key, output(1)).unwrap();

        let err = pool.add(key, output(2)).unwrap_err();
        assert!(matches!(err, ChainError::DuplicateUtxo { index: 0, .. }));
        assert_eq!(pool.get(&key).unwrap().value, Amount::from_coins(1));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut pool = UtxoPool::new();
        let key = UtxoKey::new(hash_bytes(b"tx1"), 0);
        assert!(pool.remove(&key).is_none());

        pool.add(key, output(1)).unwrap();
        assert!(pool.remove(&key).is_some());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut pool = UtxoPool::new();
        let key = UtxoKey::new(hash_bytes(b"tx1"), 0);
        pool.add(key, output(1)).unwrap();

        let mut copy = pool.clone();
        copy.remove(&key);
        copy.add(UtxoKey::new(hash_bytes(b"tx2"), 0), output(2)).unwrap();

        assert!(pool.contains(&key));
        assert_eq!(pool.len(), 1);
        assert_eq!(copy.len(), 1);
    }

    #[test]
    fn test_apply_coinbase_and_balance() {
        let mut pool = UtxoPool::new();
        let coinbase = Transaction::coinbase(Amount::from_coins(25), owner(), 1);
        let hash = coinbase.hash().unwrap();
        pool.apply_transaction(&coinbase, hash).unwrap();

        assert!(pool.contains(&UtxoKey::new(hash, 0)));
        assert_eq!(pool.get_balance(&owner()), Amount::from_coins(25));
    }

    #[test]
    fn test_apply_spend_of_missing_output_fails() {
        let mut pool = UtxoPool::new();
        let mut tx = Transaction::new();
        tx.add_input(hash_bytes(b"nowhere"), 0);
        let hash = tx.finalize();
        assert!(matches!(
            pool.apply_transaction(&tx, hash),
            Err(ChainError::DoubleSpend { .. })
        ));
    }
}
