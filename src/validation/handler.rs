//! Transaction validation against a UTXO pool
//!
//! `check_tx` decides admissibility of one transaction against the handler's
//! pool without touching it. `handle_txs` walks a batch in order, applying
//! every admissible transaction to the pool before looking at the next one.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ChainError, Result};
use crate::storage::{UtxoKey, UtxoPool};

use super::{Amount, Transaction};

/// Validator owning a mutable UTXO pool
#[derive(Debug, Clone)]
pub struct TxHandler {
    pool: UtxoPool,
}

impl TxHandler {
    /// Create a handler over its own copy of `pool`
    pub fn new(pool: UtxoPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &UtxoPool {
        &self.pool
    }

    pub fn into_pool(self) -> UtxoPool {
        self.pool
    }

    /// Validate `tx` against the current pool, returning the fee it leaves
    /// unclaimed.
    pub fn check_tx(&self, tx: &Transaction) -> Result<Amount> {
        let tx_hash = tx.verify_hash()?;

        let mut consumed: HashSet<UtxoKey> = HashSet::with_capacity(tx.inputs.len());
        let mut input_sum = Amount::ZERO;
        for (index, input) in tx.inputs.iter().enumerate() {
            let key = UtxoKey::new(input.prev_tx_hash, input.output_index);
            let output = match self.pool.get(&key) {
                Some(output) if !consumed.contains(&key) => output,
                _ => {
                    return Err(ChainError::DoubleSpend {
                        tx_hash: key.tx_hash,
                        index: key.index,
                    })
                }
            };

            let digest = tx
                .signing_digest(index)
                .ok_or(ChainError::InputOutOfRange(index))?;
            output
                .owner
                .verify(&digest, &input.signature)
                .map_err(|_| ChainError::InvalidSignature { input: index })?;

            input_sum = input_sum
                .checked_add(output.value)
                .ok_or(ChainError::ValueConservationViolation)?;
            consumed.insert(key);
        }

        let mut output_sum = Amount::ZERO;
        for (index, output) in tx.outputs.iter().enumerate() {
            if output.value.is_negative() {
                return Err(ChainError::NegativeOutput(index));
            }
            output_sum = output_sum
                .checked_add(output.value)
                .ok_or(ChainError::ValueConservationViolation)?;

            if self.pool.contains(&UtxoKey::new(tx_hash, index as u32)) {
                return Err(ChainError::DuplicateUtxo {
                    tx_hash,
                    index: index as u32,
                });
            }
        }

        input_sum
            .checked_sub(output_sum)
            .filter(|fee| !fee.is_negative())
            .ok_or(ChainError::ValueConservationViolation)
    }

    pub fn is_valid_tx(&self, tx: &Transaction) -> bool {
        self.check_tx(tx).is_ok()
    }

    /// Apply every admissible transaction in order and return the accepted
    /// ones. Rejected transactions are skipped without affecting the pool.
    pub fn handle_txs(&mut self, txs: &[Transaction]) -> Vec<Transaction> {
        let mut accepted = Vec::with_capacity(txs.len());
        for tx in txs {
            let applied = self.check_tx(tx).and_then(|_| {
                let tx_hash = tx.verify_hash()?;
                self.pool.apply_transaction(tx, tx_hash)
            });
            match applied {
                Ok(()) => accepted.push(tx.clone()),
                Err(e) => debug!("Rejected transaction {:?}: {}", tx.hash(), e),
            }
        }
        accepted
    }
}
