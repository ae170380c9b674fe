//! Block structure
//!
//! A block links to its parent by hash and carries one coinbase plus an
//! ordered list of transactions. Its hash covers the parent hash, nonce,
//! height and the raw encoding of every transaction.

use crate::codec::{BinaryReader, BinaryWriter, Encodable};
use crate::crypto::{hash_bytes, Hash, PublicKey};
use crate::error::{ChainError, Result};
use crate::validation::{Amount, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Hash of the parent block; all zero for genesis
    pub prev_block_hash: Hash,
    pub height: u64,
    /// Proof-of-work answer for the parent's puzzle
    pub nonce: u64,
    pub coinbase: Transaction,
    pub transactions: Vec<Transaction>,
    hash: Hash,
}

impl Block {
    /// Build and finalize a block whose coinbase pays `reward` to `beneficiary`
    pub fn new(
        prev_block_hash: Hash,
        height: u64,
        nonce: u64,
        beneficiary: PublicKey,
        reward: Amount,
        transactions: Vec<Transaction>,
    ) -> Self {
        let coinbase = Transaction::coinbase(reward, beneficiary, height);
        Self::with_coinbase(prev_block_hash, height, nonce, coinbase, transactions)
    }

    /// Build and finalize a block around an existing coinbase
    pub fn with_coinbase(
        prev_block_hash: Hash,
        height: u64,
        nonce: u64,
        coinbase: Transaction,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut block = Self {
            prev_block_hash,
            height,
            nonce,
            coinbase,
            transactions,
            hash: Hash::zero(),
        };
        block.finalize();
        block
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_zero()
    }

    /// Append a transaction. The block must be re-finalized afterwards.
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Bytes covered by the block hash
    pub fn raw_block(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(128);
        writer.write_hash(&self.prev_block_hash);
        writer.write_u64(self.nonce);
        writer.write_u64(self.height);
        writer.write_var_bytes(&self.coinbase.raw_tx());
        writer.write_var_int(self.transactions.len() as u64);
        for tx in &self.transactions {
            writer.write_var_bytes(&tx.raw_tx());
        }
        writer.into_bytes()
    }

    pub fn compute_hash(&self) -> Hash {
        hash_bytes(&self.raw_block())
    }

    /// Recompute and store the hash
    pub fn finalize(&mut self) -> Hash {
        self.hash = self.compute_hash();
        self.hash
    }

    /// Check the stored hash against the current contents
    pub fn verify_hash(&self) -> Result<()> {
        if self.hash != self.compute_hash() {
            return Err(ChainError::HashMismatch);
        }
        Ok(())
    }
}

impl Encodable for Block {
    fn encode(&self, writer: &mut BinaryWriter) {
        writer.write_hash(&self.prev_block_hash);
        writer.write_var_int(self.height);
        writer.write_var_int(self.nonce);
        self.coinbase.encode(writer);
        writer.write_array(&self.transactions);
        writer.write_hash(&self.hash);
    }

    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let prev_block_hash = reader.read_hash()?;
        let height = reader.read_var_int()?;
        let nonce = reader.read_var_int()?;
        let coinbase = Transaction::decode(reader)?;
        if !coinbase.is_coinbase() {
            return Err(ChainError::MalformedEncoding(
                "block coinbase is not marked as coinbase".to_string(),
            ));
        }
        let transactions = reader.read_items()?;
        let hash = reader.read_hash()?;

        let block = Self {
            prev_block_hash,
            height,
            nonce,
            coinbase,
            transactions,
            hash,
        };
        block.verify_hash()?;
        Ok(block)
    }
}
