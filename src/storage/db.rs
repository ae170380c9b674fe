//! Database persistence layer using Sled
//!
//! Blocks are stored as tagged entity records under `DATA_BLOCK || hash`.
//! Each transaction gets a location entry under `DATA_TXN_INDEX || tx hash`
//! holding the containing block hash and its position in that block
//! (`u32` little-endian). Position 0 is the coinbase; regular transactions
//! follow from 1. The single key `DATA_TIP` holds the hash of the best tip
//! as of the last stored block.

use std::path::Path;

use sled::{Batch, Db};
use tracing::debug;

use crate::codec::{decode_record, encode_record};
use crate::consensus::Block;
use crate::crypto::Hash;
use crate::error::{ChainError, Result};
use crate::validation::Transaction;

pub const DATA_BLOCK: u8 = 0x01;
pub const DATA_TXN_INDEX: u8 = 0x02;
pub const DATA_TIP: u8 = 0x03;

const INDEX_VALUE_LEN: usize = 32 + 4;

fn prefixed(prefix: u8, hash: &Hash) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = prefix;
    key[1..].copy_from_slice(hash.as_bytes());
    key
}

/// Database wrapper
#[derive(Debug, Clone)]
pub struct ChainDb {
    db: Db,
}

impl ChainDb {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// Throwaway database removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a block, index its transactions and record `tip` as the best
    /// tip, all in one atomic batch
    pub fn store_block(&self, block: &Block, tip: &Hash) -> Result<()> {
        let block_hash = block.hash();
        let mut batch = Batch::default();
        batch.insert(&prefixed(DATA_BLOCK, &block_hash)[..], encode_record(block));

        let all = std::iter::once(&block.coinbase).chain(&block.transactions);
        for (position, tx) in all.enumerate() {
            let tx_hash = tx.verify_hash()?;
            let mut location = Vec::with_capacity(INDEX_VALUE_LEN);
            location.extend_from_slice(block_hash.as_bytes());
            location.extend_from_slice(&(position as u32).to_le_bytes());
            batch.insert(&prefixed(DATA_TXN_INDEX, &tx_hash)[..], location);
        }
        batch.insert(&[DATA_TIP][..], &tip.as_bytes()[..]);

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        debug!("Stored block {} at height {}", block_hash, block.height);
        Ok(())
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
        match self.db.get(prefixed(DATA_BLOCK, hash))? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?.into_block()?)),
            None => Ok(None),
        }
    }

    /// Best tip recorded with the last stored block
    pub fn get_tip(&self) -> Result<Option<Hash>> {
        match self.db.get([DATA_TIP])? {
            Some(value) => Hash::from_slice(&value).map(Some).ok_or_else(|| {
                ChainError::MalformedEncoding(format!("tip entry has {} bytes", value.len()))
            }),
            None => Ok(None),
        }
    }

    /// Containing block hash and position of a transaction
    pub fn get_transaction_location(&self, hash: &Hash) -> Result<Option<(Hash, u32)>> {
        let Some(value) = self.db.get(prefixed(DATA_TXN_INDEX, hash))? else {
            return Ok(None);
        };
        if value.len() != INDEX_VALUE_LEN {
            return Err(ChainError::MalformedEncoding(format!(
                "transaction index entry has {} bytes",
                value.len()
            )));
        }
        let block_hash = Hash::from_slice(&value[..32])
            .ok_or_else(|| ChainError::MalformedEncoding("bad block hash".to_string()))?;
        let mut position = [0u8; 4];
        position.copy_from_slice(&value[32..]);
        Ok(Some((block_hash, u32::from_le_bytes(position))))
    }

    /// Look a transaction up through the index and its containing block
    pub fn get_transaction(&self, hash: &Hash) -> Result<Option<Transaction>> {
        let Some((block_hash, position)) = self.get_transaction_location(hash)? else {
            return Ok(None);
        };
        let block = self.get_block(&block_hash)?.ok_or_else(|| {
            ChainError::Storage(format!("indexed block {block_hash} is missing"))
        })?;
        let tx = match position {
            0 => Some(block.coinbase),
            n => block.transactions.into_iter().nth(n as usize - 1),
        };
        tx.map(Some).ok_or_else(|| {
            ChainError::Storage(format!("block {block_hash} has no transaction {position}"))
        })
    }

    pub fn contains_transaction(&self, hash: &Hash) -> Result<bool> {
        Ok(self.db.contains_key(prefixed(DATA_TXN_INDEX, hash))?)
    }

    /// Every stored block, in key order
    pub fn iter_blocks(&self) -> impl Iterator<Item = Result<Block>> {
        self.db.scan_prefix([DATA_BLOCK]).map(|item| {
            let (_, value) = item?;
            decode_record(&value)?.into_block()
        })
    }

    pub fn block_count(&self) -> usize {
        self.db.scan_prefix([DATA_BLOCK]).count()
    }
}
