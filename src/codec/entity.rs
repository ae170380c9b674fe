//! Encodable entities and the closed registry of record kinds
//!
//! Stored records carry a one-byte kind tag in front of the entity encoding.
//! Decoding dispatches on that tag through `EntityKind`; there is no other way
//! to name a decodable type.

use crate::consensus::Block;
use crate::error::{ChainError, Result};
use crate::validation::{Transaction, TxInput, TxOutput};

use super::{BinaryReader, BinaryWriter};

/// An entity with a canonical binary encoding
pub trait Encodable: Sized {
    fn encode(&self, writer: &mut BinaryWriter);

    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.encode(&mut writer);
        writer.into_bytes()
    }

    /// Decode a complete buffer; trailing bytes are an error
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Every kind of record the node knows how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityKind {
    Input = 1,
    Output = 2,
    Transaction = 3,
    Block = 4,
}

impl EntityKind {
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(EntityKind::Input),
            2 => Ok(EntityKind::Output),
            3 => Ok(EntityKind::Transaction),
            4 => Ok(EntityKind::Block),
            other => Err(ChainError::MalformedEncoding(format!(
                "unknown entity tag {other}"
            ))),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Encodable entities with a fixed registry kind
pub trait Tagged: Encodable {
    const KIND: EntityKind;
}

impl Tagged for TxInput {
    const KIND: EntityKind = EntityKind::Input;
}

impl Tagged for TxOutput {
    const KIND: EntityKind = EntityKind::Output;
}

impl Tagged for Transaction {
    const KIND: EntityKind = EntityKind::Transaction;
}

impl Tagged for Block {
    const KIND: EntityKind = EntityKind::Block;
}

/// A decoded record of any registered kind
#[derive(Debug, Clone)]
pub enum Entity {
    Input(TxInput),
    Output(TxOutput),
    Transaction(Transaction),
    Block(Block),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Input(_) => EntityKind::Input,
            Entity::Output(_) => EntityKind::Output,
            Entity::Transaction(_) => EntityKind::Transaction,
            Entity::Block(_) => EntityKind::Block,
        }
    }

    /// Decode a payload of a known kind
    pub fn decode(kind: EntityKind, payload: &[u8]) -> Result<Self> {
        Ok(match kind {
            EntityKind::Input => Entity::Input(TxInput::from_bytes(payload)?),
            EntityKind::Output => Entity::Output(TxOutput::from_bytes(payload)?),
            EntityKind::Transaction => Entity::Transaction(Transaction::from_bytes(payload)?),
            EntityKind::Block => Entity::Block(Block::from_bytes(payload)?),
        })
    }

    pub fn into_block(self) -> Result<Block> {
        match self {
            Entity::Block(block) => Ok(block),
            other => Err(unexpected(EntityKind::Block, other.kind())),
        }
    }

    pub fn into_transaction(self) -> Result<Transaction> {
        match self {
            Entity::Transaction(tx) => Ok(tx),
            other => Err(unexpected(EntityKind::Transaction, other.kind())),
        }
    }
}

fn unexpected(expected: EntityKind, got: EntityKind) -> ChainError {
    ChainError::MalformedEncoding(format!("expected {expected:?} record, found {got:?}"))
}

/// Encode `item` as a tagged record
pub fn encode_record<T: Tagged>(item: &T) -> Vec<u8> {
    let mut writer = BinaryWriter::new();
    writer.write_u8(T::KIND.tag());
    item.encode(&mut writer);
    writer.into_bytes()
}

/// Decode a tagged record of any registered kind
pub fn decode_record(bytes: &[u8]) -> Result<Entity> {
    let (tag, payload) = bytes
        .split_first()
        .ok_or_else(|| ChainError::MalformedEncoding("empty record".to_string()))?;
    Entity::decode(EntityKind::from_tag(*tag)?, payload)
}
