//! Transaction structure
//!
//! UTXO-based transactions. Each input is signed over `raw_data_to_sign`,
//! which covers the spent outpoint and every output but no signatures; the
//! transaction hash covers `raw_tx`, which adds the signatures and the
//! coinbase marker.

use crate::codec::{BinaryReader, BinaryWriter, Encodable};
use crate::crypto::{hash_bytes, Hash, PrivateKey, PublicKey};
use crate::error::{ChainError, Result};

use super::Amount;

/// A transaction input referencing a previous output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Hash of the transaction containing the output
    pub prev_tx_hash: Hash,
    /// Index of the output in that transaction
    pub output_index: u32,
    /// Signature by the output's owner; empty until signed
    pub signature: Vec<u8>,
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: Amount,
    /// Key allowed to spend this output
    pub owner: PublicKey,
}

/// A complete transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    is_coinbase: bool,
    /// Height of the block a coinbase pays out in; zero otherwise
    coinbase_height: u64,
    hash: Option<Hash>,
}

impl TxInput {
    pub fn new(prev_tx_hash: Hash, output_index: u32) -> Self {
        Self {
            prev_tx_hash,
            output_index,
            signature: Vec::new(),
        }
    }
}

impl TxOutput {
    pub fn new(value: Amount, owner: PublicKey) -> Self {
        Self { value, owner }
    }

    fn write_raw(&self, writer: &mut BinaryWriter) {
        writer.write_var_string(&self.value.canonical_string());
        writer.write_bytes(&self.owner.0);
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Create an empty, unfinalized transaction
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            is_coinbase: false,
            coinbase_height: 0,
            hash: None,
        }
    }

    /// Create a finalized coinbase paying `value` to `owner` in the block at `height`
    pub fn coinbase(value: Amount, owner: PublicKey, height: u64) -> Self {
        let mut tx = Self {
            inputs: Vec::new(),
            outputs: vec![TxOutput::new(value, owner)],
            is_coinbase: true,
            coinbase_height: height,
            hash: None,
        };
        tx.finalize();
        tx
    }

    pub fn is_coinbase(&self) -> bool {
        self.is_coinbase
    }

    pub fn coinbase_height(&self) -> u64 {
        self.coinbase_height
    }

    /// Stored hash, set by `finalize`
    pub fn hash(&self) -> Option<Hash> {
        self.hash
    }

    pub fn add_input(&mut self, prev_tx_hash: Hash, output_index: u32) {
        self.inputs.push(TxInput::new(prev_tx_hash, output_index));
    }

    pub fn add_output(&mut self, value: Amount, owner: PublicKey) {
        self.outputs.push(TxOutput::new(value, owner));
    }

    pub fn add_signature(&mut self, index: usize, signature: Vec<u8>) -> Result<()> {
        let input = self
            .inputs
            .get_mut(index)
            .ok_or(ChainError::InputOutOfRange(index))?;
        input.signature = signature;
        Ok(())
    }

    /// Sign input `index` with `key`
    pub fn sign_input(&mut self, index: usize, key: &PrivateKey) -> Result<()> {
        let digest = self
            .signing_digest(index)
            .ok_or(ChainError::InputOutOfRange(index))?;
        self.add_signature(index, key.sign(&digest))
    }

    /// Bytes signed by input `index`: its outpoint and all outputs
    pub fn raw_data_to_sign(&self, index: usize) -> Option<Vec<u8>> {
        let input = self.inputs.get(index)?;
        let mut writer = BinaryWriter::new();
        writer.write_hash(&input.prev_tx_hash);
        writer.write_var_int(input.output_index as u64);
        writer.write_var_int(self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_raw(&mut writer);
        }
        Some(writer.into_bytes())
    }

    /// SHA-256 of `raw_data_to_sign(index)`
    pub fn signing_digest(&self, index: usize) -> Option<Hash> {
        self.raw_data_to_sign(index).map(|raw| hash_bytes(&raw))
    }

    /// Bytes covered by the transaction hash
    pub fn raw_tx(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_var_int(self.inputs.len() as u64);
        for input in &self.inputs {
            writer.write_hash(&input.prev_tx_hash);
            writer.write_var_int(input.output_index as u64);
            writer.write_var_bytes(&input.signature);
        }
        writer.write_var_int(self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_raw(&mut writer);
        }
        writer.write_bool(self.is_coinbase);
        if self.is_coinbase {
            writer.write_var_int(self.coinbase_height);
        }
        writer.into_bytes()
    }

    pub fn compute_hash(&self) -> Hash {
        hash_bytes(&self.raw_tx())
    }

    /// Compute and store the hash. Must be called after the last mutation.
    pub fn finalize(&mut self) -> Hash {
        let hash = self.compute_hash();
        self.hash = Some(hash);
        hash
    }

    /// Check the stored hash against the current contents
    pub fn verify_hash(&self) -> Result<Hash> {
        match self.hash {
            Some(stored) if stored == self.compute_hash() => Ok(stored),
            _ => Err(ChainError::HashMismatch),
        }
    }

    /// Sum of output values; `None` on overflow
    pub fn total_output_value(&self) -> Option<Amount> {
        self.outputs
            .iter()
            .try_fold(Amount::ZERO, |acc, o| acc.checked_add(o.value))
    }
}

impl Encodable for TxInput {
    fn encode(&self, writer: &mut BinaryWriter) {
        writer.write_hash(&self.prev_tx_hash);
        writer.write_var_int(self.output_index as u64);
        writer.write_var_bytes(&self.signature);
    }

    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let prev_tx_hash = reader.read_hash()?;
        let output_index = u32::try_from(reader.read_var_int()?)
            .map_err(|_| ChainError::MalformedEncoding("output index overflow".to_string()))?;
        let signature = reader.read_var_bytes()?.to_vec();
        Ok(Self {
            prev_tx_hash,
            output_index,
            signature,
        })
    }
}

impl Encodable for TxOutput {
    fn encode(&self, writer: &mut BinaryWriter) {
        writer.write_var_string(&self.value.canonical_string());
        writer.write_var_bytes(&self.owner.0);
    }

    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let text = reader.read_var_string()?;
        let value: Amount = text.parse()?;
        if value.canonical_string() != text {
            return Err(ChainError::MalformedEncoding(format!(
                "non-canonical amount {text:?}"
            )));
        }
        let key_bytes: [u8; 32] = reader
            .read_var_bytes()?
            .try_into()
            .map_err(|_| ChainError::MalformedEncoding("public key length".to_string()))?;
        let owner = PublicKey::from_bytes(&key_bytes)
            .map_err(|e| ChainError::MalformedEncoding(e.to_string()))?;
        Ok(Self { value, owner })
    }
}

impl Encodable for Transaction {
    fn encode(&self, writer: &mut BinaryWriter) {
        writer.write_array(&self.inputs);
        writer.write_array(&self.outputs);
        writer.write_bool(self.is_coinbase);
        if self.is_coinbase {
            writer.write_var_int(self.coinbase_height);
        }
        writer.write_bool(self.hash.is_some());
        if let Some(hash) = &self.hash {
            writer.write_hash(hash);
        }
    }

    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let inputs = reader.read_items()?;
        let outputs = reader.read_items()?;
        let is_coinbase = reader.read_bool()?;
        let coinbase_height = if is_coinbase { reader.read_var_int()? } else { 0 };
        let hash = if reader.read_bool()? {
            Some(reader.read_hash()?)
        } else {
            None
        };
        let tx = Self {
            inputs,
            outputs,
            is_coinbase,
            coinbase_height,
            hash,
        };
        if tx.hash.is_some() {
            tx.verify_hash()?;
        }
        Ok(tx)
    }
}
