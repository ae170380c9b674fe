//! Binary reader for the wire format
//!
//! Every read is bounds-checked; truncated or non-canonical input fails with
//! `ChainError::MalformedEncoding` instead of panicking.

use crate::crypto::Hash;
use crate::error::{ChainError, Result};

use super::Encodable;

/// Upper bound on a single length-prefixed field
pub const MAX_VAR_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

fn malformed(msg: impl Into<String>) -> ChainError {
    ChainError::MalformedEncoding(msg.into())
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(malformed(format!(
                "need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(malformed(format!("invalid bool byte {other:#04x}"))),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a var-int, rejecting non-minimal forms so re-encoding is byte-exact
    pub fn read_var_int(&mut self) -> Result<u64> {
        let (value, min) = match self.read_u8()? {
            0xFD => (self.read_u16()? as u64, 0xFD),
            0xFE => (self.read_u32()? as u64, 0x1_0000),
            0xFF => (self.read_u64()?, 0x1_0000_0000),
            b => return Ok(b as u64),
        };
        if value < min {
            return Err(malformed(format!("non-minimal var-int {value}")));
        }
        Ok(value)
    }

    pub fn read_var_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_var_int()?;
        if len > MAX_VAR_BYTES {
            return Err(malformed(format!("field length {len} too large")));
        }
        self.read_bytes(len as usize)
    }

    pub fn read_var_string(&mut self) -> Result<&'a str> {
        let bytes = self.read_var_bytes()?;
        std::str::from_utf8(bytes).map_err(|e| malformed(e.to_string()))
    }

    pub fn read_hash(&mut self) -> Result<Hash> {
        Ok(Hash(self.read_array()?))
    }

    pub fn read_items<T: Encodable>(&mut self) -> Result<Vec<T>> {
        let count = self.read_var_int()?;
        // every item takes at least one byte
        if count > self.remaining() as u64 {
            return Err(malformed(format!("array count {count} exceeds input")));
        }
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(T::decode(self)?);
        }
        Ok(items)
    }

    /// Fail if any input is left unread
    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(malformed(format!("{} trailing bytes", self.remaining())));
        }
        Ok(())
    }
}
