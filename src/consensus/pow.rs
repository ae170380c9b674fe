//! Proof-of-work puzzle
//!
//! A nonce answers its parent's puzzle when
//! `SHA-256(parent_nonce || hex(parent_hash) || nonce)`, with both nonces in
//! decimal and the whole string UTF-8 encoded, starts with `difficulty` hex
//! zeros. The unit is a hex character, not a bit.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::crypto::{sha256_hex, Hash};

use super::Block;

/// A SHA-256 digest has 64 hex characters
pub const MAX_DIFFICULTY: usize = 64;

/// How many nonces are tried between stop-signal checks
const STOP_CHECK_INTERVAL: u64 = 1024;

/// Hex digest of the puzzle input for `nonce`
pub fn puzzle_digest(parent_nonce: u64, parent_hash: &Hash, nonce: u64) -> String {
    let preimage = format!("{}{}{}", parent_nonce, parent_hash.to_hex(), nonce);
    sha256_hex(preimage.as_bytes())
}

/// Check whether `nonce` answers the puzzle set by the parent block
pub fn validate_proof_of_work(
    parent_nonce: u64,
    parent_hash: &Hash,
    nonce: u64,
    difficulty: usize,
) -> bool {
    if difficulty > MAX_DIFFICULTY {
        return false;
    }
    puzzle_digest(parent_nonce, parent_hash, nonce)
        .bytes()
        .take(difficulty)
        .all(|c| c == b'0')
}

/// Smallest nonce answering `parent`'s puzzle. Runs until one is found.
pub fn generate_proof_of_work(parent: &Block, difficulty: usize) -> u64 {
    let mut nonce = 0u64;
    while !validate_proof_of_work(parent.nonce, &parent.hash(), nonce, difficulty) {
        nonce = nonce.wrapping_add(1);
    }
    nonce
}

/// Search nonces upward from `start` until one answers the puzzle or `stop`
/// is raised. Returns `None` when interrupted or when the nonce space is
/// exhausted.
pub fn search_nonce(
    parent_nonce: u64,
    parent_hash: &Hash,
    difficulty: usize,
    start: u64,
    stop: &AtomicBool,
) -> Option<u64> {
    if difficulty > MAX_DIFFICULTY {
        return None;
    }
    let mut nonce = start;
    loop {
        if (nonce - start) % STOP_CHECK_INTERVAL == 0 && stop.load(Ordering::SeqCst) {
            return None;
        }
        if validate_proof_of_work(parent_nonce, parent_hash, nonce, difficulty) {
            return Some(nonce);
        }
        nonce = nonce.checked_add(1)?;
    }
}
