//! Property-based and adversarial tests for powchain
//!
//! These tests verify invariants hold under random inputs and attack scenarios.

use proptest::prelude::*;
use powchain::codec::{BinaryReader, BinaryWriter, Encodable};
use powchain::consensus::{puzzle_digest, validate_proof_of_work, Block};
use powchain::crypto::{hash_bytes, Hash, PrivateKey, PublicKey};
use powchain::storage::{UtxoKey, UtxoPool};
use powchain::validation::{Amount, Transaction, TxHandler, TxOutput};

fn key(seed: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[seed; 32]).unwrap()
}

fn owner() -> PublicKey {
    key(21).public_key()
}

type InputSpec = ([u8; 32], u32);
type OutputSpec = (i64, u8);

/// Finalized transaction with every input signed by `signer`
fn signed_tx(signer: u8, inputs: &[InputSpec], outputs: &[OutputSpec]) -> Transaction {
    let signer = key(signer);
    let mut tx = Transaction::new();
    for (prev, index) in inputs {
        tx.add_input(Hash::from_bytes(*prev), *index);
    }
    for (units, to) in outputs {
        tx.add_output(Amount::from_base_units(*units), key(*to).public_key());
    }
    for i in 0..inputs.len() {
        tx.sign_input(i, &signer).unwrap();
    }
    tx.finalize();
    tx
}

fn tx_strategy() -> impl Strategy<Value = (u8, Vec<InputSpec>, Vec<OutputSpec>)> {
    (
        1u8..=200,
        prop::collection::vec((any::<[u8; 32]>(), any::<u32>()), 1..4),
        prop::collection::vec(((i64::MIN + 1)..=i64::MAX, 1u8..=200), 1..4),
    )
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    /// Block hash is deterministic
    #[test]
    fn prop_block_hash_deterministic(
        height in 1u64..1_000_000u64,
        nonce in 0u64..u64::MAX,
        parent in any::<[u8; 32]>()
    ) {
        let reward = Amount::from_coins(25);
        let a = Block::new(Hash::from_bytes(parent), height, nonce, owner(), reward, vec![]);
        let b = Block::new(Hash::from_bytes(parent), height, nonce, owner(), reward, vec![]);

        prop_assert_eq!(a.hash(), b.hash());
    }

    /// Changing only the nonce changes the block hash
    #[test]
    fn prop_different_nonce_different_hash(
        nonce1 in 0u64..u64::MAX / 2,
        nonce2 in u64::MAX / 2..u64::MAX
    ) {
        let a = Block::new(Hash::zero(), 2, nonce1, owner(), Amount::from_coins(25), vec![]);
        let b = Block::new(Hash::zero(), 2, nonce2, owner(), Amount::from_coins(25), vec![]);

        prop_assert_ne!(a.hash(), b.hash());
    }

    /// Canonical amount strings parse back to the same value
    #[test]
    fn prop_amount_canonical_string(units in (i64::MIN + 1)..=i64::MAX) {
        let amount = Amount::from_base_units(units);
        let text = amount.canonical_string();
        let parsed: Amount = text.parse().unwrap();

        prop_assert_eq!(parsed, amount);
        prop_assert!(!text.contains('.') || !text.ends_with('0'));
    }

    /// Fixed-point sums never drift
    #[test]
    fn prop_repeated_fraction_sums_exactly(n in 1i64..10_000) {
        let cent: Amount = "0.01".parse().unwrap();
        let total = (0..n).try_fold(Amount::ZERO, |acc, _| acc.checked_add(cent)).unwrap();

        prop_assert_eq!(total, Amount::from_base_units(n * 1_000_000));
    }

    /// Var-ints always take their shortest form and read back
    #[test]
    fn prop_var_int_minimal(value in any::<u64>()) {
        let mut writer = BinaryWriter::new();
        writer.write_var_int(value);
        let expected_len = match value {
            0..=0xFC => 1,
            0xFD..=0xFFFF => 3,
            0x1_0000..=0xFFFF_FFFF => 5,
            _ => 9,
        };
        prop_assert_eq!(writer.len(), expected_len);

        let bytes = writer.into_bytes();
        let mut reader = BinaryReader::new(&bytes);
        prop_assert_eq!(reader.read_var_int().unwrap(), value);
        prop_assert!(reader.finish().is_ok());
    }

    /// Puzzle acceptance is exactly "digest starts with `difficulty` zeros"
    #[test]
    fn prop_pow_matches_digest_prefix(
        parent_nonce in any::<u64>(),
        nonce in any::<u64>(),
        difficulty in 0usize..4
    ) {
        let parent = hash_bytes(&parent_nonce.to_le_bytes());
        let digest = puzzle_digest(parent_nonce, &parent, nonce);
        let expected = digest.starts_with(&"0".repeat(difficulty));

        let accepted = validate_proof_of_work(parent_nonce, &parent, nonce, difficulty);
        prop_assert_eq!(accepted, expected);
    }

    /// A corrupted block either fails to decode or decodes to the same hash
    #[test]
    fn prop_corrupted_block_never_changes_identity(
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255
    ) {
        let reward = Amount::from_coins(25);
        let block = Block::new(hash_bytes(b"parent"), 5, 77, owner(), reward, vec![]);
        let mut bytes = block.to_bytes();
        let at = position.index(bytes.len());
        bytes[at] ^= flip;

        if let Ok(decoded) = Block::from_bytes(&bytes) {
            prop_assert_eq!(decoded.hash(), block.hash());
            prop_assert!(decoded.verify_hash().is_ok());
        }
    }

    /// Fees are exactly inputs minus outputs
    #[test]
    fn prop_fee_is_surplus(input in 1i64..1_000_000, spent in 0i64..1_000_000) {
        prop_assume!(spent <= input);
        let alice = key(22);
        let funding = UtxoKey::new(hash_bytes(b"funding"), 0);
        let mut pool = UtxoPool::new();
        let funded = TxOutput::new(Amount::from_base_units(input), alice.public_key());
        pool.add(funding, funded).unwrap();

        let mut tx = Transaction::new();
        tx.add_input(funding.tx_hash, funding.index);
        tx.add_output(Amount::from_base_units(spent), owner());
        tx.sign_input(0, &alice).unwrap();
        tx.finalize();

        let fee = TxHandler::new(pool).check_tx(&tx).unwrap();
        prop_assert_eq!(fee, Amount::from_base_units(input - spent));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Blocks carrying signed transactions decode to the same block and
    /// re-encode to the same bytes
    #[test]
    fn prop_block_with_transactions_roundtrip(
        parent in any::<[u8; 32]>(),
        height in any::<u64>(),
        nonce in any::<u64>(),
        txs in prop::collection::vec(tx_strategy(), 0..4)
    ) {
        let transactions = txs
            .iter()
            .map(|(signer, inputs, outputs)| signed_tx(*signer, inputs, outputs))
            .collect();
        let block = Block::new(
            Hash::from_bytes(parent),
            height,
            nonce,
            owner(),
            Amount::from_coins(25),
            transactions,
        );

        let bytes = block.to_bytes();
        let decoded = Block::from_bytes(&bytes).unwrap();
        prop_assert_eq!(&decoded, &block);
        prop_assert_eq!(decoded.to_bytes(), bytes);
    }
}

// ============================================================================
// ADVERSARIAL TESTS
// ============================================================================

/// Test: Signature replay onto a different output set
///
/// The signed data covers every output, so a signature cannot be lifted
/// into a transaction that pays someone else.
#[test]
fn test_signature_replay_rejected() {
    let alice = key(23);
    let mallory = key(24).public_key();
    let funding = UtxoKey::new(hash_bytes(b"funding"), 0);
    let mut pool = UtxoPool::new();
    pool.add(funding, TxOutput::new(Amount::from_coins(10), alice.public_key()))
        .unwrap();

    let mut honest = Transaction::new();
    honest.add_input(funding.tx_hash, funding.index);
    honest.add_output(Amount::from_coins(10), owner());
    honest.sign_input(0, &alice).unwrap();
    honest.finalize();

    let mut forged = Transaction::new();
    forged.add_input(funding.tx_hash, funding.index);
    forged.add_output(Amount::from_coins(10), mallory);
    forged
        .add_signature(0, honest.inputs[0].signature.clone())
        .unwrap();
    forged.finalize();

    let handler = TxHandler::new(pool);
    assert!(handler.is_valid_tx(&honest));
    assert!(!handler.is_valid_tx(&forged));
}

/// Test: Double-spend across one batch
///
/// Two transactions spend the same output; only the first survives.
#[test]
fn test_double_spend_in_batch_rejected() {
    let alice = key(25);
    let funding = UtxoKey::new(hash_bytes(b"funding"), 0);
    let mut pool = UtxoPool::new();
    pool.add(funding, TxOutput::new(Amount::from_coins(10), alice.public_key()))
        .unwrap();

    let spend = |to: PublicKey| {
        let mut tx = Transaction::new();
        tx.add_input(funding.tx_hash, funding.index);
        tx.add_output(Amount::from_coins(10), to);
        tx.sign_input(0, &alice).unwrap();
        tx.finalize();
        tx
    };
    let first = spend(owner());
    let second = spend(key(26).public_key());

    let mut handler = TxHandler::new(pool);
    let accepted = handler.handle_txs(&[first.clone(), second]);

    assert_eq!(accepted, vec![first]);
    assert!(!handler.pool().contains(&funding));
}

/// Test: Inflation through a negative output
///
/// A negative output would let the other outputs exceed the inputs.
#[test]
fn test_negative_output_inflation_rejected() {
    let alice = key(27);
    let funding = UtxoKey::new(hash_bytes(b"funding"), 0);
    let mut pool = UtxoPool::new();
    pool.add(funding, TxOutput::new(Amount::from_coins(1), alice.public_key()))
        .unwrap();

    let mut tx = Transaction::new();
    tx.add_input(funding.tx_hash, funding.index);
    tx.add_output(Amount::from_coins(1_000), owner());
    tx.add_output(Amount::from_coins(-999), alice.public_key());
    tx.sign_input(0, &alice).unwrap();
    tx.finalize();

    assert!(!TxHandler::new(pool).is_valid_tx(&tx));
}

/// Test: Trailing garbage after a block
#[test]
fn test_trailing_bytes_rejected() {
    let block = Block::new(Hash::zero(), 1, 13, owner(), Amount::from_coins(25), vec![]);
    let mut bytes = block.to_bytes();
    bytes.push(0);
    assert!(Block::from_bytes(&bytes).is_err());
}
