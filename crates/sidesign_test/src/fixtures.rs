//! Deterministic keys, records, and output views for tests.

use bitcoin_hashes::{hash160, Hash};
use secp256k1::SecretKey;

use sidesign_core::keystore::KeyEntry;
use sidesign_core::record::{Certificate, OutPoint, Transaction, TxIn, TxOut};
use sidesign_core::resolver::InMemoryCoinView;
use sidesign_core::script::{multisig, pay_to_pubkey_hash, pay_to_script_hash, Script};

/// Deterministic key from a one-byte seed.
pub fn key(seed: u8) -> KeyEntry {
    let mut bytes = [0u8; 32];
    bytes[31] = seed;
    bytes[0] = 0x01;
    KeyEntry::new(SecretKey::from_slice(&bytes).unwrap(), true)
}

pub fn outpoint(seed: u8, vout: u32) -> OutPoint {
    OutPoint::new([seed; 32], vout)
}

/// Display-order txid string for RPC parameters.
pub fn display_txid(txid: &[u8; 32]) -> String {
    let mut bytes = *txid;
    bytes.reverse();
    hex::encode(bytes)
}

/// A 2-of-3 redeem script over three seeded keys, plus its p2sh locking
/// script.
pub fn two_of_three(seeds: [u8; 3]) -> (Script, Script) {
    let pubkeys: Vec<Vec<u8>> = seeds.iter().map(|s| key(*s).pubkey_bytes()).collect();
    let redeem = multisig(2, &pubkeys);
    let hash = hash160::Hash::hash(redeem.as_bytes()).to_byte_array();
    (redeem, pay_to_script_hash(&hash))
}

/// One-input, one-output transaction spending the given points.
pub fn transaction(points: &[OutPoint]) -> Transaction {
    Transaction {
        version: 1,
        inputs: points.iter().map(|p| TxIn::new(*p)).collect(),
        outputs: vec![TxOut {
            value: 25_000,
            script_pubkey: pay_to_pubkey_hash(&[9u8; 20]),
        }],
        lock_time: 0,
    }
}

/// Certificate with one ordinary input and one backward-transfer output.
pub fn certificate(points: &[OutPoint]) -> Certificate {
    Certificate {
        version: -5,
        sidechain_id: [0xcd; 32],
        epoch_number: 7,
        quality: 42,
        end_epoch_block_hash: [0xef; 32],
        proof: vec![0x11; 16],
        inputs: points.iter().map(|p| TxIn::new(*p)).collect(),
        outputs: vec![TxOut {
            value: 12_000,
            script_pubkey: pay_to_pubkey_hash(&[2u8; 20]),
        }],
    }
}

/// Chain view with each point funded by the given locking script.
pub fn funded_chain(entries: &[(OutPoint, Script)]) -> InMemoryCoinView {
    let mut chain = InMemoryCoinView::new();
    for (point, script) in entries {
        chain.insert(*point, script.clone(), 50_000);
    }
    chain
}
