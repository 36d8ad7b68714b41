//! Merging independently produced unlocking scripts for one input.
//!
//! Deterministic and order-independent in outcome: single-signature
//! destinations take the first syntactically valid candidate; multisig
//! destinations take the union of valid shares deduplicated by signer key;
//! unknown destinations take the first non-empty candidate. The result is
//! never less capable than the best individual candidate.

use bitcoin_hashes::{hash160, Hash};

use crate::interpreter::{verify_script, SignableChecker, SignatureChecker};
use crate::record::Signable;
use crate::script::{
    pay_to_script_hash, small_int, Destination, Instruction, Script, ScriptBuilder,
};
use crate::sighash::SigHashMode;

/// Merge candidate unlocking scripts for `index` under its locking script.
pub fn combine(
    script_pubkey: &Script,
    signable: &Signable,
    index: usize,
    candidates: &[Script],
) -> Script {
    combine_inner(script_pubkey, signable, index, candidates, true)
}

fn combine_inner(
    script_code: &Script,
    signable: &Signable,
    index: usize,
    candidates: &[Script],
    allow_script_hash: bool,
) -> Script {
    match script_code.destination() {
        Destination::PubKey(_) | Destination::PubKeyHash(_) => candidates
            .iter()
            .find(|c| has_valid_leading_signature(c))
            .or_else(|| candidates.iter().find(|c| !c.is_empty()))
            .cloned()
            .unwrap_or_default(),
        Destination::ScriptHash(hash) if allow_script_hash => {
            combine_script_hash(&hash, signable, index, candidates)
        }
        Destination::Multisig { required, pubkeys } => {
            combine_multisig(script_code, signable, index, candidates, required, &pubkeys)
        }
        _ => candidates
            .iter()
            .find(|c| !c.is_empty())
            .cloned()
            .unwrap_or_default(),
    }
}

/// Strip the redeem-script push from each candidate, combine the inner
/// scripts against the redeem script, and re-append it.
///
/// Only a final push that actually hashes to `script_hash` counts as the
/// redeem script; candidates carrying anything else cannot satisfy the
/// locking script and are ignored.
fn combine_script_hash(
    script_hash: &[u8; 20],
    signable: &Signable,
    index: usize,
    candidates: &[Script],
) -> Script {
    let redeem = candidates
        .iter()
        .filter_map(|c| c.last_push())
        .find(|data| hash160::Hash::hash(data).to_byte_array() == *script_hash)
        .map(Script::from_bytes);
    let Some(redeem) = redeem else {
        // No candidate carries the redeem script; nothing to improve on.
        return candidates
            .iter()
            .find(|c| !c.is_empty())
            .cloned()
            .unwrap_or_default();
    };

    let inner: Vec<Script> = candidates
        .iter()
        .filter(|c| c.last_push().map(Script::from_bytes).as_ref() == Some(&redeem))
        .filter_map(|c| strip_last_push(c))
        .collect();
    let combined = combine_inner(&redeem, signable, index, &inner, false);

    let mut builder = ScriptBuilder::new();
    for item in push_items(&combined).unwrap_or_default() {
        builder = builder.push_slice(&item);
    }
    let assembled = builder.push_slice(redeem.as_bytes()).into_script();

    // Never regress: a candidate that already satisfies the locking script
    // wins over a merge that does not.
    let checker = SignableChecker::new(signable, index);
    let locking = pay_to_script_hash(script_hash);
    if verify_script(&assembled, &locking, &checker).is_ok() {
        return assembled;
    }
    candidates
        .iter()
        .find(|c| verify_script(c, &locking, &checker).is_ok())
        .cloned()
        .unwrap_or(assembled)
}

fn combine_multisig(
    script_code: &Script,
    signable: &Signable,
    index: usize,
    candidates: &[Script],
    required: usize,
    pubkeys: &[Vec<u8>],
) -> Script {
    let checker = SignableChecker::new(signable, index);

    // Union of shares, deduplicated by the signer key each verifies under.
    let mut matched: Vec<Option<Vec<u8>>> = vec![None; pubkeys.len()];
    for candidate in candidates {
        let Some(items) = push_items(candidate) else {
            continue;
        };
        for item in items {
            if item.is_empty() {
                continue; // dummy or placeholder slot
            }
            for (slot, pubkey) in matched.iter_mut().zip(pubkeys) {
                if slot.is_none() && checker.check_sig(&item, pubkey, script_code) {
                    *slot = Some(item.clone());
                    break;
                }
            }
        }
    }

    let mut builder = ScriptBuilder::new().push_slice(&[]);
    let mut have = 0usize;
    for sig in matched.iter().flatten() {
        if have == required {
            break;
        }
        builder = builder.push_slice(sig);
        have += 1;
    }
    // Placeholder slots keep the share positions visible when incomplete.
    for _ in have..required {
        builder = builder.push_slice(&[]);
    }
    let assembled = builder.into_script();

    // Never regress: an individual candidate with the same share count but
    // fewer bytes wins the tie.
    let assembled_count = count_valid_shares(&assembled, script_code, &checker, pubkeys);
    let best = candidates
        .iter()
        .map(|c| {
            (
                count_valid_shares(c, script_code, &checker, pubkeys),
                c.clone(),
            )
        })
        .max_by(|(ca, a), (cb, b)| ca.cmp(cb).then(b.len().cmp(&a.len())));
    match best {
        Some((count, candidate))
            if count > assembled_count
                || (count == assembled_count && candidate.len() < assembled.len()) =>
        {
            candidate
        }
        _ => assembled,
    }
}

fn count_valid_shares(
    script: &Script,
    script_code: &Script,
    checker: &SignableChecker<'_>,
    pubkeys: &[Vec<u8>],
) -> usize {
    let Some(items) = push_items(script) else {
        return 0;
    };
    let mut used = vec![false; pubkeys.len()];
    let mut count = 0usize;
    for item in items {
        if item.is_empty() {
            continue;
        }
        for (i, pubkey) in pubkeys.iter().enumerate() {
            if !used[i] && checker.check_sig(&item, pubkey, script_code) {
                used[i] = true;
                count += 1;
                break;
            }
        }
    }
    count
}

/// A non-empty, push-only script whose first element parses as a DER
/// signature with a known hash-type byte.
fn has_valid_leading_signature(script: &Script) -> bool {
    let Some(items) = push_items(script) else {
        return false;
    };
    let Some(first) = items.first() else {
        return false;
    };
    let Some((&type_byte, der)) = first.split_last() else {
        return false;
    };
    secp256k1::ecdsa::Signature::from_der(der).is_ok()
        && SigHashMode::from_byte(type_byte).is_some()
}

/// Decompose a push-only script into its stack items.
fn push_items(script: &Script) -> Option<Vec<Vec<u8>>> {
    let mut items = Vec::new();
    for ins in script.instructions() {
        match ins? {
            Instruction::Push(data) => items.push(data.to_vec()),
            Instruction::Op(op) => items.push(vec![small_int(op)? as u8]),
        }
    }
    Some(items)
}

fn strip_last_push(script: &Script) -> Option<Script> {
    let items = push_items(script)?;
    let (_, rest) = items.split_last()?;
    let mut builder = ScriptBuilder::new();
    for item in rest {
        builder = builder.push_slice(item);
    }
    Some(builder.into_script())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin_hashes::{hash160, Hash};

    use crate::interpreter::verify_script;
    use crate::keystore::{BasicKeyStore, KeyEntry};
    use crate::record::{OutPoint, Transaction, TxIn, TxOut};
    use crate::script::{multisig, pay_to_pubkey_hash, pay_to_script_hash};
    use crate::signer::produce_script;

    fn entry(seed: u8) -> KeyEntry {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        bytes[0] = 0x01;
        KeyEntry::new(secp256k1::SecretKey::from_slice(&bytes).unwrap(), true)
    }

    fn one_input_tx() -> Signable {
        Signable::Transaction(Transaction {
            version: 1,
            inputs: vec![TxIn::new(OutPoint::new([1u8; 32], 0))],
            outputs: vec![TxOut {
                value: 40_000,
                script_pubkey: pay_to_pubkey_hash(&[9u8; 20]),
            }],
            lock_time: 0,
        })
    }

    #[test]
    fn valid_candidate_beats_empty() {
        let key = entry(1);
        let script_pubkey = pay_to_pubkey_hash(&key.key_id());
        let mut store = BasicKeyStore::new();
        store.add_key(key);
        let signable = one_input_tx();
        let valid = produce_script(&signable, 0, &script_pubkey, &store, SigHashMode::ALL);

        let a = combine(
            &script_pubkey,
            &signable,
            0,
            &[valid.clone(), Script::new()],
        );
        let b = combine(
            &script_pubkey,
            &signable,
            0,
            &[Script::new(), valid.clone()],
        );
        assert_eq!(a, valid);
        assert_eq!(a, b, "combine must be order-independent in outcome");
    }

    #[test]
    fn unknown_destination_takes_first_non_empty() {
        let script_pubkey = Script::from_bytes(vec![0x51]); // bare OP_1, nonstandard here
        let signable = one_input_tx();
        let junk = ScriptBuilder::new().push_slice(&[1, 2, 3]).into_script();
        let combined = combine(&script_pubkey, &signable, 0, &[Script::new(), junk.clone()]);
        assert_eq!(combined, junk);
    }

    #[test]
    fn multisig_shares_from_two_candidates_merge_and_verify() {
        let k1 = entry(1);
        let k2 = entry(2);
        let k3 = entry(3);
        let redeem = multisig(
            2,
            &[k1.pubkey_bytes(), k2.pubkey_bytes(), k3.pubkey_bytes()],
        );
        let redeem_hash = hash160::Hash::hash(redeem.as_bytes()).to_byte_array();
        let script_pubkey = pay_to_script_hash(&redeem_hash);
        let signable = one_input_tx();

        let mut store1 = BasicKeyStore::new();
        store1.add_key(k1);
        store1.add_redeem_script(redeem.clone());
        let partial1 = produce_script(&signable, 0, &script_pubkey, &store1, SigHashMode::ALL);

        let mut store2 = BasicKeyStore::new();
        store2.add_key(k3);
        store2.add_redeem_script(redeem.clone());
        let partial2 = produce_script(&signable, 0, &script_pubkey, &store2, SigHashMode::ALL);

        let checker = SignableChecker::new(&signable, 0);
        assert!(verify_script(&partial1, &script_pubkey, &checker).is_err());
        assert!(verify_script(&partial2, &script_pubkey, &checker).is_err());

        let combined = combine(
            &script_pubkey,
            &signable,
            0,
            &[partial1.clone(), partial2.clone()],
        );
        assert_eq!(verify_script(&combined, &script_pubkey, &checker), Ok(()));

        // Outcome must not depend on candidate order.
        let reversed = combine(&script_pubkey, &signable, 0, &[partial2, partial1]);
        assert_eq!(combined, reversed);
    }

    #[test]
    fn duplicate_shares_are_deduplicated() {
        let k1 = entry(1);
        let k2 = entry(2);
        let redeem = multisig(2, &[k1.pubkey_bytes(), k2.pubkey_bytes()]);
        let redeem_hash = hash160::Hash::hash(redeem.as_bytes()).to_byte_array();
        let script_pubkey = pay_to_script_hash(&redeem_hash);
        let signable = one_input_tx();

        let mut store = BasicKeyStore::new();
        store.add_key(k1);
        store.add_redeem_script(redeem.clone());
        let partial = produce_script(&signable, 0, &script_pubkey, &store, SigHashMode::ALL);

        let combined = combine(
            &script_pubkey,
            &signable,
            0,
            &[partial.clone(), partial.clone()],
        );
        // Same single share twice can never satisfy a 2-of-2.
        let checker = SignableChecker::new(&signable, 0);
        assert!(verify_script(&combined, &script_pubkey, &checker).is_err());
    }

    #[test]
    fn script_hash_junk_candidate_cannot_displace_valid_script() {
        let key = entry(4);
        let redeem = multisig(1, &[key.pubkey_bytes()]);
        let redeem_hash = hash160::Hash::hash(redeem.as_bytes()).to_byte_array();
        let script_pubkey = pay_to_script_hash(&redeem_hash);
        let signable = one_input_tx();

        let mut store = BasicKeyStore::new();
        store.add_key(key);
        store.add_redeem_script(redeem);
        let valid = produce_script(&signable, 0, &script_pubkey, &store, SigHashMode::ALL);

        let checker = SignableChecker::new(&signable, 0);
        assert_eq!(verify_script(&valid, &script_pubkey, &checker), Ok(()));

        // A non-empty candidate whose last push is not the redeem script
        // must not hijack redeem selection, in either order.
        let junk = ScriptBuilder::new().push_slice(&[0xde, 0xad]).into_script();
        let ahead = combine(
            &script_pubkey,
            &signable,
            0,
            &[Script::new(), junk.clone(), valid.clone()],
        );
        assert_eq!(verify_script(&ahead, &script_pubkey, &checker), Ok(()));

        let behind = combine(&script_pubkey, &signable, 0, &[valid, junk]);
        assert_eq!(verify_script(&behind, &script_pubkey, &checker), Ok(()));
    }

    #[test]
    fn combine_never_regresses_below_best_candidate() {
        let key = entry(1);
        let script_pubkey = pay_to_pubkey_hash(&key.key_id());
        let mut store = BasicKeyStore::new();
        store.add_key(key);
        let signable = one_input_tx();
        let valid = produce_script(&signable, 0, &script_pubkey, &store, SigHashMode::ALL);

        let garbage = ScriptBuilder::new().push_slice(&[0xde, 0xad]).into_script();
        let combined = combine(&script_pubkey, &signable, 0, &[garbage, valid.clone()]);
        assert_eq!(combined, valid);
    }
}
