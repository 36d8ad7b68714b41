//! The per-input reconciliation loop.
//!
//! For every input of the primary record: clear the stale unlocking script,
//! look up the prior output, produce fresh shares from the keystore, merge
//! with the shares carried by the other decoded variants, then verify. Each
//! failure is recorded against its input and the loop moves on; the batch is
//! complete only when every input verifies.

use tracing::debug;

use crate::combine::combine;
use crate::interpreter::{verify_script, SignableChecker};
use crate::keystore::KeyStore;
use crate::record::{OutPoint, Signable};
use crate::resolver::ResolvedOutputs;
use crate::script::Script;
use crate::sighash::{SigHashBase, SigHashMode};
use crate::signer::produce_script;

/// One input that failed to resolve or verify, with the state it was left in.
#[derive(Debug, Clone)]
pub struct VerificationError {
    pub outpoint: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    pub reason: String,
}

/// The reconciled record plus everything that went wrong per input.
#[derive(Debug)]
pub struct ReconciliationResult {
    pub signable: Signable,
    pub complete: bool,
    pub errors: Vec<VerificationError>,
}

/// Run the reconciliation loop over `signable`, merging in the unlocking
/// scripts of `variants` (other decodings of the same record).
///
/// Inputs whose prior output is unknown or already spent are reported as
/// "Input not found or already spent" with their unlocking script cleared.
/// Under a SINGLE mode, inputs without a matching output are not re-signed
/// but still take part in merging and verification.
pub fn reconcile(
    mut signable: Signable,
    variants: &[Signable],
    resolved: &ResolvedOutputs,
    keystore: &dyn KeyStore,
    mode: SigHashMode,
) -> ReconciliationResult {
    let hash_single = signable.is_transaction() && mode.base == SigHashBase::Single;
    let input_count = signable.inputs().len();
    let output_count = signable.outputs().len();
    let mut errors = Vec::new();
    let mut complete = true;

    for i in 0..input_count {
        let outpoint = signable.inputs()[i].prevout;
        signable.inputs_mut()[i].script_sig = Script::new();

        let Some(prior) = resolved.spendable(&outpoint) else {
            complete = false;
            errors.push(input_error(&signable, i, "Input not found or already spent"));
            continue;
        };
        let script_pubkey = prior.script_pubkey.clone();

        if !hash_single || i < output_count {
            let produced = produce_script(&signable, i, &script_pubkey, keystore, mode);
            signable.inputs_mut()[i].script_sig = produced;
        }

        let mut candidates = vec![signable.inputs()[i].script_sig.clone()];
        for variant in variants {
            if let Some(input) = variant.inputs().get(i) {
                candidates.push(input.script_sig.clone());
            }
        }
        signable.inputs_mut()[i].script_sig = combine(&script_pubkey, &signable, i, &candidates);

        let script_sig = signable.inputs()[i].script_sig.clone();
        let checker = SignableChecker::new(&signable, i);
        if let Err(err) = verify_script(&script_sig, &script_pubkey, &checker) {
            complete = false;
            errors.push(input_error(&signable, i, &err.to_string()));
        }
    }

    debug!(inputs = input_count, errors = errors.len(), complete, "reconciled");
    ReconciliationResult {
        signable,
        complete,
        errors,
    }
}

fn input_error(signable: &Signable, index: usize, message: &str) -> VerificationError {
    let input = &signable.inputs()[index];
    VerificationError {
        outpoint: input.prevout,
        script_sig: input.script_sig.clone(),
        sequence: input.sequence,
        reason: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin_hashes::{hash160, Hash};

    use crate::keystore::{BasicKeyStore, KeyEntry};
    use crate::record::{Certificate, OutPoint, Transaction, TxIn, TxOut};
    use crate::resolver::InMemoryCoinView;
    use crate::script::{multisig, pay_to_pubkey_hash, pay_to_script_hash};

    fn entry(seed: u8) -> KeyEntry {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        bytes[0] = 0x01;
        KeyEntry::new(secp256k1::SecretKey::from_slice(&bytes).unwrap(), true)
    }

    fn tx_spending(points: &[OutPoint]) -> Signable {
        Signable::Transaction(Transaction {
            version: 1,
            inputs: points.iter().map(|p| TxIn::new(*p)).collect(),
            outputs: vec![TxOut {
                value: 25_000,
                script_pubkey: pay_to_pubkey_hash(&[9u8; 20]),
            }],
            lock_time: 0,
        })
    }

    fn resolved_with(
        entries: &[(OutPoint, Script)],
    ) -> ResolvedOutputs {
        let mut chain = InMemoryCoinView::new();
        for (point, script) in entries {
            chain.insert(*point, script.clone(), 50_000);
        }
        let points: Vec<OutPoint> = entries.iter().map(|(p, _)| *p).collect();
        ResolvedOutputs::resolve(&chain, None, points.iter())
    }

    #[test]
    fn single_key_input_completes() {
        let key = entry(1);
        let point = OutPoint::new([1u8; 32], 0);
        let resolved = resolved_with(&[(point, pay_to_pubkey_hash(&key.key_id()))]);
        let mut store = BasicKeyStore::new();
        store.add_key(key);

        let outcome = reconcile(tx_spending(&[point]), &[], &resolved, &store, SigHashMode::ALL);
        assert!(outcome.complete);
        assert!(outcome.errors.is_empty());
        assert!(!outcome.signable.inputs()[0].script_sig.is_empty());
    }

    #[test]
    fn missing_prior_output_is_recorded_not_fatal() {
        let key = entry(1);
        let known = OutPoint::new([1u8; 32], 0);
        let unknown = OutPoint::new([2u8; 32], 7);
        let resolved = resolved_with(&[(known, pay_to_pubkey_hash(&key.key_id()))]);
        let mut store = BasicKeyStore::new();
        store.add_key(key);

        let outcome = reconcile(
            tx_spending(&[known, unknown]),
            &[],
            &resolved,
            &store,
            SigHashMode::ALL,
        );
        assert!(!outcome.complete);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].outpoint, unknown);
        assert_eq!(outcome.errors[0].reason, "Input not found or already spent");
        // the known input still got signed
        assert!(!outcome.signable.inputs()[0].script_sig.is_empty());
        // the failed input's stale script was cleared
        assert!(outcome.signable.inputs()[1].script_sig.is_empty());
    }

    #[test]
    fn spent_prior_output_is_recorded() {
        let key = entry(1);
        let point = OutPoint::new([1u8; 32], 0);
        let mut chain = InMemoryCoinView::new();
        chain.insert(point, pay_to_pubkey_hash(&key.key_id()), 50_000);
        chain.mark_spent(&point);
        let resolved = ResolvedOutputs::resolve(&chain, None, [&point]);
        let mut store = BasicKeyStore::new();
        store.add_key(key);

        let outcome = reconcile(tx_spending(&[point]), &[], &resolved, &store, SigHashMode::ALL);
        assert!(!outcome.complete);
        assert_eq!(outcome.errors[0].reason, "Input not found or already spent");
    }

    #[test]
    fn missing_key_reports_verification_failure() {
        let point = OutPoint::new([1u8; 32], 0);
        let resolved = resolved_with(&[(point, pay_to_pubkey_hash(&[7u8; 20]))]);
        let store = BasicKeyStore::new();

        let outcome = reconcile(tx_spending(&[point]), &[], &resolved, &store, SigHashMode::ALL);
        assert!(!outcome.complete);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].outpoint, point);
    }

    #[test]
    fn variants_contribute_multisig_shares() {
        let k1 = entry(1);
        let k2 = entry(2);
        let k3 = entry(3);
        let redeem = multisig(
            2,
            &[k1.pubkey_bytes(), k2.pubkey_bytes(), k3.pubkey_bytes()],
        );
        let redeem_hash = hash160::Hash::hash(redeem.as_bytes()).to_byte_array();
        let point = OutPoint::new([1u8; 32], 0);
        let resolved = resolved_with(&[(point, pay_to_script_hash(&redeem_hash))]);

        // Party A signs with key 1 only.
        let mut store_a = BasicKeyStore::new();
        store_a.add_key(k1);
        store_a.add_redeem_script(redeem.clone());
        let partial = reconcile(tx_spending(&[point]), &[], &resolved, &store_a, SigHashMode::ALL);
        assert!(!partial.complete);

        // Party B holds key 3 and merges A's partially signed variant.
        let mut store_b = BasicKeyStore::new();
        store_b.add_key(k3);
        store_b.add_redeem_script(redeem);
        let outcome = reconcile(
            tx_spending(&[point]),
            &[partial.signable],
            &resolved,
            &store_b,
            SigHashMode::ALL,
        );
        assert!(outcome.complete, "{:?}", outcome.errors);
    }

    #[test]
    fn single_mode_skips_signing_inputs_past_outputs() {
        let key = entry(1);
        let p1 = OutPoint::new([1u8; 32], 0);
        let p2 = OutPoint::new([2u8; 32], 0);
        let script = pay_to_pubkey_hash(&key.key_id());
        let resolved = resolved_with(&[(p1, script.clone()), (p2, script)]);
        let mut store = BasicKeyStore::new();
        store.add_key(key);

        // two inputs, one output
        let outcome = reconcile(
            tx_spending(&[p1, p2]),
            &[],
            &resolved,
            &store,
            SigHashMode::parse("SINGLE").unwrap(),
        );
        assert!(!outcome.complete);
        assert!(!outcome.signable.inputs()[0].script_sig.is_empty());
        assert!(outcome.signable.inputs()[1].script_sig.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].outpoint, p2);
    }

    #[test]
    fn certificate_inputs_sign_like_transaction_inputs() {
        let key = entry(1);
        let point = OutPoint::new([1u8; 32], 0);
        let resolved = resolved_with(&[(point, pay_to_pubkey_hash(&key.key_id()))]);
        let mut store = BasicKeyStore::new();
        store.add_key(key);

        let cert = Signable::Certificate(Certificate {
            version: -5,
            sidechain_id: [0xaa; 32],
            epoch_number: 4,
            quality: 11,
            end_epoch_block_hash: [0xbb; 32],
            proof: vec![1, 2, 3],
            inputs: vec![TxIn::new(point)],
            outputs: vec![TxOut {
                value: 9_000,
                script_pubkey: pay_to_pubkey_hash(&[3u8; 20]),
            }],
        });
        let outcome = reconcile(cert, &[], &resolved, &store, SigHashMode::ALL);
        assert!(outcome.complete, "{:?}", outcome.errors);
    }

    #[test]
    fn errors_follow_input_order() {
        let unknown_a = OutPoint::new([4u8; 32], 0);
        let unknown_b = OutPoint::new([5u8; 32], 1);
        let resolved = resolved_with(&[]);
        let store = BasicKeyStore::new();

        let outcome = reconcile(
            tx_spending(&[unknown_a, unknown_b]),
            &[],
            &resolved,
            &store,
            SigHashMode::ALL,
        );
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.errors[0].outpoint, unknown_a);
        assert_eq!(outcome.errors[1].outpoint, unknown_b);
    }
}
