//! Producing an unlocking script for one input.
//!
//! Dispatches on the locking script's destination pattern. Missing key
//! material yields an empty or partial script, never an error — the gap is
//! reported downstream as a verification failure so other parties can still
//! add their shares.

use bitcoin_hashes::{hash160, Hash};
use secp256k1::{Secp256k1, SignOnly};
use tracing::debug;

use crate::keystore::KeyStore;
use crate::record::Signable;
use crate::script::{Destination, Script, ScriptBuilder};
use crate::sighash::{signature_hash, SigHashMode};

/// Produce the best unlocking script the keystore allows for `index`.
///
/// For multisig destinations the result may be partial (fewer shares than
/// the threshold); callers merge it with other candidates before verifying.
pub fn produce_script(
    signable: &Signable,
    index: usize,
    script_pubkey: &Script,
    keystore: &dyn KeyStore,
    mode: SigHashMode,
) -> Script {
    let secp = Secp256k1::signing_only();
    match sign_step(&secp, signable, index, script_pubkey, keystore, mode, true) {
        Some(items) => push_all(&items),
        None => Script::new(),
    }
}

/// One solving pass over a script code; returns the stack items that
/// satisfy it, or `None` when nothing useful could be produced.
fn sign_step(
    secp: &Secp256k1<SignOnly>,
    signable: &Signable,
    index: usize,
    script_code: &Script,
    keystore: &dyn KeyStore,
    mode: SigHashMode,
    allow_script_hash: bool,
) -> Option<Vec<Vec<u8>>> {
    match script_code.destination() {
        Destination::PubKey(pubkey) => {
            let key_id = hash160::Hash::hash(&pubkey).to_byte_array();
            let entry = keystore.key(&key_id)?;
            let sig = make_signature(secp, signable, index, script_code, entry.secret(), mode)?;
            Some(vec![sig])
        }
        Destination::PubKeyHash(key_id) => {
            let entry = keystore.key(&key_id)?;
            let sig = make_signature(secp, signable, index, script_code, entry.secret(), mode)?;
            Some(vec![sig, entry.pubkey_bytes()])
        }
        Destination::Multisig { required, pubkeys } => {
            // Leading empty item feeds the CHECKMULTISIG dummy pop.
            let mut items = vec![Vec::new()];
            let mut signed = 0usize;
            for pubkey in &pubkeys {
                if signed == required {
                    break;
                }
                let key_id = hash160::Hash::hash(pubkey).to_byte_array();
                let Some(entry) = keystore.key(&key_id) else {
                    continue;
                };
                if let Some(sig) =
                    make_signature(secp, signable, index, script_code, entry.secret(), mode)
                {
                    items.push(sig);
                    signed += 1;
                }
            }
            if signed < required {
                debug!(signed, required, "multisig share incomplete");
            }
            Some(items)
        }
        Destination::ScriptHash(script_hash) if allow_script_hash => {
            let redeem = keystore.redeem_script(&script_hash)?.clone();
            let mut items =
                sign_step(secp, signable, index, &redeem, keystore, mode, false)?;
            items.push(redeem.into_bytes());
            Some(items)
        }
        _ => None,
    }
}

/// DER signature over the restricted digest, with the mode byte appended.
fn make_signature(
    secp: &Secp256k1<SignOnly>,
    signable: &Signable,
    index: usize,
    script_code: &Script,
    secret: &secp256k1::SecretKey,
    mode: SigHashMode,
) -> Option<Vec<u8>> {
    let digest = signature_hash(signable, index, script_code, mode).ok()?;
    let sig = secp.sign_ecdsa(&secp256k1::Message::from_digest(digest), secret);
    let mut bytes = sig.serialize_der().to_vec();
    bytes.push(mode.to_byte());
    Some(bytes)
}

fn push_all(items: &[Vec<u8>]) -> Script {
    let mut builder = ScriptBuilder::new();
    for item in items {
        builder = builder.push_slice(item);
    }
    builder.into_script()
}
