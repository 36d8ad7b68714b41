//! Script classification helper mirroring the node's `decodescript` call.

use bitcoin_hashes::{hash160, Hash};
use serde::{Deserialize, Serialize};

use sidesign_core::script::{pay_to_script_hash, Destination, Script};

use crate::{Result, RpcError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedScript {
    #[serde(rename = "type")]
    pub script_type: String,
    #[serde(rename = "reqSigs", skip_serializing_if = "Option::is_none")]
    pub req_sigs: Option<usize>,
    /// The pay-to-script-hash locking script that would wrap this script.
    pub p2sh: String,
}

/// Classify a hex-encoded script and report its p2sh wrapping.
pub fn decode_script(hex_script: &str) -> Result<DecodedScript> {
    let bytes = hex::decode(hex_script)
        .map_err(|_| RpcError::InvalidParameter("script must be hexadecimal".into()))?;
    let script = Script::from_bytes(bytes);

    let (script_type, req_sigs) = match script.destination() {
        Destination::PubKey(_) => ("pubkey", Some(1)),
        Destination::PubKeyHash(_) => ("pubkeyhash", Some(1)),
        Destination::ScriptHash(_) => ("scripthash", None),
        Destination::Multisig { required, .. } => ("multisig", Some(required)),
        Destination::NonStandard => ("nonstandard", None),
    };

    let script_hash = hash160::Hash::hash(script.as_bytes()).to_byte_array();
    Ok(DecodedScript {
        script_type: script_type.to_string(),
        req_sigs,
        p2sh: hex::encode(pay_to_script_hash(&script_hash).as_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidesign_core::script::pay_to_pubkey_hash;

    #[test]
    fn classifies_pubkey_hash() {
        let script = pay_to_pubkey_hash(&[1u8; 20]);
        let decoded = decode_script(&hex::encode(script.as_bytes())).unwrap();
        assert_eq!(decoded.script_type, "pubkeyhash");
        assert_eq!(decoded.req_sigs, Some(1));
    }

    #[test]
    fn classifies_multisig() {
        let keys = vec![vec![0x02; 33], vec![0x03; 33]];
        let script = sidesign_core::script::multisig(2, &keys);
        let decoded = decode_script(&hex::encode(script.as_bytes())).unwrap();
        assert_eq!(decoded.script_type, "multisig");
        assert_eq!(decoded.req_sigs, Some(2));
    }

    #[test]
    fn garbage_is_nonstandard_but_still_wraps() {
        let decoded = decode_script("6a").unwrap();
        assert_eq!(decoded.script_type, "nonstandard");
        assert!(decoded.req_sigs.is_none());
        assert_eq!(decoded.p2sh.len(), 46); // 23-byte p2sh script
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(decode_script("xyz").is_err());
    }
}
