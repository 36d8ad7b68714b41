//! Key material: explicit caller-supplied keys or an external keystore.
//!
//! Explicit keys are validated eagerly — a single malformed or out-of-range
//! key aborts the whole call before any input is signed, matching the
//! all-or-nothing trust model of caller-supplied material.

use std::collections::HashMap;

use bitcoin_hashes::{hash160, Hash};
use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::error::{CoreError, Result};
use crate::script::Script;

/// Base58check version byte for WIF-encoded private keys.
pub const WIF_VERSION: u8 = 0x80;

/// A validated private key plus its derived public identity.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    secret: SecretKey,
    public: PublicKey,
    compressed: bool,
}

impl KeyEntry {
    pub fn new(secret: SecretKey, compressed: bool) -> Self {
        let secp = Secp256k1::signing_only();
        let public = PublicKey::from_secret_key(&secp, &secret);
        KeyEntry {
            secret,
            public,
            compressed,
        }
    }

    /// Decode a WIF string: base58check, version byte, 32-byte key,
    /// optional compression marker, secp range check.
    pub fn from_wif(wif: &str) -> Result<Self> {
        let payload = bs58::decode(wif)
            .with_check(None)
            .into_vec()
            .map_err(|_| CoreError::InvalidKey)?;
        let (version, key_bytes) = payload.split_first().ok_or(CoreError::InvalidKey)?;
        if *version != WIF_VERSION {
            return Err(CoreError::InvalidKey);
        }
        let (key_bytes, compressed) = match key_bytes.len() {
            32 => (key_bytes, false),
            33 if key_bytes[32] == 0x01 => (&key_bytes[..32], true),
            _ => return Err(CoreError::InvalidKey),
        };
        let secret = SecretKey::from_slice(key_bytes).map_err(|_| CoreError::KeyOutOfRange)?;
        Ok(KeyEntry::new(secret, compressed))
    }

    pub fn to_wif(&self) -> String {
        let mut payload = vec![WIF_VERSION];
        payload.extend_from_slice(&self.secret.secret_bytes());
        if self.compressed {
            payload.push(0x01);
        }
        bs58::encode(payload).with_check().into_string()
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Serialized public key in the form its key id commits to.
    pub fn pubkey_bytes(&self) -> Vec<u8> {
        if self.compressed {
            self.public.serialize().to_vec()
        } else {
            self.public.serialize_uncompressed().to_vec()
        }
    }

    /// HASH160 of the serialized public key.
    pub fn key_id(&self) -> [u8; 20] {
        hash160::Hash::hash(&self.pubkey_bytes()).to_byte_array()
    }
}

/// Lookup seam the signing engine works against.
pub trait KeyStore {
    fn key(&self, key_id: &[u8; 20]) -> Option<&KeyEntry>;
    fn redeem_script(&self, script_hash: &[u8; 20]) -> Option<&Script>;
}

/// In-memory keystore backing the explicit-key mode.
#[derive(Debug, Default)]
pub struct BasicKeyStore {
    keys: HashMap<[u8; 20], KeyEntry>,
    scripts: HashMap<[u8; 20], Script>,
}

impl BasicKeyStore {
    pub fn new() -> Self {
        BasicKeyStore::default()
    }

    /// Build from caller-supplied WIF strings; any bad key is fatal.
    pub fn from_wifs<S: AsRef<str>>(wifs: &[S]) -> Result<Self> {
        let mut store = BasicKeyStore::new();
        for wif in wifs {
            store.add_key(KeyEntry::from_wif(wif.as_ref())?);
        }
        Ok(store)
    }

    pub fn add_key(&mut self, entry: KeyEntry) {
        self.keys.insert(entry.key_id(), entry);
    }

    pub fn add_redeem_script(&mut self, script: Script) {
        let hash = hash160::Hash::hash(script.as_bytes()).to_byte_array();
        self.scripts.insert(hash, script);
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.scripts.is_empty()
    }
}

impl KeyStore for BasicKeyStore {
    fn key(&self, key_id: &[u8; 20]) -> Option<&KeyEntry> {
        self.keys.get(key_id)
    }

    fn redeem_script(&self, script_hash: &[u8; 20]) -> Option<&Script> {
        self.scripts.get(script_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seed: u8, compressed: bool) -> KeyEntry {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        bytes[0] = 0x01;
        KeyEntry::new(SecretKey::from_slice(&bytes).unwrap(), compressed)
    }

    #[test]
    fn wif_round_trip() {
        for compressed in [true, false] {
            let e = entry(3, compressed);
            let decoded = KeyEntry::from_wif(&e.to_wif()).unwrap();
            assert_eq!(decoded.secret(), e.secret());
            assert_eq!(decoded.pubkey_bytes(), e.pubkey_bytes());
            assert_eq!(decoded.key_id(), e.key_id());
        }
    }

    #[test]
    fn compressed_and_uncompressed_ids_differ() {
        assert_ne!(entry(3, true).key_id(), entry(3, false).key_id());
    }

    #[test]
    fn bad_checksum_rejected() {
        let mut wif = entry(3, true).to_wif();
        // flip a character to break the checksum
        let replacement = if wif.ends_with('1') { '2' } else { '1' };
        wif.pop();
        wif.push(replacement);
        assert!(matches!(
            KeyEntry::from_wif(&wif),
            Err(CoreError::InvalidKey)
        ));
    }

    #[test]
    fn wrong_version_byte_rejected() {
        let mut payload = vec![0x6f]; // not the secret-key version
        payload.extend([1u8; 32]);
        let wif = bs58::encode(payload).with_check().into_string();
        assert!(matches!(
            KeyEntry::from_wif(&wif),
            Err(CoreError::InvalidKey)
        ));
    }

    #[test]
    fn out_of_range_key_rejected() {
        // the curve order itself is not a valid secret key
        let order = [
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c,
            0xd0, 0x36, 0x41, 0x41,
        ];
        let mut payload = vec![WIF_VERSION];
        payload.extend(order);
        payload.push(0x01);
        let wif = bs58::encode(payload).with_check().into_string();
        assert!(matches!(
            KeyEntry::from_wif(&wif),
            Err(CoreError::KeyOutOfRange)
        ));
    }

    #[test]
    fn from_wifs_aborts_on_single_bad_key() {
        let good = entry(1, true).to_wif();
        assert!(BasicKeyStore::from_wifs(&[good.as_str(), "not-a-key"]).is_err());
    }

    #[test]
    fn redeem_script_lookup_by_hash() {
        let mut store = BasicKeyStore::new();
        let script = crate::script::pay_to_pubkey_hash(&[4u8; 20]);
        store.add_redeem_script(script.clone());
        let hash = hash160::Hash::hash(script.as_bytes()).to_byte_array();
        assert_eq!(store.redeem_script(&hash), Some(&script));
        assert_eq!(store.redeem_script(&[0u8; 20]), None);
    }
}
