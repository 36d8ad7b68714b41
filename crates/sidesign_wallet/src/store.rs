//! In-memory wallet store with a lock gate.

use tracing::info;

use sidesign_core::keystore::{BasicKeyStore, KeyEntry, KeyStore};
use sidesign_core::script::Script;

use crate::{Result, WalletError};

/// Keys and redeem scripts held by the node, behind a lock flag.
///
/// A locked wallet still answers read queries (addresses, scripts) but must
/// be unlocked before any of its keys sign; callers check `ensure_unlocked`
/// once per signing call rather than per input.
#[derive(Debug, Default)]
pub struct Wallet {
    store: BasicKeyStore,
    locked: bool,
}

impl Wallet {
    pub fn new() -> Self {
        Wallet::default()
    }

    /// Import a WIF-encoded private key; malformed keys are rejected with
    /// the core decode error.
    pub fn import_wif(&mut self, wif: &str) -> Result<()> {
        let entry = KeyEntry::from_wif(wif)?;
        info!(key_id = %hex::encode(entry.key_id()), "imported key");
        self.store.add_key(entry);
        Ok(())
    }

    pub fn add_key(&mut self, entry: KeyEntry) {
        self.store.add_key(entry);
    }

    pub fn add_redeem_script(&mut self, script: Script) {
        self.store.add_redeem_script(script);
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Fatal when locked; signing with wallet keys must not proceed.
    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(WalletError::Locked);
        }
        Ok(())
    }
}

impl KeyStore for Wallet {
    fn key(&self, key_id: &[u8; 20]) -> Option<&KeyEntry> {
        self.store.key(key_id)
    }

    fn redeem_script(&self, script_hash: &[u8; 20]) -> Option<&Script> {
        self.store.redeem_script(script_hash)
    }
}
