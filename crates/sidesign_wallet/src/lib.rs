//! Node-wallet key material for the reconciliation engine.
//!
//! NOT a full wallet: no balances, no coin selection, no persistence. It
//! holds keys and redeem scripts, answers the engine's `KeyStore` lookups,
//! and enforces the lock state that gates signing with wallet keys.

pub mod store;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Please enter the wallet passphrase with walletpassphrase first")]
    Locked,

    #[error(transparent)]
    Core(#[from] sidesign_core::CoreError),
}

pub type Result<T> = std::result::Result<T, WalletError>;

pub use store::Wallet;
