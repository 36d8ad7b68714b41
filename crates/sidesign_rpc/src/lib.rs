//! Call-shaped signing surface: data in, data out, no transport.
//!
//! Request and response shapes mirror the node's raw-signing calls, with
//! the fatal error strings callers match on. Everything per-input lands in
//! the response's `errors` array instead.

pub mod decode;
pub mod sign;

use thiserror::Error;

use sidesign_core::CoreError;
use sidesign_wallet::WalletError;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("TX decode failed")]
    TxDecodeFailed,

    #[error("Missing transaction")]
    MissingTransaction,

    #[error("Cert decode failed")]
    CertDecodeFailed,

    #[error("Missing input certificate")]
    MissingInputCertificate,

    #[error("Found {0} extra byte{plural} after certificate", plural = if *.0 == 1 { "" } else { "s" })]
    ExtraCertBytes(usize),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Private key outside allowed range")]
    PrivateKeyOutOfRange,

    #[error("Previous output scriptPubKey mismatch")]
    PrevOutScriptMismatch,

    #[error("Invalid sighash param")]
    InvalidSigHashParam,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl From<CoreError> for RpcError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidKey => RpcError::InvalidPrivateKey,
            CoreError::KeyOutOfRange => RpcError::PrivateKeyOutOfRange,
            CoreError::PrevOutScriptMismatch { .. } => RpcError::PrevOutScriptMismatch,
            CoreError::InvalidSigHashParam => RpcError::InvalidSigHashParam,
            other => RpcError::InvalidParameter(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

pub use decode::{decode_script, DecodedScript};
pub use sign::{
    PrevOutParam, SignRawCertificateRequest, SignRawTransactionRequest, SignResponse,
    SignatureError, SigningService,
};
