use thiserror::Error;

use crate::record::OutPoint;

/// Fatal, call-aborting errors.
///
/// Per-input script failures are never represented here — those are
/// collected as [`crate::driver::VerificationError`] records and the
/// reconciliation keeps going.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("record decode error: {0}")]
    Decode(String),

    #[error("found {0} extra byte(s) after record")]
    TrailingBytes(usize),

    #[error("previous output scriptPubKey mismatch for {txid}:{vout}", txid = .outpoint.txid_hex(), vout = .outpoint.vout)]
    PrevOutScriptMismatch { outpoint: OutPoint },

    #[error("invalid private key")]
    InvalidKey,

    #[error("private key outside allowed range")]
    KeyOutOfRange,

    #[error("invalid sighash param")]
    InvalidSigHashParam,

    #[error("input index {0} out of range")]
    InputIndexOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, CoreError>;
