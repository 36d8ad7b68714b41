//! Partial-signature reconciliation for raw transactions and sidechain
//! withdrawal certificates.
//!
//! The engine takes a serialized record, resolves the outputs it spends
//! across chain, pool, and caller-supplied layers, produces whatever
//! signatures the available key material allows, merges them with shares
//! carried by other decodings of the same record, and verifies the result
//! input by input.

pub mod combine;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod interpreter;
pub mod keystore;
pub mod record;
pub mod resolver;
pub mod script;
pub mod sighash;
pub mod signer;

pub use combine::combine;
pub use driver::{reconcile, ReconciliationResult, VerificationError};
pub use error::{CoreError, Result};
pub use keystore::{BasicKeyStore, KeyEntry, KeyStore};
pub use record::{Certificate, OutPoint, Signable, Transaction, TxIn, TxOut};
pub use resolver::{CoinView, InMemoryCoinView, PrevOutOverride, PriorOutput, ResolvedOutputs};
pub use script::{Destination, Script, ScriptBuilder};
pub use sighash::{SigHashBase, SigHashMode};
