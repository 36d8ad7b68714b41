//! Layered resolution of the outputs a batch of inputs spends.
//!
//! Three layers: committed chain state, the pending pool shadowing it, and
//! caller-supplied overrides on top. Resolution copies what the batch needs
//! into an owned map and releases the view borrows immediately — signing and
//! verification never hold chain access, so a concurrent spend surfaces as a
//! later per-input verification failure, not a crash.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::record::OutPoint;
use crate::script::Script;

/// A spendable (or spent) output as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorOutput {
    pub script_pubkey: Script,
    pub value: i64,
    pub spendable: bool,
}

/// Read-only view over one layer of output state.
pub trait CoinView {
    fn output(&self, outpoint: &OutPoint) -> Option<PriorOutput>;
}

/// Map-backed view used for the pending pool in tests and by callers that
/// assemble state by hand.
#[derive(Debug, Default)]
pub struct InMemoryCoinView {
    outputs: HashMap<OutPoint, PriorOutput>,
}

impl InMemoryCoinView {
    pub fn new() -> Self {
        InMemoryCoinView::default()
    }

    pub fn insert(&mut self, outpoint: OutPoint, script_pubkey: Script, value: i64) {
        self.outputs.insert(
            outpoint,
            PriorOutput {
                script_pubkey,
                value,
                spendable: true,
            },
        );
    }

    /// Keep the entry but mark it unspendable (already consumed).
    pub fn mark_spent(&mut self, outpoint: &OutPoint) {
        if let Some(out) = self.outputs.get_mut(outpoint) {
            out.spendable = false;
        }
    }
}

impl CoinView for InMemoryCoinView {
    fn output(&self, outpoint: &OutPoint) -> Option<PriorOutput> {
        self.outputs.get(outpoint).cloned()
    }
}

/// Caller-supplied prior output for an input not (yet) visible in chain or
/// pool state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrevOutOverride {
    pub outpoint: OutPoint,
    pub script_pubkey: Script,
    pub redeem_script: Option<Script>,
}

/// The owned result of resolution; outlives the chain/pool borrows.
#[derive(Debug, Default)]
pub struct ResolvedOutputs {
    outputs: HashMap<OutPoint, PriorOutput>,
}

impl ResolvedOutputs {
    /// Look up every point once, pool shadowing chain. Missing points are
    /// not an error here; they become per-input errors in the driver.
    pub fn resolve<'a>(
        chain: &dyn CoinView,
        pool: Option<&dyn CoinView>,
        points: impl IntoIterator<Item = &'a OutPoint>,
    ) -> Self {
        let mut outputs = HashMap::new();
        for point in points {
            if outputs.contains_key(point) {
                continue;
            }
            let found = pool
                .and_then(|p| p.output(point))
                .or_else(|| chain.output(point));
            match found {
                Some(out) => {
                    outputs.insert(*point, out);
                }
                None => {
                    debug!(txid = %point.txid_hex(), vout = point.vout, "prior output not found");
                }
            }
        }
        ResolvedOutputs { outputs }
    }

    /// Apply a caller override on top of the resolved layers.
    ///
    /// The override's value is always zero — the true value is unknowable
    /// from caller input alone and must not be trusted; only the script
    /// matters for signing and verification. A conflicting script for an
    /// already-known point is fatal: it would mean silently signing the
    /// wrong script.
    pub fn apply_override(&mut self, ov: &PrevOutOverride) -> Result<()> {
        if let Some(existing) = self.outputs.get(&ov.outpoint) {
            if existing.spendable && existing.script_pubkey != ov.script_pubkey {
                return Err(CoreError::PrevOutScriptMismatch {
                    outpoint: ov.outpoint,
                });
            }
        }
        self.outputs.insert(
            ov.outpoint,
            PriorOutput {
                script_pubkey: ov.script_pubkey.clone(),
                value: 0,
                spendable: true,
            },
        );
        Ok(())
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&PriorOutput> {
        self.outputs.get(outpoint)
    }

    /// `Some` only when the point resolved and is still spendable.
    pub fn spendable(&self, outpoint: &OutPoint) -> Option<&PriorOutput> {
        self.outputs.get(outpoint).filter(|out| out.spendable)
    }
}
