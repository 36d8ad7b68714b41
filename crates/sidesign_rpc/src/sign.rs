//! The two signing calls and their request/response shapes.

use serde::{Deserialize, Serialize};
use tracing::info;

use sidesign_core::encoding::Reader;
use sidesign_core::keystore::{BasicKeyStore, KeyStore};
use sidesign_core::record::{Certificate, OutPoint, Signable, Transaction};
use sidesign_core::resolver::{CoinView, PrevOutOverride, ResolvedOutputs};
use sidesign_core::script::Script;
use sidesign_core::sighash::SigHashMode;
use sidesign_core::{reconcile, ReconciliationResult};
use sidesign_wallet::Wallet;

use crate::{Result, RpcError};

/// Caller-supplied prior output, keyed by the display-order txid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrevOutParam {
    pub txid: String,
    pub vout: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    #[serde(rename = "redeemScript", skip_serializing_if = "Option::is_none")]
    pub redeem_script: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignRawTransactionRequest {
    /// One or more serialized transactions, concatenated. The first is the
    /// merge base; the rest contribute signatures only.
    pub hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevtxs: Option<Vec<PrevOutParam>>,
    /// WIF keys; when present they are the only keys used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privkeys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sighashtype: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignRawCertificateRequest {
    /// Exactly one serialized certificate.
    pub hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privkeys: Option<Vec<String>>,
}

/// One failed input, in the shape callers already parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureError {
    pub txid: String,
    pub vout: u32,
    #[serde(rename = "scriptSig")]
    pub script_sig: String,
    pub sequence: u32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    pub hex: String,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SignatureError>,
}

/// Signing entry point bound to the node's output views and wallet.
pub struct SigningService<'a> {
    chain: &'a dyn CoinView,
    pool: Option<&'a dyn CoinView>,
    wallet: Option<&'a Wallet>,
}

impl<'a> SigningService<'a> {
    pub fn new(
        chain: &'a dyn CoinView,
        pool: Option<&'a dyn CoinView>,
        wallet: Option<&'a Wallet>,
    ) -> Self {
        SigningService {
            chain,
            pool,
            wallet,
        }
    }

    /// Sign a raw transaction, merging signatures across all decoded
    /// variants of it.
    pub fn sign_raw_transaction(
        &self,
        req: &SignRawTransactionRequest,
    ) -> Result<SignResponse> {
        let data = hex::decode(&req.hex).map_err(|_| RpcError::TxDecodeFailed)?;
        let mut reader = Reader::new(&data);
        let mut variants: Vec<Signable> = Vec::new();
        while !reader.is_empty() {
            let tx = Transaction::decode(&mut reader).map_err(|_| RpcError::TxDecodeFailed)?;
            variants.push(tx.into());
        }
        if variants.is_empty() {
            return Err(RpcError::MissingTransaction);
        }

        let given_keys = req.privkeys.is_some();
        let mut temp_store = BasicKeyStore::new();
        if let Some(wifs) = &req.privkeys {
            temp_store = BasicKeyStore::from_wifs(wifs)?;
        } else if let Some(wallet) = self.wallet {
            wallet.ensure_unlocked()?;
        }

        let merged = variants[0].clone();
        let points: Vec<OutPoint> = merged.inputs().iter().map(|i| i.prevout).collect();
        let mut resolved = ResolvedOutputs::resolve(self.chain, self.pool, points.iter());

        if let Some(prevtxs) = &req.prevtxs {
            for param in prevtxs {
                let ov = parse_prevout(param)?;
                resolved.apply_override(&ov)?;
                // Caller-supplied redeem scripts only count in explicit-key
                // mode; the wallet already knows its own.
                if given_keys && ov.script_pubkey.is_pay_to_script_hash() {
                    if let Some(redeem) = ov.redeem_script {
                        temp_store.add_redeem_script(redeem);
                    }
                }
            }
        }

        let mode = match &req.sighashtype {
            Some(token) => SigHashMode::parse(token)?,
            None => SigHashMode::ALL,
        };

        let keystore: &dyn KeyStore = match self.wallet {
            Some(wallet) if !given_keys => wallet,
            _ => &temp_store,
        };

        let outcome = reconcile(merged, &variants[1..], &resolved, keystore, mode);
        info!(complete = outcome.complete, "signrawtransaction");
        Ok(respond(outcome))
    }

    /// Sign a raw certificate. ALL only, no prior-output overrides, exactly
    /// one serialized certificate in the hex.
    pub fn sign_raw_certificate(
        &self,
        req: &SignRawCertificateRequest,
    ) -> Result<SignResponse> {
        let data = hex::decode(&req.hex).map_err(|_| RpcError::CertDecodeFailed)?;
        if data.is_empty() {
            return Err(RpcError::MissingInputCertificate);
        }
        let mut reader = Reader::new(&data);
        let cert =
            Certificate::decode(&mut reader).map_err(|_| RpcError::CertDecodeFailed)?;
        if !reader.is_empty() {
            return Err(RpcError::ExtraCertBytes(reader.remaining()));
        }

        let given_keys = req.privkeys.is_some();
        let mut temp_store = BasicKeyStore::new();
        if let Some(wifs) = &req.privkeys {
            temp_store = BasicKeyStore::from_wifs(wifs)?;
        }
        if let Some(wallet) = self.wallet {
            wallet.ensure_unlocked()?;
        }

        let signable: Signable = cert.into();
        let points: Vec<OutPoint> = signable.inputs().iter().map(|i| i.prevout).collect();
        let resolved = ResolvedOutputs::resolve(self.chain, self.pool, points.iter());

        let keystore: &dyn KeyStore = match self.wallet {
            Some(wallet) if !given_keys => wallet,
            _ => &temp_store,
        };

        let outcome = reconcile(signable, &[], &resolved, keystore, SigHashMode::ALL);
        info!(complete = outcome.complete, "signrawcertificate");
        Ok(respond(outcome))
    }
}

fn respond(outcome: ReconciliationResult) -> SignResponse {
    SignResponse {
        hex: hex::encode(outcome.signable.encode()),
        complete: outcome.complete,
        errors: outcome
            .errors
            .into_iter()
            .map(|e| SignatureError {
                txid: e.outpoint.txid_hex(),
                vout: e.outpoint.vout,
                script_sig: hex::encode(e.script_sig.as_bytes()),
                sequence: e.sequence,
                error: e.reason,
            })
            .collect(),
    }
}

fn parse_prevout(param: &PrevOutParam) -> Result<PrevOutOverride> {
    let txid = parse_txid(&param.txid)?;
    let script = hex::decode(&param.script_pub_key)
        .map_err(|_| RpcError::InvalidParameter("scriptPubKey must be hexadecimal".into()))?;
    let redeem = param
        .redeem_script
        .as_ref()
        .map(|s| {
            hex::decode(s)
                .map(Script::from_bytes)
                .map_err(|_| RpcError::InvalidParameter("redeemScript must be hexadecimal".into()))
        })
        .transpose()?;
    Ok(PrevOutOverride {
        outpoint: OutPoint::new(txid, param.vout),
        script_pubkey: Script::from_bytes(script),
        redeem_script: redeem,
    })
}

/// Display-order txid strings are byte-reversed relative to the wire.
fn parse_txid(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s)
        .map_err(|_| RpcError::InvalidParameter("txid must be hexadecimal".into()))?;
    let mut txid: [u8; 32] = bytes
        .try_into()
        .map_err(|_| RpcError::InvalidParameter("txid must be of length 64".into()))?;
    txid.reverse();
    Ok(txid)
}
