//! The two signable record kinds and their shared shape.
//!
//! A [`Signable`] is either an ordinary transaction or a sidechain
//! withdrawal certificate. Both carry the same input/output structure; the
//! certificate adds the sidechain fields and its backward-transfer outputs,
//! which are recognized by script shape (no replay-protection suffix) rather
//! than a dedicated flag.

use bitcoin_hashes::{sha256d, Hash};
use serde::{Deserialize, Serialize};

use crate::encoding::{write_var_bytes, Reader};
use crate::error::Result;
use crate::script::{Destination, Script};

/// Reference to the output an input consumes. Identity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// Display-order hex (byte-reversed, as the original JSON surface shows
    /// record ids).
    pub fn txid_hex(&self) -> String {
        let mut bytes = self.txid;
        bytes.reverse();
        hex::encode(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint) -> Self {
        TxIn {
            prevout,
            script_sig: Script::new(),
            sequence: u32::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Script,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

/// A sidechain withdrawal certificate.
///
/// `quality` totally orders competing certificates for the same sidechain
/// and epoch. Outputs whose locking script lacks the replay-protection
/// suffix are backward transfers: they pay out of the sidechain balance and
/// are never spendable change of this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub version: i32,
    pub sidechain_id: [u8; 32],
    pub epoch_number: u32,
    pub quality: u64,
    pub end_epoch_block_hash: [u8; 32],
    pub proof: Vec<u8>,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Certificate {
    pub fn is_backward_transfer(&self, index: usize) -> bool {
        match self.outputs.get(index) {
            Some(out) => !out.script_pubkey.has_replay_suffix()
                && matches!(out.script_pubkey.destination(), Destination::PubKeyHash(_)),
            None => false,
        }
    }
}

fn encode_inputs(buf: &mut Vec<u8>, inputs: &[TxIn]) {
    crate::encoding::write_compact_size(buf, inputs.len() as u64);
    for input in inputs {
        buf.extend_from_slice(&input.prevout.txid);
        buf.extend(input.prevout.vout.to_le_bytes());
        write_var_bytes(buf, input.script_sig.as_bytes());
        buf.extend(input.sequence.to_le_bytes());
    }
}

fn encode_outputs(buf: &mut Vec<u8>, outputs: &[TxOut]) {
    crate::encoding::write_compact_size(buf, outputs.len() as u64);
    for output in outputs {
        buf.extend(output.value.to_le_bytes());
        write_var_bytes(buf, output.script_pubkey.as_bytes());
    }
}

fn decode_inputs(r: &mut Reader<'_>) -> Result<Vec<TxIn>> {
    let count = r.read_compact_size()?;
    let mut inputs = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let txid = r.read_array_32()?;
        let vout = r.read_u32()?;
        let script_sig = Script::from_bytes(r.read_var_bytes()?);
        let sequence = r.read_u32()?;
        inputs.push(TxIn {
            prevout: OutPoint { txid, vout },
            script_sig,
            sequence,
        });
    }
    Ok(inputs)
}

fn decode_outputs(r: &mut Reader<'_>) -> Result<Vec<TxOut>> {
    let count = r.read_compact_size()?;
    let mut outputs = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let value = r.read_i64()?;
        let script_pubkey = Script::from_bytes(r.read_var_bytes()?);
        outputs.push(TxOut {
            value,
            script_pubkey,
        });
    }
    Ok(outputs)
}

impl Transaction {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(self.version.to_le_bytes());
        encode_inputs(&mut buf, &self.inputs);
        encode_outputs(&mut buf, &self.outputs);
        buf.extend(self.lock_time.to_le_bytes());
        buf
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.read_i32()?;
        let inputs = decode_inputs(r)?;
        let outputs = decode_outputs(r)?;
        let lock_time = r.read_u32()?;
        Ok(Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn txid(&self) -> [u8; 32] {
        sha256d::Hash::hash(&self.encode()).to_byte_array()
    }
}

impl Certificate {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(self.version.to_le_bytes());
        buf.extend_from_slice(&self.sidechain_id);
        buf.extend(self.epoch_number.to_le_bytes());
        buf.extend(self.quality.to_le_bytes());
        buf.extend_from_slice(&self.end_epoch_block_hash);
        write_var_bytes(&mut buf, &self.proof);
        encode_inputs(&mut buf, &self.inputs);
        encode_outputs(&mut buf, &self.outputs);
        buf
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.read_i32()?;
        let sidechain_id = r.read_array_32()?;
        let epoch_number = r.read_u32()?;
        let quality = r.read_u64()?;
        let end_epoch_block_hash = r.read_array_32()?;
        let proof = r.read_var_bytes()?;
        let inputs = decode_inputs(r)?;
        let outputs = decode_outputs(r)?;
        Ok(Certificate {
            version,
            sidechain_id,
            epoch_number,
            quality,
            end_epoch_block_hash,
            proof,
            inputs,
            outputs,
        })
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256d::Hash::hash(&self.encode()).to_byte_array()
    }
}

/// The record kind being reconciled; the driver and the sighash machinery
/// are written once against this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signable {
    Transaction(Transaction),
    Certificate(Certificate),
}

impl Signable {
    pub fn inputs(&self) -> &[TxIn] {
        match self {
            Signable::Transaction(tx) => &tx.inputs,
            Signable::Certificate(cert) => &cert.inputs,
        }
    }

    pub fn inputs_mut(&mut self) -> &mut [TxIn] {
        match self {
            Signable::Transaction(tx) => &mut tx.inputs,
            Signable::Certificate(cert) => &mut cert.inputs,
        }
    }

    pub fn outputs(&self) -> &[TxOut] {
        match self {
            Signable::Transaction(tx) => &tx.outputs,
            Signable::Certificate(cert) => &cert.outputs,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Signable::Transaction(tx) => tx.encode(),
            Signable::Certificate(cert) => cert.encode(),
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Signable::Transaction(_))
    }
}

impl From<Transaction> for Signable {
    fn from(tx: Transaction) -> Self {
        Signable::Transaction(tx)
    }
}

impl From<Certificate> for Signable {
    fn from(cert: Certificate) -> Self {
        Signable::Certificate(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{pay_to_pubkey_hash, with_replay_suffix};

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn::new(OutPoint::new([5u8; 32], 1))],
            outputs: vec![TxOut {
                value: 50_000,
                script_pubkey: pay_to_pubkey_hash(&[8u8; 20]),
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn transaction_round_trip() {
        let tx = sample_tx();
        let bytes = tx.encode();
        let mut r = Reader::new(&bytes);
        let decoded = Transaction::decode(&mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(decoded, tx);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn certificate_round_trip() {
        let cert = Certificate {
            version: -5,
            sidechain_id: [0xab; 32],
            epoch_number: 7,
            quality: 42,
            end_epoch_block_hash: [0xcd; 32],
            proof: vec![1, 2, 3, 4],
            inputs: vec![TxIn::new(OutPoint::new([5u8; 32], 0))],
            outputs: vec![TxOut {
                value: 1000,
                script_pubkey: pay_to_pubkey_hash(&[8u8; 20]),
            }],
        };
        let bytes = cert.encode();
        let mut r = Reader::new(&bytes);
        let decoded = Certificate::decode(&mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(decoded, cert);
    }

    #[test]
    fn backward_transfer_by_script_shape() {
        let plain = pay_to_pubkey_hash(&[8u8; 20]);
        let suffixed = with_replay_suffix(&plain, &[2u8; 32], 100);
        let cert = Certificate {
            version: 1,
            sidechain_id: [0; 32],
            epoch_number: 0,
            quality: 0,
            end_epoch_block_hash: [0; 32],
            proof: Vec::new(),
            inputs: Vec::new(),
            outputs: vec![
                TxOut {
                    value: 10,
                    script_pubkey: suffixed,
                },
                TxOut {
                    value: 20,
                    script_pubkey: plain,
                },
            ],
        };
        assert!(!cert.is_backward_transfer(0));
        assert!(cert.is_backward_transfer(1));
        assert!(!cert.is_backward_transfer(2));
    }

    #[test]
    fn txid_reversed_for_display() {
        let mut txid = [0u8; 32];
        txid[0] = 0xaa;
        let point = OutPoint::new(txid, 0);
        assert!(point.txid_hex().ends_with("aa"));
    }

    #[test]
    fn truncated_transaction_rejected() {
        let tx = sample_tx();
        let bytes = tx.encode();
        let mut r = Reader::new(&bytes[..bytes.len() - 2]);
        assert!(Transaction::decode(&mut r).is_err());
    }
}
