//! Signature-hash computation shared by both record kinds.
//!
//! Legacy-style digest: the record is re-serialized with the signed input's
//! script slot holding the script code, every other input's script empty,
//! and the input/output sets restricted by the sighash mode. The 4-byte
//! mode is appended before double-SHA256.

use bitcoin_hashes::{sha256d, Hash};

use crate::encoding::{write_compact_size, write_var_bytes};
use crate::error::{CoreError, Result};
use crate::record::Signable;
use crate::script::Script;

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigHashBase {
    All,
    None,
    Single,
}

/// Which parts of the record a signature commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigHashMode {
    pub base: SigHashBase,
    pub anyone_can_pay: bool,
}

impl Default for SigHashMode {
    fn default() -> Self {
        SigHashMode::ALL
    }
}

impl SigHashMode {
    pub const ALL: SigHashMode = SigHashMode {
        base: SigHashBase::All,
        anyone_can_pay: false,
    };

    /// Parse the RPC token set: ALL, NONE, SINGLE, each optionally
    /// `|ANYONECANPAY`.
    pub fn parse(token: &str) -> Result<Self> {
        let (base_str, anyone_can_pay) = match token.split_once('|') {
            Some((base, "ANYONECANPAY")) => (base, true),
            Some(_) => return Err(CoreError::InvalidSigHashParam),
            None => (token, false),
        };
        let base = match base_str {
            "ALL" => SigHashBase::All,
            "NONE" => SigHashBase::None,
            "SINGLE" => SigHashBase::Single,
            _ => return Err(CoreError::InvalidSigHashParam),
        };
        Ok(SigHashMode {
            base,
            anyone_can_pay,
        })
    }

    /// Strict decode of the trailing signature byte; unknown base values are
    /// rejected (standard verification, not consensus leniency).
    pub fn from_byte(b: u8) -> Option<Self> {
        let base = match b & !SIGHASH_ANYONECANPAY {
            SIGHASH_ALL => SigHashBase::All,
            SIGHASH_NONE => SigHashBase::None,
            SIGHASH_SINGLE => SigHashBase::Single,
            _ => return None,
        };
        Some(SigHashMode {
            base,
            anyone_can_pay: b & SIGHASH_ANYONECANPAY != 0,
        })
    }

    pub fn to_byte(self) -> u8 {
        let base = match self.base {
            SigHashBase::All => SIGHASH_ALL,
            SigHashBase::None => SIGHASH_NONE,
            SigHashBase::Single => SIGHASH_SINGLE,
        };
        if self.anyone_can_pay {
            base | SIGHASH_ANYONECANPAY
        } else {
            base
        }
    }
}

/// Digest-level failures; the verifier maps these to a failed signature
/// check rather than aborting the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashError {
    IndexOutOfRange,
    /// SIGHASH_SINGLE with no output at the input's index is undefined and
    /// never signed.
    SingleWithoutOutput,
}

/// Compute the digest a signature for `index` commits to.
pub fn signature_hash(
    signable: &Signable,
    index: usize,
    script_code: &Script,
    mode: SigHashMode,
) -> std::result::Result<[u8; 32], SighashError> {
    let inputs = signable.inputs();
    let outputs = signable.outputs();
    if index >= inputs.len() {
        return Err(SighashError::IndexOutOfRange);
    }
    if mode.base == SigHashBase::Single && index >= outputs.len() {
        return Err(SighashError::SingleWithoutOutput);
    }

    let mut buf = Vec::with_capacity(256);

    match signable {
        Signable::Transaction(tx) => {
            buf.extend(tx.version.to_le_bytes());
        }
        Signable::Certificate(cert) => {
            buf.extend(cert.version.to_le_bytes());
            buf.extend_from_slice(&cert.sidechain_id);
            buf.extend(cert.epoch_number.to_le_bytes());
            buf.extend(cert.quality.to_le_bytes());
            buf.extend_from_slice(&cert.end_epoch_block_hash);
            write_var_bytes(&mut buf, &cert.proof);
        }
    }

    // Inputs, restricted.
    if mode.anyone_can_pay {
        write_compact_size(&mut buf, 1);
        serialize_input(&mut buf, signable, index, index, script_code, mode);
    } else {
        write_compact_size(&mut buf, inputs.len() as u64);
        for i in 0..inputs.len() {
            serialize_input(&mut buf, signable, i, index, script_code, mode);
        }
    }

    // Outputs, restricted.
    match mode.base {
        SigHashBase::None => write_compact_size(&mut buf, 0),
        SigHashBase::Single => {
            write_compact_size(&mut buf, index as u64 + 1);
            for _ in 0..index {
                // Blanked output: value -1, empty script.
                buf.extend((-1i64).to_le_bytes());
                write_compact_size(&mut buf, 0);
            }
            buf.extend(outputs[index].value.to_le_bytes());
            write_var_bytes(&mut buf, outputs[index].script_pubkey.as_bytes());
        }
        SigHashBase::All => {
            write_compact_size(&mut buf, outputs.len() as u64);
            for out in outputs {
                buf.extend(out.value.to_le_bytes());
                write_var_bytes(&mut buf, out.script_pubkey.as_bytes());
            }
        }
    }

    if let Signable::Transaction(tx) = signable {
        buf.extend(tx.lock_time.to_le_bytes());
    }

    buf.extend(u32::from(mode.to_byte()).to_le_bytes());

    Ok(sha256d::Hash::hash(&buf).to_byte_array())
}

fn serialize_input(
    buf: &mut Vec<u8>,
    signable: &Signable,
    i: usize,
    signed_index: usize,
    script_code: &Script,
    mode: SigHashMode,
) {
    let input = &signable.inputs()[i];
    buf.extend_from_slice(&input.prevout.txid);
    buf.extend(input.prevout.vout.to_le_bytes());
    if i == signed_index {
        write_var_bytes(buf, script_code.as_bytes());
    } else {
        write_compact_size(buf, 0);
    }
    let sequence = if i != signed_index && mode.base != SigHashBase::All {
        0
    } else {
        input.sequence
    };
    buf.extend(sequence.to_le_bytes());
}
