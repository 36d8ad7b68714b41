//! Script execution and unlocking-script verification.
//!
//! Standard (non-consensus-relaxed) rules are always on: push-only
//! unlocking scripts, strict signature and pubkey encodings, NULLDUMMY,
//! pay-to-script-hash evaluation, and a clean final stack. A signer must
//! never hand back a script that only passes under consensus leniency it
//! cannot guarantee, so there is no flag to loosen any of this.

use bitcoin_hashes::{hash160, Hash};
use secp256k1::{ecdsa, Message, PublicKey, Secp256k1};
use thiserror::Error;

use crate::record::Signable;
use crate::script::{is_pubkey_shape, opcodes::*, Instruction, Script, MAX_SCRIPT_ELEMENT_SIZE};
use crate::sighash::{signature_hash, SigHashMode};

const MAX_SCRIPT_SIZE: usize = 10_000;
const MAX_OPS_PER_SCRIPT: usize = 201;
const MAX_STACK_SIZE: usize = 1_000;
const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Reasons a script fails verification. Display strings are the ones the
/// original surface reports per input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Script evaluated without error but finished with a false/empty top stack element")]
    EvalFalse,
    #[error("OP_RETURN was encountered")]
    OpReturn,
    #[error("Script is too big")]
    ScriptSize,
    #[error("Push value size limit exceeded")]
    PushSize,
    #[error("Operation limit exceeded")]
    OpCount,
    #[error("Stack size limit exceeded")]
    StackSize,
    #[error("Signature count negative or greater than pubkey count")]
    SigCount,
    #[error("Pubkey count negative or limit exceeded")]
    PubKeyCount,
    #[error("Script failed an OP_VERIFY operation")]
    Verify,
    #[error("Script failed an OP_EQUALVERIFY operation")]
    EqualVerify,
    #[error("Script failed an OP_CHECKSIGVERIFY operation")]
    CheckSigVerify,
    #[error("Script failed an OP_CHECKMULTISIGVERIFY operation")]
    CheckMultiSigVerify,
    #[error("Opcode missing or not understood")]
    BadOpcode,
    #[error("Operation not valid with the current stack size")]
    InvalidStackOperation,
    #[error("Non-canonical DER signature")]
    SigDer,
    #[error("Non-canonical signature: S value is high")]
    SigHighS,
    #[error("Signature hash type missing or not understood")]
    SigHashType,
    #[error("Dummy CHECKMULTISIG argument must be zero")]
    SigNullDummy,
    #[error("Only non-push operators allowed in signatures")]
    SigPushOnly,
    #[error("Public key is neither compressed or uncompressed")]
    PubKeyType,
    #[error("Extra items left on stack after execution")]
    CleanStack,
    #[error("Script number overflow")]
    NumOverflow,
    #[error("Invalid OP_CHECKBLOCKATHEIGHT parameters")]
    CheckBlockAtHeight,
}

/// Crypto seam: verifies a signature over the record's signing context.
pub trait SignatureChecker {
    /// `sig_with_type` is DER plus the trailing sighash byte; encoding
    /// strictness is enforced by the interpreter before this is called.
    fn check_sig(&self, sig_with_type: &[u8], pubkey: &[u8], script_code: &Script) -> bool;
}

/// Checks signatures against one input of a [`Signable`].
pub struct SignableChecker<'a> {
    signable: &'a Signable,
    index: usize,
}

impl<'a> SignableChecker<'a> {
    pub fn new(signable: &'a Signable, index: usize) -> Self {
        SignableChecker { signable, index }
    }
}

impl SignatureChecker for SignableChecker<'_> {
    fn check_sig(&self, sig_with_type: &[u8], pubkey: &[u8], script_code: &Script) -> bool {
        let Some((&type_byte, der)) = sig_with_type.split_last() else {
            return false;
        };
        let Some(mode) = SigHashMode::from_byte(type_byte) else {
            return false;
        };
        let Ok(digest) = signature_hash(self.signable, self.index, script_code, mode) else {
            return false;
        };
        let Ok(mut sig) = ecdsa::Signature::from_der(der) else {
            return false;
        };
        sig.normalize_s();
        let Ok(pk) = PublicKey::from_slice(pubkey) else {
            return false;
        };
        let secp = Secp256k1::verification_only();
        secp.verify_ecdsa(&Message::from_digest(digest), &sig, &pk)
            .is_ok()
    }
}

/// Verify an unlocking script against its locking script.
pub fn verify_script(
    script_sig: &Script,
    script_pubkey: &Script,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if !script_sig.is_push_only() {
        return Err(ScriptError::SigPushOnly);
    }

    let mut stack: Vec<Vec<u8>> = Vec::new();
    eval_script(script_sig, &mut stack, checker)?;
    let stack_copy = stack.clone();

    eval_script(script_pubkey, &mut stack, checker)?;
    if !stack.last().is_some_and(|top| cast_to_bool(top)) {
        return Err(ScriptError::EvalFalse);
    }

    if script_pubkey.is_pay_to_script_hash() {
        // scriptSig is push-only, so the top of the pre-pubkey stack is the
        // serialized redeem script.
        stack = stack_copy;
        let Some(redeem_bytes) = stack.pop() else {
            return Err(ScriptError::InvalidStackOperation);
        };
        let redeem = Script::from_bytes(redeem_bytes);
        eval_script(&redeem, &mut stack, checker)?;
        if !stack.last().is_some_and(|top| cast_to_bool(top)) {
            return Err(ScriptError::EvalFalse);
        }
    }

    if stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }
    Ok(())
}

fn eval_script(
    script: &Script,
    stack: &mut Vec<Vec<u8>>,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }
    let mut op_count = 0usize;

    for ins in script.instructions() {
        let ins = ins.ok_or(ScriptError::BadOpcode)?;
        if stack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
        match ins {
            Instruction::Push(data) => {
                if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(ScriptError::PushSize);
                }
                stack.push(data.to_vec());
            }
            Instruction::Op(op) => {
                op_count += 1;
                if op_count > MAX_OPS_PER_SCRIPT {
                    return Err(ScriptError::OpCount);
                }
                exec_op(op, script, stack, checker)?;
            }
        }
    }
    if stack.len() > MAX_STACK_SIZE {
        return Err(ScriptError::StackSize);
    }
    Ok(())
}

fn exec_op(
    op: u8,
    script: &Script,
    stack: &mut Vec<Vec<u8>>,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    match op {
        OP_1NEGATE => stack.push(vec![0x81]),
        OP_1..=OP_16 => stack.push(vec![op - OP_1 + 1]),
        OP_NOP => {}
        OP_RETURN => return Err(ScriptError::OpReturn),
        OP_VERIFY => {
            let top = pop(stack)?;
            if !cast_to_bool(&top) {
                return Err(ScriptError::Verify);
            }
        }
        OP_DUP => {
            let top = stack.last().ok_or(ScriptError::InvalidStackOperation)?;
            stack.push(top.clone());
        }
        OP_HASH160 => {
            let top = pop(stack)?;
            stack.push(hash160::Hash::hash(&top).to_byte_array().to_vec());
        }
        OP_EQUAL | OP_EQUALVERIFY => {
            let b = pop(stack)?;
            let a = pop(stack)?;
            let equal = a == b;
            if op == OP_EQUALVERIFY {
                if !equal {
                    return Err(ScriptError::EqualVerify);
                }
            } else {
                stack.push(bool_item(equal));
            }
        }
        OP_CHECKSIG | OP_CHECKSIGVERIFY => {
            let pubkey = pop(stack)?;
            let sig = pop(stack)?;
            check_signature_encoding(&sig)?;
            check_pubkey_encoding(&pubkey)?;
            let ok = !sig.is_empty() && checker.check_sig(&sig, &pubkey, script);
            if op == OP_CHECKSIGVERIFY {
                if !ok {
                    return Err(ScriptError::CheckSigVerify);
                }
            } else {
                stack.push(bool_item(ok));
            }
        }
        OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
            let ok = exec_checkmultisig(script, stack, checker)?;
            if op == OP_CHECKMULTISIGVERIFY {
                if !ok {
                    return Err(ScriptError::CheckMultiSigVerify);
                }
            } else {
                stack.push(bool_item(ok));
            }
        }
        OP_CHECKBLOCKATHEIGHT => {
            // Non-contextual verification: format-check the two parameters,
            // the actual chain lookup happens elsewhere.
            let height = pop(stack)?;
            let block_hash = pop(stack)?;
            if block_hash.len() != 32 || height.len() > 5 {
                return Err(ScriptError::CheckBlockAtHeight);
            }
        }
        _ => return Err(ScriptError::BadOpcode),
    }
    Ok(())
}

fn exec_checkmultisig(
    script: &Script,
    stack: &mut Vec<Vec<u8>>,
    checker: &dyn SignatureChecker,
) -> Result<bool, ScriptError> {
    let key_count = script_num(&pop(stack)?)?;
    if key_count < 0 || key_count as usize > MAX_PUBKEYS_PER_MULTISIG {
        return Err(ScriptError::PubKeyCount);
    }
    let key_count = key_count as usize;
    let mut pubkeys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        pubkeys.push(pop(stack)?);
    }
    pubkeys.reverse();

    let sig_count = script_num(&pop(stack)?)?;
    if sig_count < 0 || sig_count as usize > key_count {
        return Err(ScriptError::SigCount);
    }
    let sig_count = sig_count as usize;
    let mut sigs = Vec::with_capacity(sig_count);
    for _ in 0..sig_count {
        sigs.push(pop(stack)?);
    }
    sigs.reverse();

    // Off-by-one bug in the original design; the extra element must be the
    // empty push (NULLDUMMY).
    let dummy = pop(stack)?;
    if !dummy.is_empty() {
        return Err(ScriptError::SigNullDummy);
    }

    let mut ikey = 0usize;
    let mut isig = 0usize;
    let mut success = true;
    while success && isig < sigs.len() {
        if sigs.len() - isig > pubkeys.len() - ikey {
            success = false;
            break;
        }
        let sig = &sigs[isig];
        let pubkey = &pubkeys[ikey];
        check_signature_encoding(sig)?;
        check_pubkey_encoding(pubkey)?;
        if !sig.is_empty() && checker.check_sig(sig, pubkey, script) {
            isig += 1;
        }
        ikey += 1;
    }
    Ok(success)
}

fn pop(stack: &mut Vec<Vec<u8>>) -> Result<Vec<u8>, ScriptError> {
    stack.pop().ok_or(ScriptError::InvalidStackOperation)
}

fn bool_item(b: bool) -> Vec<u8> {
    if b {
        vec![1]
    } else {
        Vec::new()
    }
}

fn cast_to_bool(item: &[u8]) -> bool {
    for (i, &b) in item.iter().enumerate() {
        if b != 0 {
            // negative zero counts as false
            return !(i == item.len() - 1 && b == 0x80);
        }
    }
    false
}

/// Little-endian signed script number, at most 4 bytes.
fn script_num(item: &[u8]) -> Result<i64, ScriptError> {
    if item.len() > 4 {
        return Err(ScriptError::NumOverflow);
    }
    if item.is_empty() {
        return Ok(0);
    }
    let mut value = 0i64;
    for (i, &b) in item.iter().enumerate() {
        value |= i64::from(b) << (8 * i);
    }
    let last = item[item.len() - 1];
    if last & 0x80 != 0 {
        value &= !(0x80i64 << (8 * (item.len() - 1)));
        value = -value;
    }
    Ok(value)
}

/// Strict DER + known hash type + low-S. Empty signatures pass (they
/// evaluate to a failed check, not a malformed script).
fn check_signature_encoding(sig: &[u8]) -> Result<(), ScriptError> {
    let Some((&type_byte, der)) = sig.split_last() else {
        return Ok(());
    };
    let parsed = ecdsa::Signature::from_der(der).map_err(|_| ScriptError::SigDer)?;
    let mut normalized = parsed;
    normalized.normalize_s();
    if normalized.serialize_der().as_ref() != parsed.serialize_der().as_ref() {
        return Err(ScriptError::SigHighS);
    }
    if SigHashMode::from_byte(type_byte).is_none() {
        return Err(ScriptError::SigHashType);
    }
    Ok(())
}

fn check_pubkey_encoding(pubkey: &[u8]) -> Result<(), ScriptError> {
    if is_pubkey_shape(pubkey) {
        Ok(())
    } else {
        Err(ScriptError::PubKeyType)
    }
}
