//! Script type, opcode surface, and destination-pattern classification.
//!
//! Only the opcodes the signing pipeline can actually satisfy are modeled.
//! Anything else classifies as [`Destination::NonStandard`] and still flows
//! through the combine/verify pipeline (it just can never be signed here).

use serde::{Deserialize, Serialize};

pub mod opcodes {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_NOP: u8 = 0x61;
    pub const OP_VERIFY: u8 = 0x69;
    pub const OP_RETURN: u8 = 0x6a;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKSIGVERIFY: u8 = 0xad;
    pub const OP_CHECKMULTISIG: u8 = 0xae;
    pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
    /// Replay-protection opcode: `<block hash> <height> OP_CHECKBLOCKATHEIGHT`.
    pub const OP_CHECKBLOCKATHEIGHT: u8 = 0xb4;
}

use opcodes::*;

/// Maximum size of a single pushed element.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// A raw script, lock or unlock side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script(Vec<u8>);

/// One decoded script instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    /// A data push, including `OP_0` (which pushes the empty element).
    Push(&'a [u8]),
    /// Any non-push opcode, including `OP_1`..`OP_16` and `OP_1NEGATE`.
    Op(u8),
}

/// Recognized locking-script shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `<pubkey> OP_CHECKSIG`
    PubKey(Vec<u8>),
    /// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
    PubKeyHash([u8; 20]),
    /// `OP_HASH160 <20> OP_EQUAL` (exact, no replay suffix)
    ScriptHash([u8; 20]),
    /// `OP_m <pubkeys…> OP_n OP_CHECKMULTISIG`
    Multisig { required: usize, pubkeys: Vec<Vec<u8>> },
    NonStandard,
}

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions { bytes: &self.0 }
    }

    /// Decode every instruction, failing on truncated pushes.
    pub fn parse(&self) -> Option<Vec<Instruction<'_>>> {
        self.instructions().collect::<Option<Vec<_>>>()
    }

    /// True when every instruction is a push (`OP_0`..`OP_16`, `OP_1NEGATE`,
    /// direct pushes, PUSHDATA).
    pub fn is_push_only(&self) -> bool {
        let mut bytes = &self.0[..];
        while let Some((&op, rest)) = bytes.split_first() {
            if op > OP_16 {
                return false;
            }
            if op == OP_0 || op >= OP_1NEGATE {
                // no payload: OP_0, OP_1NEGATE, OP_RESERVED, OP_1..OP_16
                bytes = rest;
                continue;
            }
            match read_push(op, rest) {
                Some((_, remaining)) => bytes = remaining,
                None => return false, // truncated push
            }
        }
        true
    }

    /// Exact BIP16-style pay-to-script-hash template match on raw bytes.
    pub fn is_pay_to_script_hash(&self) -> bool {
        self.0.len() == 23 && self.0[0] == OP_HASH160 && self.0[1] == 0x14 && self.0[22] == OP_EQUAL
    }

    /// The data of the final push in the script, if the script is push-only.
    ///
    /// For a script-hash unlocking script this is the serialized redeem
    /// script.
    pub fn last_push(&self) -> Option<Vec<u8>> {
        if !self.is_push_only() {
            return None;
        }
        let mut last = None;
        for ins in self.instructions() {
            match ins? {
                Instruction::Push(data) => last = Some(data.to_vec()),
                Instruction::Op(op) => last = Some(small_int_push(op)?),
            }
        }
        last
    }

    /// Classify the locking-script destination, tolerating a trailing
    /// replay-protection suffix on non-script-hash shapes.
    pub fn destination(&self) -> Destination {
        if self.is_pay_to_script_hash() {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&self.0[2..22]);
            return Destination::ScriptHash(hash);
        }
        let Some(full) = self.parse() else {
            return Destination::NonStandard;
        };
        let ins = strip_replay_suffix(&full);
        classify(ins)
    }

    /// Whether this script carries the `OP_CHECKBLOCKATHEIGHT` replay suffix.
    ///
    /// Certificate outputs without it are backward transfers.
    pub fn has_replay_suffix(&self) -> bool {
        match self.parse() {
            Some(ins) => strip_replay_suffix(&ins).len() != ins.len(),
            None => false,
        }
    }
}

fn classify(ins: &[Instruction<'_>]) -> Destination {
    use Instruction::*;
    match ins {
        [Push(pk), Op(OP_CHECKSIG)] if is_pubkey_shape(pk) => Destination::PubKey(pk.to_vec()),
        [Op(OP_DUP), Op(OP_HASH160), Push(h), Op(OP_EQUALVERIFY), Op(OP_CHECKSIG)]
            if h.len() == 20 =>
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(h);
            Destination::PubKeyHash(hash)
        }
        [Op(m_op), middle @ .., Op(n_op), Op(OP_CHECKMULTISIG)] if !middle.is_empty() => {
            let (Some(m), Some(n)) = (small_int(*m_op), small_int(*n_op)) else {
                return Destination::NonStandard;
            };
            let mut pubkeys = Vec::with_capacity(middle.len());
            for i in middle {
                match i {
                    Push(pk) if is_pubkey_shape(pk) => pubkeys.push(pk.to_vec()),
                    _ => return Destination::NonStandard,
                }
            }
            if m >= 1 && m <= n && n == pubkeys.len() {
                Destination::Multisig { required: m, pubkeys }
            } else {
                Destination::NonStandard
            }
        }
        _ => Destination::NonStandard,
    }
}

/// `<32-byte hash> <height> OP_CHECKBLOCKATHEIGHT` at the end of a script.
fn strip_replay_suffix<'a, 'b>(ins: &'b [Instruction<'a>]) -> &'b [Instruction<'a>] {
    if let [head @ .., Instruction::Push(hash), height, Instruction::Op(OP_CHECKBLOCKATHEIGHT)] =
        ins
    {
        let height_ok = match height {
            Instruction::Push(h) => h.len() <= 5,
            Instruction::Op(op) => small_int(*op).is_some(),
        };
        if hash.len() == 32 && height_ok {
            return head;
        }
    }
    ins
}

pub(crate) fn is_pubkey_shape(data: &[u8]) -> bool {
    matches!(
        (data.len(), data.first()),
        (33, Some(0x02 | 0x03)) | (65, Some(0x04))
    )
}

/// Decode `OP_1`..`OP_16` as a count.
pub fn small_int(op: u8) -> Option<usize> {
    if (OP_1..=OP_16).contains(&op) {
        Some((op - OP_1 + 1) as usize)
    } else {
        None
    }
}

fn small_int_push(op: u8) -> Option<Vec<u8>> {
    match op {
        OP_1NEGATE => Some(vec![0x81]),
        _ => small_int(op).map(|n| vec![n as u8]),
    }
}

fn read_push<'a>(op: u8, rest: &'a [u8]) -> Option<(&'a [u8], &'a [u8])> {
    let (len, rest) = match op {
        0x01..=0x4b => (op as usize, rest),
        OP_PUSHDATA1 => {
            let (&l, r) = rest.split_first()?;
            (l as usize, r)
        }
        OP_PUSHDATA2 => {
            if rest.len() < 2 {
                return None;
            }
            (u16::from_le_bytes([rest[0], rest[1]]) as usize, &rest[2..])
        }
        OP_PUSHDATA4 => {
            if rest.len() < 4 {
                return None;
            }
            let l = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            (l, &rest[4..])
        }
        _ => return None,
    };
    if rest.len() < len {
        return None;
    }
    Some((&rest[..len], &rest[len..]))
}

/// Iterator over script instructions; yields `None` mid-stream on a
/// truncated push (callers treat that as a malformed script).
pub struct Instructions<'a> {
    bytes: &'a [u8],
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Option<Instruction<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&op, rest) = self.bytes.split_first()?;
        match op {
            OP_0 => {
                self.bytes = rest;
                Some(Some(Instruction::Push(&[])))
            }
            0x01..=0x4e => match read_push(op, rest) {
                Some((data, remaining)) => {
                    self.bytes = remaining;
                    Some(Some(Instruction::Push(data)))
                }
                None => {
                    self.bytes = &[];
                    Some(None)
                }
            },
            _ => {
                self.bytes = rest;
                Some(Some(Instruction::Op(op)))
            }
        }
    }
}

/// Incremental script assembly with minimal push encodings.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        ScriptBuilder::default()
    }

    pub fn push_opcode(mut self, op: u8) -> Self {
        self.bytes.push(op);
        self
    }

    pub fn push_slice(mut self, data: &[u8]) -> Self {
        match data.len() {
            0 => self.bytes.push(OP_0),
            l @ 1..=0x4b => {
                self.bytes.push(l as u8);
                self.bytes.extend_from_slice(data);
            }
            l @ 0x4c..=0xff => {
                self.bytes.push(OP_PUSHDATA1);
                self.bytes.push(l as u8);
                self.bytes.extend_from_slice(data);
            }
            l @ 0x100..=0xffff => {
                self.bytes.push(OP_PUSHDATA2);
                self.bytes.extend((l as u16).to_le_bytes());
                self.bytes.extend_from_slice(data);
            }
            l => {
                self.bytes.push(OP_PUSHDATA4);
                self.bytes.extend((l as u32).to_le_bytes());
                self.bytes.extend_from_slice(data);
            }
        }
        self
    }

    /// Push 0..=16 as `OP_0`/`OP_1`..`OP_16`.
    pub fn push_small_int(mut self, n: usize) -> Self {
        debug_assert!(n <= 16);
        if n == 0 {
            self.bytes.push(OP_0);
        } else {
            self.bytes.push(OP_1 + (n as u8) - 1);
        }
        self
    }

    pub fn into_script(self) -> Script {
        Script(self.bytes)
    }
}

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn pay_to_pubkey_hash(hash: &[u8; 20]) -> Script {
    ScriptBuilder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// `OP_HASH160 <hash> OP_EQUAL`
pub fn pay_to_script_hash(hash: &[u8; 20]) -> Script {
    ScriptBuilder::new()
        .push_opcode(OP_HASH160)
        .push_slice(hash)
        .push_opcode(OP_EQUAL)
        .into_script()
}

/// `OP_m <pubkeys…> OP_n OP_CHECKMULTISIG`
pub fn multisig(required: usize, pubkeys: &[Vec<u8>]) -> Script {
    let mut b = ScriptBuilder::new().push_small_int(required);
    for pk in pubkeys {
        b = b.push_slice(pk);
    }
    b.push_small_int(pubkeys.len())
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// Append the replay-protection suffix to a locking script.
pub fn with_replay_suffix(script: &Script, block_hash: &[u8; 32], height: u32) -> Script {
    let mut height_bytes = Vec::new();
    let mut h = height;
    while h > 0 {
        height_bytes.push((h & 0xff) as u8);
        h >>= 8;
    }
    if let Some(&last) = height_bytes.last() {
        if last & 0x80 != 0 {
            height_bytes.push(0);
        }
    }
    let mut b = ScriptBuilder {
        bytes: script.as_bytes().to_vec(),
    };
    b = b.push_slice(block_hash).push_slice(&height_bytes);
    b.push_opcode(OP_CHECKBLOCKATHEIGHT).into_script()
}
