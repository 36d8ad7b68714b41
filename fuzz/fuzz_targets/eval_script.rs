#![no_main]
use libfuzzer_sys::fuzz_target;

use sidesign_core::interpreter::{verify_script, SignatureChecker};
use sidesign_core::script::Script;

struct RejectAll;

impl SignatureChecker for RejectAll {
    fn check_sig(&self, _sig: &[u8], _pubkey: &[u8], _script_code: &Script) -> bool {
        false
    }
}

fuzz_target!(|data: &[u8]| {
    // Split the input into an unlocking/locking script pair; execution must
    // terminate without panicking whatever the bytes are.
    let split = data.first().copied().unwrap_or(0) as usize;
    let rest = &data[data.len().min(1)..];
    let at = split.min(rest.len());
    let script_sig = Script::from_bytes(rest[..at].to_vec());
    let script_pubkey = Script::from_bytes(rest[at..].to_vec());
    let _ = verify_script(&script_sig, &script_pubkey, &RejectAll);
});
