#![no_main]
use libfuzzer_sys::fuzz_target;

use sidesign_core::encoding::Reader;
use sidesign_core::record::{Certificate, Transaction};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic, and anything that decodes
    // must re-encode byte-identically over the consumed prefix.
    let mut reader = Reader::new(data);
    if let Ok(tx) = Transaction::decode(&mut reader) {
        let consumed = data.len() - reader.remaining();
        assert_eq!(tx.encode(), &data[..consumed]);
    }

    let mut reader = Reader::new(data);
    if let Ok(cert) = Certificate::decode(&mut reader) {
        let consumed = data.len() - reader.remaining();
        assert_eq!(cert.encode(), &data[..consumed]);
    }
});
