#![no_main]

use blb_core::{decode, encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode or fail cleanly, never panic.
    let Ok(decoded) = decode(data) else {
        return;
    };

    // Anything that decoded must survive a re-encode with its own header.
    let bytes = encode(&decoded.header, &decoded.data).expect("re-encode decoded file");
    let again = decode(&bytes).expect("decode re-encoded file");
    assert_eq!(again.data, decoded.data, "body changed across re-encode");
    assert_eq!(again.header, decoded.header, "header changed across re-encode");

    // Reconstruction of every stored version is total.
    for version in decoded.data.versions() {
        let _ = decoded.data.reconstruct(Some(version));
    }
});
