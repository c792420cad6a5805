#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whatever decodes has to encode, and decoding that encoding gives the same bytes again
    if let Ok(nbt) = strata_nbt::from_bytes(data) {
        let bytes = strata_nbt::to_bytes(&nbt).expect("decoded tree must encode");
        let again = strata_nbt::from_bytes(&bytes).expect("encoded tree must decode");
        assert_eq!(bytes, strata_nbt::to_bytes(&again).expect("decoded tree must encode"));
    }
});
