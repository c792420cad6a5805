#![no_main]

use libfuzzer_sys::fuzz_target;
use strata_world::RegionFile;

fuzz_target!(|data: &[u8]| {
    let Ok(mut region) = RegionFile::from_bytes(data) else {
        return;
    };
    let chunks = region.chunks().collect::<Vec<_>>();
    for (x, z) in chunks {
        if let Ok(chunk) = region.get_chunk(x, z) {
            for block in chunk.stream_chunk(-4).take(1 << 16) {
                let _ = block;
            }
        }
    }
});
