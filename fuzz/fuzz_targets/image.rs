#![no_main]

use dotstub::{AssemblyReader, AssemblyWriter, NullResolver, PeImage, Stripper};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut assembly) = PeImage.read(data) {
        if Stripper::default().strip(&mut assembly, &NullResolver).is_ok() {
            let _ = PeImage.write(&assembly);
        }
    }
});
