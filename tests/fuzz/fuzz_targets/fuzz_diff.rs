#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Changed-file parsing must not panic on any input.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = covdelta::changes::parse_changed_files(s);
    }
});
