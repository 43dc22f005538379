#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // LCOV parser must not panic on any input, and the totals must agree
    // with the per-file records.
    let text = String::from_utf8_lossy(data);
    let model = covdelta::parsers::lcov::parse(&text);
    let total = model.stats();
    assert!(total.lines_hit <= total.lines_found);
    assert!(total.branches_hit <= total.branches_found);
    assert!(total.functions_hit <= total.functions_found);
});
