#![allow(dead_code)]

use std::path::PathBuf;

use covdelta::model::CoverageModel;
use covdelta::parsers::lcov::LcovParser;
use covdelta::parsers::RootPrefix;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Read a fixture from `tests/fixtures`.
pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

/// Parse a fixture with the leading `/` stripped from every path, so
/// `/src/lib.rs` becomes `src/lib.rs`.
pub fn parse_fixture(name: &str) -> CoverageModel {
    LcovParser::new()
        .with_root_prefix(RootPrefix::new("/"))
        .parse(&fixture(name))
}
