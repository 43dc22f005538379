#![no_main]
use libfuzzer_sys::fuzz_target;

use covdelta::config::{CommitRefs, RepoIdentity, ReportConfig};
use covdelta::pipeline::{generate, ReportInputs};

fuzz_target!(|data: &[u8]| {
    // Split the input into current and baseline LCOV text; the posted
    // report must always fit the budget.
    let text = String::from_utf8_lossy(data);
    let (current, baseline) = text.split_once("\n===\n").unwrap_or((&text, ""));
    let config = ReportConfig {
        max_chars: 2_000,
        repository: Some(RepoIdentity::github("acme/app")),
        refs: CommitRefs {
            commit: Some("0123456789abcdef".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    let inputs = ReportInputs {
        current,
        baseline: Some(baseline),
        changed_files: None,
    };
    if let Ok(report) = generate(&config, &inputs) {
        assert!(report.posted.text.chars().count() <= config.max_chars);
    }
});
