//! Drives parse → aggregate → diff → render for one report and enforces
//! the posting size budget.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::config::ReportConfig;
use crate::diff::{build_diff, changed_record_paths, overall_delta, removed_paths, DiffEntry};
use crate::error::Result;
use crate::model::FileStats;
use crate::parsers::lcov::LcovParser;
use crate::report::{render, LinkMode, RenderOptions};

/// Raw inputs for one report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportInputs<'a> {
    pub current: &'a str,
    pub baseline: Option<&'a str>,
    /// Paths touched by the change, relative to the repository root.
    pub changed_files: Option<&'a BTreeSet<String>>,
}

/// A rendering that fits the character budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetedReport {
    pub text: String,
    /// Link mode the text was rendered with.
    pub link_mode: LinkMode,
    /// Whether the text was cut at the budget.
    pub truncated: bool,
}

/// Both renderings of a report plus the headline numbers.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    /// Text to post: within budget, possibly downgraded or truncated.
    pub posted: BudgetedReport,
    /// All files at the richest link mode, never truncated.
    pub full: String,
    /// Overall stats the posted header reports (changed files only when
    /// filtering).
    pub overall: FileStats,
    pub overall_delta: Option<f64>,
    /// Files present only in the baseline.
    pub removed_files: Vec<String>,
}

/// Render at `options.link_mode`, stepping down to cheaper link modes while
/// the text exceeds `max_chars`; at the cheapest mode cut the text at the
/// character boundary.
pub fn render_within_budget(
    entries: &[DiffEntry],
    overall: &FileStats,
    baseline_overall: Option<&FileStats>,
    options: &RenderOptions,
    max_chars: usize,
) -> BudgetedReport {
    let mut options = *options;
    loop {
        let text = render(entries, overall, baseline_overall, &options);
        let length = text.chars().count();
        if length <= max_chars {
            return BudgetedReport {
                text,
                link_mode: options.link_mode,
                truncated: false,
            };
        }
        match options.link_mode.cheaper() {
            Some(cheaper) => {
                debug!(
                    length,
                    max_chars,
                    from = %options.link_mode,
                    to = %cheaper,
                    "report over budget, downgrading links"
                );
                options.link_mode = cheaper;
            }
            None => {
                warn!(length, max_chars, "report over budget at cheapest link mode, truncating");
                return BudgetedReport {
                    text: truncate_chars(&text, max_chars),
                    link_mode: options.link_mode,
                    truncated: true,
                };
            }
        }
    }
}

/// Keep at most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => text[..byte_offset].to_string(),
        None => text.to_string(),
    }
}

/// Generate the posted and the full report for `inputs`.
pub fn generate(config: &ReportConfig, inputs: &ReportInputs) -> Result<GeneratedReport> {
    config.validate()?;

    let parser = LcovParser::new()
        .with_root_prefix(config.root_prefix.clone())
        .with_merge_policy(config.merge_policy);
    let current = parser.parse(inputs.current);
    let baseline = inputs.baseline.map(|text| parser.parse(text));
    info!(
        files = current.len(),
        baseline_files = baseline.as_ref().map(|b| b.len()),
        "parsed coverage"
    );

    let matched = match (config.filter_changed_files, inputs.changed_files) {
        (true, Some(changed)) => {
            let mut models = vec![&current];
            models.extend(baseline.as_ref());
            Some(changed_record_paths(changed, config.working_dir.as_deref(), &models))
        }
        (true, None) => {
            warn!("changed-file filtering requested without a changed-files list, showing all files");
            None
        }
        (false, _) => None,
    };
    let filter = matched.as_ref();

    let removed_files = baseline
        .as_ref()
        .map(|b| removed_paths(&current, b))
        .unwrap_or_default();
    if !removed_files.is_empty() {
        info!(count = removed_files.len(), "files removed since baseline");
    }

    let current_agg = aggregate(&current, filter);
    let baseline_agg = baseline.as_ref().map(|b| aggregate(b, filter));
    let baseline_overall = baseline_agg.as_ref().map(|a| a.overall);
    let entries = build_diff(&current, baseline.as_ref(), filter);

    let posted = render_within_budget(
        &entries,
        &current_agg.overall,
        baseline_overall.as_ref(),
        &config.render_options(config.link_mode, filter.is_some()),
        config.max_chars,
    );

    // The full report ignores the changed-file filter and the budget.
    let full = if filter.is_some() || config.link_mode != LinkMode::FilesAndLines {
        let all_entries = build_diff(&current, baseline.as_ref(), None);
        let all_overall = current.stats();
        let all_baseline = baseline.as_ref().map(|b| b.stats());
        render(
            &all_entries,
            &all_overall,
            all_baseline.as_ref(),
            &config.render_options(LinkMode::FilesAndLines, false),
        )
    } else {
        render(
            &entries,
            &current_agg.overall,
            baseline_overall.as_ref(),
            &config.render_options(LinkMode::FilesAndLines, false),
        )
    };

    Ok(GeneratedReport {
        overall_delta: overall_delta(&current_agg.overall, baseline_overall.as_ref()),
        overall: current_agg.overall,
        posted,
        full,
        removed_files,
    })
}

/// Read an LCOV file. Missing, unreadable or blank files are not an error:
/// the caller has nothing to report and returns early.
pub fn read_lcov(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if text.trim().is_empty() {
                warn!(path = %path.display(), "coverage report is empty");
                return None;
            }
            Some(text)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no coverage report found");
            None
        }
    }
}
