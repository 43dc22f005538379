//! Compare a current coverage model against an optional baseline, one entry
//! per file of the current model, keyed and ordered by path.

use std::collections::BTreeSet;

use crate::config::repo_path;
use crate::model::{round2, CoverageModel, FileStats};

/// Comparison result for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    pub path: String,
    pub current: FileStats,
    /// `None` when the file does not exist in the baseline.
    pub baseline: Option<FileStats>,
    /// Current minus baseline line percentage; `None` for new files.
    pub percentage_delta: Option<f64>,
    /// Zero-hit lines in the current model, ascending. Empty for unchanged
    /// files when a changed-files set is in effect.
    pub uncovered_lines: Vec<u32>,
    /// Every instrumented line, used to bridge gaps when formatting ranges.
    pub instrumentable_lines: Vec<u32>,
    pub is_changed_file: bool,
}

impl DiffEntry {
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.baseline.is_none()
    }
}

/// Line-percentage delta between two aggregates, rounded to two decimals.
#[must_use]
pub fn percentage_delta(current: &FileStats, baseline: &FileStats) -> f64 {
    round2(current.line_percentage() - baseline.line_percentage())
}

/// Delta of the overall line percentage, `None` without a baseline.
#[must_use]
pub fn overall_delta(current: &FileStats, baseline: Option<&FileStats>) -> Option<f64> {
    baseline.map(|b| percentage_delta(current, b))
}

/// Build one entry per file in `current`, sorted by path. Files that only
/// exist in `baseline` get no entry (see [`removed_paths`]).
pub fn build_diff(
    current: &CoverageModel,
    baseline: Option<&CoverageModel>,
    changed_files: Option<&BTreeSet<String>>,
) -> Vec<DiffEntry> {
    let mut entries: Vec<DiffEntry> = current
        .files()
        .iter()
        .map(|file| {
            let stats = file.stats();
            let base_stats = baseline.and_then(|b| b.get(&file.path)).map(|f| f.stats());
            let is_changed_file = changed_files.is_some_and(|c| c.contains(&file.path));
            let uncovered_lines = if changed_files.is_none() || is_changed_file {
                file.uncovered_lines()
            } else {
                Vec::new()
            };
            DiffEntry {
                path: file.path.clone(),
                current: stats,
                baseline: base_stats,
                percentage_delta: base_stats.map(|b| percentage_delta(&stats, &b)),
                uncovered_lines,
                instrumentable_lines: file.instrumentable_lines(),
                is_changed_file,
            }
        })
        .collect();

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

/// Translate a changed-files set (repository-relative) into the record
/// paths of `models` it covers, joining `working_dir` onto relative record
/// paths before comparing.
pub fn changed_record_paths(
    changed: &BTreeSet<String>,
    working_dir: Option<&str>,
    models: &[&CoverageModel],
) -> BTreeSet<String> {
    models
        .iter()
        .flat_map(|model| model.files())
        .filter(|file| changed.contains(&repo_path(working_dir, &file.path)))
        .map(|file| file.path.clone())
        .collect()
}

/// Paths present in the baseline but gone from the current model, sorted.
pub fn removed_paths(current: &CoverageModel, baseline: &CoverageModel) -> Vec<String> {
    let mut removed: Vec<String> = baseline
        .files()
        .iter()
        .filter(|f| !current.contains(&f.path))
        .map(|f| f.path.clone())
        .collect();
    removed.sort();
    removed
}
