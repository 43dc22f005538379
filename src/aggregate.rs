//! Totals and percentages for a coverage model, optionally restricted to a
//! set of paths (the files touched by the change under review).

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{CoverageModel, FileStats};

/// Aggregated statistics for one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    /// Totals over the files that passed the path filter (all files when no
    /// filter was given).
    pub overall: FileStats,
    /// Stats for every file in the model, filtered or not.
    pub per_file: BTreeMap<String, FileStats>,
}

/// Compute totals for `model`. When `path_filter` is given only member paths
/// contribute to `overall`; `per_file` always lists every file.
pub fn aggregate(model: &CoverageModel, path_filter: Option<&BTreeSet<String>>) -> Aggregate {
    let mut result = Aggregate::default();
    for file in model.files() {
        let stats = file.stats();
        if path_filter.map_or(true, |filter| filter.contains(&file.path)) {
            result.overall += stats;
        }
        result.per_file.insert(file.path.clone(), stats);
    }
    result
}
