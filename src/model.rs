//! Normalized in-memory representation of LCOV coverage data. The parser
//! builds a `CoverageModel` through `ModelBuilder`; everything downstream
//! (aggregation, diffing, rendering) only reads it.

use std::collections::HashMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::Serialize;

use crate::error::CovdeltaError;

/// Compute a coverage percentage rounded to two decimals, returning 100.0
/// when nothing was found.
#[must_use]
pub fn percentage(hit: u64, found: u64) -> f64 {
    if found == 0 {
        100.0
    } else {
        round2(hit as f64 / found as f64 * 100.0)
    }
}

/// Round to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// How hit counts combine when the same line, branch or function shows up
/// more than once for a path (repeated keys in one section, or repeated
/// `SF:` sections).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Keep the largest count seen (the lcov merge convention).
    #[default]
    Max,
    /// Add the counts together.
    Sum,
}

impl MergePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergePolicy::Max => "max",
            MergePolicy::Sum => "sum",
        }
    }

    #[must_use]
    pub fn combine(self, existing: u64, incoming: u64) -> u64 {
        match self {
            MergePolicy::Max => existing.max(incoming),
            MergePolicy::Sum => existing.saturating_add(incoming),
        }
    }
}

impl std::str::FromStr for MergePolicy {
    type Err = CovdeltaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "max" => Ok(MergePolicy::Max),
            "sum" => Ok(MergePolicy::Sum),
            _ => Err(CovdeltaError::UnknownMergePolicy(s.to_string())),
        }
    }
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single instrumented line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCoverage {
    pub line_number: u32,
    pub hit_count: u64,
}

/// A single branch arm. `block` and `branch` are kept verbatim since LCOV
/// writers disagree on their shape (`0`, `e0`, or an expression).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchCoverage {
    pub line_number: u32,
    pub block: String,
    pub branch: String,
    pub hit_count: u64,
}

/// A function/method that was instrumented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCoverage {
    pub name: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub hit_count: u64,
}

/// Coverage data for a single source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub lines: Vec<LineCoverage>,
    pub branches: Vec<BranchCoverage>,
    pub functions: Vec<FunctionCoverage>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Counts derived from the per-line, per-branch and per-function data.
    #[must_use]
    pub fn stats(&self) -> FileStats {
        FileStats {
            lines_found: self.lines.len() as u64,
            lines_hit: self.lines.iter().filter(|l| l.hit_count > 0).count() as u64,
            branches_found: self.branches.len() as u64,
            branches_hit: self.branches.iter().filter(|b| b.hit_count > 0).count() as u64,
            functions_found: self.functions.len() as u64,
            functions_hit: self.functions.iter().filter(|f| f.hit_count > 0).count() as u64,
        }
    }

    pub fn hit_count(&self, line_number: u32) -> Option<u64> {
        self.lines
            .iter()
            .find(|l| l.line_number == line_number)
            .map(|l| l.hit_count)
    }

    /// Zero-hit line numbers, ascending.
    #[must_use]
    pub fn uncovered_lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = self
            .lines
            .iter()
            .filter(|l| l.hit_count == 0)
            .map(|l| l.line_number)
            .collect();
        lines.sort_unstable();
        lines
    }

    /// Every instrumented line number, ascending.
    #[must_use]
    pub fn instrumentable_lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = self.lines.iter().map(|l| l.line_number).collect();
        lines.sort_unstable();
        lines
    }
}

/// Found/hit counts for one file or an aggregate of files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub lines_found: u64,
    pub lines_hit: u64,
    pub branches_found: u64,
    pub branches_hit: u64,
    pub functions_found: u64,
    pub functions_hit: u64,
}

impl FileStats {
    #[must_use]
    pub fn line_percentage(&self) -> f64 {
        percentage(self.lines_hit, self.lines_found)
    }

    #[must_use]
    pub fn branch_percentage(&self) -> f64 {
        percentage(self.branches_hit, self.branches_found)
    }

    #[must_use]
    pub fn function_percentage(&self) -> f64 {
        percentage(self.functions_hit, self.functions_found)
    }
}

impl Add for FileStats {
    type Output = FileStats;

    fn add(mut self, rhs: FileStats) -> FileStats {
        self += rhs;
        self
    }
}

impl AddAssign for FileStats {
    fn add_assign(&mut self, rhs: FileStats) {
        self.lines_found += rhs.lines_found;
        self.lines_hit += rhs.lines_hit;
        self.branches_found += rhs.branches_found;
        self.branches_hit += rhs.branches_hit;
        self.functions_found += rhs.functions_found;
        self.functions_hit += rhs.functions_hit;
    }
}

impl Sum for FileStats {
    fn sum<I: Iterator<Item = FileStats>>(iter: I) -> FileStats {
        iter.fold(FileStats::default(), Add::add)
    }
}

/// The parsed coverage of one LCOV document: one record per path, in the
/// order paths were first seen.
#[derive(Debug, Clone, Default)]
pub struct CoverageModel {
    files: Vec<FileRecord>,
    index: HashMap<String, usize>,
}

impl CoverageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from already constructed records, merging records that
    /// share a path.
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>, policy: MergePolicy) -> Self {
        let mut builder = ModelBuilder::new(policy);
        for record in records {
            builder.commit(RecordBuilder::from_record(record, policy));
        }
        builder.finish()
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.index.get(path).map(|&i| &self.files[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Totals across every file.
    #[must_use]
    pub fn stats(&self) -> FileStats {
        self.files.iter().map(FileRecord::stats).sum()
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

type BranchKey = (u32, String, String);

/// Accumulates one file record, keeping line, branch and function keys
/// unique by combining repeats with the merge policy.
#[derive(Debug)]
pub struct RecordBuilder {
    record: FileRecord,
    policy: MergePolicy,
    line_index: HashMap<u32, usize>,
    branch_index: HashMap<BranchKey, usize>,
    function_index: HashMap<String, usize>,
}

impl RecordBuilder {
    pub fn new(path: impl Into<String>, policy: MergePolicy) -> Self {
        Self {
            record: FileRecord::new(path),
            policy,
            line_index: HashMap::new(),
            branch_index: HashMap::new(),
            function_index: HashMap::new(),
        }
    }

    pub fn from_record(record: FileRecord, policy: MergePolicy) -> Self {
        let mut builder = Self::new(record.path.clone(), policy);
        builder.absorb(record);
        builder
    }

    pub fn path(&self) -> &str {
        &self.record.path
    }

    /// Record a line hit. Line 0 is not a valid 1-based line and is dropped.
    pub fn add_line(&mut self, line_number: u32, hit_count: u64) {
        if line_number == 0 {
            return;
        }
        match self.line_index.get(&line_number) {
            Some(&i) => {
                let line = &mut self.record.lines[i];
                line.hit_count = self.policy.combine(line.hit_count, hit_count);
            }
            None => {
                self.line_index.insert(line_number, self.record.lines.len());
                self.record.lines.push(LineCoverage {
                    line_number,
                    hit_count,
                });
            }
        }
    }

    pub fn add_branch(&mut self, line_number: u32, block: &str, branch: &str, hit_count: u64) {
        if line_number == 0 {
            return;
        }
        let key = (line_number, block.to_string(), branch.to_string());
        match self.branch_index.get(&key) {
            Some(&i) => {
                let arm = &mut self.record.branches[i];
                arm.hit_count = self.policy.combine(arm.hit_count, hit_count);
            }
            None => {
                self.branch_index.insert(key, self.record.branches.len());
                self.record.branches.push(BranchCoverage {
                    line_number,
                    block: block.to_string(),
                    branch: branch.to_string(),
                    hit_count,
                });
            }
        }
    }

    /// Declare a function (`FN:`). Its hit count stays 0 until an `FNDA:`
    /// for the same name arrives.
    pub fn declare_function(&mut self, name: &str, start_line: Option<u32>, end_line: Option<u32>) {
        let i = self.function_slot(name);
        let func = &mut self.record.functions[i];
        func.start_line = func.start_line.or(start_line);
        func.end_line = func.end_line.or(end_line);
    }

    /// Record a function hit count (`FNDA:`).
    pub fn add_function_hits(&mut self, name: &str, hit_count: u64) {
        let i = self.function_slot(name);
        let func = &mut self.record.functions[i];
        func.hit_count = self.policy.combine(func.hit_count, hit_count);
    }

    fn function_slot(&mut self, name: &str) -> usize {
        if let Some(&i) = self.function_index.get(name) {
            return i;
        }
        let i = self.record.functions.len();
        self.function_index.insert(name.to_string(), i);
        self.record.functions.push(FunctionCoverage {
            name: name.to_string(),
            start_line: None,
            end_line: None,
            hit_count: 0,
        });
        i
    }

    /// Fold every entry of another record for the same path into this one.
    pub fn absorb(&mut self, other: FileRecord) {
        for line in other.lines {
            self.add_line(line.line_number, line.hit_count);
        }
        for arm in other.branches {
            self.add_branch(arm.line_number, &arm.block, &arm.branch, arm.hit_count);
        }
        for func in other.functions {
            self.declare_function(&func.name, func.start_line, func.end_line);
            self.add_function_hits(&func.name, func.hit_count);
        }
    }

    pub fn finish(self) -> FileRecord {
        self.record
    }
}

/// Collects committed records into a `CoverageModel`, merging records that
/// share a path.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    policy: MergePolicy,
    files: Vec<RecordBuilder>,
    index: HashMap<String, usize>,
}

impl ModelBuilder {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            files: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn commit(&mut self, record: RecordBuilder) {
        match self.index.get(record.path()) {
            Some(&i) => self.files[i].absorb(record.finish()),
            None => {
                self.index.insert(record.path().to_string(), self.files.len());
                self.files.push(record);
            }
        }
    }

    pub fn finish(self) -> CoverageModel {
        let files: Vec<FileRecord> = self.files.into_iter().map(RecordBuilder::finish).collect();
        let index = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.path.clone(), i))
            .collect();
        CoverageModel { files, index }
    }
}
