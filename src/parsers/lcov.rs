/// Parser for the LCOV `.info` format.
///
/// Reference: https://ltp.sourceforge.net/coverage/lcov/geninfo.1.php
///
/// Key records:
///   TN:<test name>
///   SF:<absolute path to source file>
///   FN:<line>[,<end line>],<function name>
///   FNDA:<execution count>,<function name>
///   DA:<line number>,<execution count>[,<checksum>]
///   BRDA:<line>,<block>,<branch>,<taken>   ("-" means 0)
///   LF/LH/FNF/FNH/BRF/BRH summary counters (ignored)
///   end_of_record
///
/// Parsing is permissive: lines that cannot be interpreted are skipped and
/// never abort the parse.
use tracing::debug;

use super::{normalize_path, RootPrefix};
use crate::model::{CoverageModel, MergePolicy, ModelBuilder, RecordBuilder};

/// LCOV format parser.
#[derive(Debug, Clone, Default)]
pub struct LcovParser {
    root_prefix: Option<RootPrefix>,
    policy: MergePolicy,
}

/// Parser state between two input lines.
enum State {
    /// Outside any `SF:` section; data directives are discarded.
    Idle,
    /// Inside a section, accumulating its record until `end_of_record`.
    InRecord(RecordBuilder),
}

impl LcovParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_prefix(mut self, root_prefix: Option<RootPrefix>) -> Self {
        self.root_prefix = root_prefix;
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parse LCOV text into a coverage model.
    pub fn parse(&self, text: &str) -> CoverageModel {
        let mut model = ModelBuilder::new(self.policy);
        let mut state = State::Idle;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            state = self.step(state, line, &mut model);
        }

        // Input ended without end_of_record
        if let State::InRecord(pending) = state {
            commit(&mut model, pending);
        }

        model.finish()
    }

    fn step(&self, state: State, line: &str, model: &mut ModelBuilder) -> State {
        if line == "end_of_record" {
            if let State::InRecord(pending) = state {
                commit(model, pending);
            }
            return State::Idle;
        }

        let Some((tag, value)) = line.split_once(':') else {
            return state;
        };

        match (tag, state) {
            ("SF", state) => {
                if let State::InRecord(pending) = state {
                    commit(model, pending);
                }
                let path = normalize_path(value.trim(), self.root_prefix.as_ref());
                if path.is_empty() {
                    State::Idle
                } else {
                    State::InRecord(RecordBuilder::new(path, self.policy))
                }
            }
            (_, State::Idle) => State::Idle,
            (tag, State::InRecord(mut pending)) => {
                apply_directive(&mut pending, tag, value);
                State::InRecord(pending)
            }
        }
    }
}

/// Parse LCOV text with the default settings (no root prefix, max-merge).
pub fn parse(text: &str) -> CoverageModel {
    LcovParser::new().parse(text)
}

fn commit(model: &mut ModelBuilder, pending: RecordBuilder) {
    debug!(path = pending.path(), "committing LCOV record");
    model.commit(pending);
}

fn apply_directive(pending: &mut RecordBuilder, tag: &str, value: &str) {
    match tag {
        "DA" => {
            if let Some((line_number, hit_count)) = parse_da(value) {
                pending.add_line(line_number, hit_count);
            }
        }
        "BRDA" => {
            if let Some((line_number, block, branch, hit_count)) = parse_brda(value) {
                pending.add_branch(line_number, block, branch, hit_count);
            }
        }
        "FN" => {
            if let Some((start_line, end_line, name)) = parse_fn(value) {
                pending.declare_function(name, start_line, end_line);
            }
        }
        "FNDA" => {
            if let Some((hit_count, name)) = parse_fnda(value) {
                pending.add_function_hits(name, hit_count);
            }
        }
        // TN, LF, LH, FNF, FNH, BRF, BRH, VER — derived from the data or irrelevant.
        _ => {}
    }
}

/// `DA:<line>,<count>[,<checksum>]`. Negative counts mark
/// non-instrumentable lines and are skipped along with unparsable ones.
fn parse_da(value: &str) -> Option<(u32, u64)> {
    let mut parts = value.splitn(3, ',');
    let line_number = parts.next()?.trim().parse::<u32>().ok()?;
    let hit_count = parts.next()?.trim().parse::<u64>().ok()?;
    (line_number > 0).then_some((line_number, hit_count))
}

/// `BRDA:<line>,<block>,<branch>,<taken>`. The branch id may itself contain
/// commas (LCOV 2 expressions), so the count is split off from the right.
fn parse_brda(value: &str) -> Option<(u32, &str, &str, u64)> {
    let (rest, taken) = value.rsplit_once(',')?;
    let mut parts = rest.splitn(3, ',');
    let line_number = parts.next()?.trim().parse::<u32>().ok()?;
    let block = parts.next()?.trim();
    let branch = parts.next()?.trim();
    let hit_count = match taken.trim() {
        "-" => 0,
        t => t.parse::<u64>().ok()?,
    };
    (line_number > 0).then_some((line_number, block, branch, hit_count))
}

/// `FN:<line>,<name>` or `FN:<line>,<end line>,<name>`.
fn parse_fn(value: &str) -> Option<(Option<u32>, Option<u32>, &str)> {
    let (line_str, rest) = value.split_once(',')?;
    let start_line = line_str.trim().parse::<u32>().ok()?;
    let (end_line, name) = match rest.split_once(',') {
        Some((end_str, name)) => match end_str.trim().parse::<u32>() {
            Ok(end) => (Some(end), name),
            Err(_) => (None, rest),
        },
        None => (None, rest),
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(((start_line > 0).then_some(start_line), end_line, name))
}

/// `FNDA:<count>,<name>`.
fn parse_fnda(value: &str) -> Option<(u64, &str)> {
    let (count_str, name) = value.split_once(',')?;
    let hit_count = count_str.trim().parse::<u64>().ok()?;
    let name = name.trim();
    (!name.is_empty()).then_some((hit_count, name))
}
