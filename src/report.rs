//! Output formatting for coverage diff results.

use std::fmt::Write;

use crate::config::{repo_path, CommitRefs, RepoIdentity, DEFAULT_TITLE};
use crate::diff::{overall_delta, DiffEntry};
use crate::error::CovdeltaError;
use crate::model::FileStats;

/// How much hyperlinking the Markdown report embeds. Ordered from the most
/// verbose to the most compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Link file names to their source view and uncovered line ranges to
    /// the exact lines.
    #[default]
    FilesAndLines,
    /// Link file names only.
    FilesOnly,
    /// Plain text.
    None,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::FilesAndLines => "files-and-lines",
            LinkMode::FilesOnly => "files-only",
            LinkMode::None => "none",
        }
    }

    /// The next more compact mode, if any.
    pub fn cheaper(self) -> Option<LinkMode> {
        match self {
            LinkMode::FilesAndLines => Some(LinkMode::FilesOnly),
            LinkMode::FilesOnly => Some(LinkMode::None),
            LinkMode::None => None,
        }
    }
}

impl std::str::FromStr for LinkMode {
    type Err = CovdeltaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "files-and-lines" => Ok(LinkMode::FilesAndLines),
            "files-only" => Ok(LinkMode::FilesOnly),
            "none" => Ok(LinkMode::None),
            _ => Err(CovdeltaError::UnknownLinkMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for LinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one rendering pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    pub title: &'a str,
    pub link_mode: LinkMode,
    /// Show only changed files; the caller passes the matching aggregate.
    pub filter_changed_files: bool,
    pub repository: Option<&'a RepoIdentity>,
    pub refs: &'a CommitRefs,
    /// Package directory joined onto relative paths in links.
    pub working_dir: Option<&'a str>,
}

impl<'a> RenderOptions<'a> {
    /// Source view of a record path, when repository and commit are known.
    fn file_url(&self, path: &str) -> Option<String> {
        let repo = self.repository?;
        let commit = self.refs.commit.as_deref()?;
        Some(repo.blob_url(commit, &repo_path(self.working_dir, path)))
    }
}

/// Diff results and aggregates, ready to be formatted.
pub struct CoverageReport<'a> {
    /// Rows in path order, as produced by the diff engine.
    pub entries: &'a [DiffEntry],
    pub overall: FileStats,
    pub baseline_overall: Option<FileStats>,
}

impl CoverageReport<'_> {
    /// Format using a specific formatter.
    #[must_use]
    pub fn format(&self, formatter: &dyn ReportFormatter) -> String {
        formatter.format(self)
    }
}

/// Trait for formatting coverage reports.
pub trait ReportFormatter {
    /// Format the report to a string.
    fn format(&self, report: &CoverageReport) -> String;
}

/// Render the Markdown report. Pure: the same input always produces the
/// same text, so callers may re-render at cheaper link modes freely.
#[must_use]
pub fn render(
    entries: &[DiffEntry],
    overall: &FileStats,
    baseline_overall: Option<&FileStats>,
    options: &RenderOptions,
) -> String {
    let report = CoverageReport {
        entries,
        overall: *overall,
        baseline_overall: baseline_overall.copied(),
    };
    report.format(&MarkdownFormatter { options: *options })
}

/// Plain text formatter, for terminals.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &CoverageReport) -> String {
        let mut out = String::new();
        let overall = &report.overall;
        let delta = format_delta(overall_delta(overall, report.baseline_overall.as_ref()));

        writeln!(out, "Coverage:   {:.2}% ({delta})", overall.line_percentage()).unwrap();
        writeln!(out, "Lines:      {}/{}", overall.lines_hit, overall.lines_found).unwrap();
        if overall.branches_found > 0 {
            writeln!(
                out,
                "Branches:   {}/{} ({:.2}%)",
                overall.branches_hit,
                overall.branches_found,
                overall.branch_percentage()
            )
            .unwrap();
        }
        if overall.functions_found > 0 {
            writeln!(
                out,
                "Functions:  {}/{} ({:.2}%)",
                overall.functions_hit,
                overall.functions_found,
                overall.function_percentage()
            )
            .unwrap();
        }

        if !report.entries.is_empty() {
            out.push('\n');
            for entry in report.entries {
                let path = &entry.path;
                let pct = entry.current.line_percentage();
                let delta = format_entry_delta(entry);
                write!(out, "  {path}  {pct:.2}%  {delta}").unwrap();
                if !entry.uncovered_lines.is_empty() {
                    let missed = format_line_ranges(&entry.uncovered_lines, &entry.instrumentable_lines);
                    write!(out, "  uncovered: {missed}").unwrap();
                }
                out.push('\n');
            }
        }

        out
    }
}

/// Markdown formatter, for pull request comments and job summaries.
pub struct MarkdownFormatter<'a> {
    pub options: RenderOptions<'a>,
}

impl ReportFormatter for MarkdownFormatter<'_> {
    fn format(&self, report: &CoverageReport) -> String {
        let options = &self.options;
        let mut md = String::new();

        let title = if options.title.trim().is_empty() {
            DEFAULT_TITLE
        } else {
            options.title
        };
        writeln!(md, "## {title}\n").unwrap();

        let overall = &report.overall;
        let pct = overall.line_percentage();
        let delta = format_delta(overall_delta(overall, report.baseline_overall.as_ref()));
        let subject = if options.filter_changed_files {
            "Changed files coverage"
        } else {
            "Coverage"
        };
        match (options.refs.head.as_deref(), options.refs.base.as_deref()) {
            (Some(head), Some(base)) => writeln!(
                md,
                "{subject} after merging `{head}` into `{base}` will be **{pct:.2}%** ({delta})\n"
            )
            .unwrap(),
            _ => writeln!(md, "{subject}: **{pct:.2}%** ({delta})\n").unwrap(),
        }

        writeln!(
            md,
            "Lines: {}/{} · Branches: {}/{} · Functions: {}/{}\n",
            overall.lines_hit,
            overall.lines_found,
            overall.branches_hit,
            overall.branches_found,
            overall.functions_hit,
            overall.functions_found,
        )
        .unwrap();

        let rows: Vec<&DiffEntry> = report
            .entries
            .iter()
            .filter(|e| !options.filter_changed_files || e.is_changed_file)
            .collect();

        if rows.is_empty() {
            if options.filter_changed_files {
                md.push_str("_No changed files with coverage data._\n");
            } else {
                md.push_str("_No coverage data._\n");
            }
        } else {
            md.push_str("| File | Lines | Δ | Branches | Functions | Uncovered Lines |\n");
            md.push_str("|:-----|------:|--:|---------:|----------:|:----------------|\n");

            let mut has_empty_files = false;
            for entry in &rows {
                let lines = if entry.current.lines_found == 0 {
                    has_empty_files = true;
                    format!("{:.2}%\\*", entry.current.line_percentage())
                } else {
                    format!("{:.2}%", entry.current.line_percentage())
                };
                writeln!(
                    md,
                    "| {} | {lines} | {} | {:.2}% | {:.2}% | {} |",
                    self.file_cell(&entry.path),
                    format_entry_delta(entry),
                    entry.current.branch_percentage(),
                    entry.current.function_percentage(),
                    self.uncovered_cell(entry),
                )
                .unwrap();
            }

            if has_empty_files {
                md.push_str("\n\\* No instrumented lines.\n");
            }
        }

        if let Some(commit) = options.refs.commit.as_deref() {
            let short_sha = commit.get(..7).unwrap_or(commit);
            writeln!(md, "\n<sub>covdelta · `{short_sha}`</sub>").unwrap();
        }

        md
    }
}

impl MarkdownFormatter<'_> {
    fn file_cell(&self, path: &str) -> String {
        let label = code_span(&escape_cell(path));
        match self.options.link_mode {
            LinkMode::FilesAndLines | LinkMode::FilesOnly => match self.options.file_url(path) {
                Some(url) => format!("[{label}]({url})"),
                None => label,
            },
            LinkMode::None => label,
        }
    }

    fn uncovered_cell(&self, entry: &DiffEntry) -> String {
        let url = match self.options.link_mode {
            LinkMode::FilesAndLines => self.options.file_url(&entry.path),
            _ => None,
        };
        match url {
            Some(url) => format_line_ranges_linked(&entry.uncovered_lines, &entry.instrumentable_lines, &url),
            None => format_line_ranges(&entry.uncovered_lines, &entry.instrumentable_lines),
        }
    }
}

/// Signed two-decimal delta, `ø` when zero or unknown.
#[must_use]
pub fn format_delta(delta: Option<f64>) -> String {
    match delta {
        Some(d) if d > 0.0 => format!("+{d:.2}"),
        Some(d) if d < 0.0 => format!("{d:.2}"),
        _ => "ø".to_string(),
    }
}

/// Like [`format_delta`], but files missing from the baseline read `new`.
fn format_entry_delta(entry: &DiffEntry) -> String {
    if entry.is_new() {
        "new".to_string()
    } else {
        format_delta(entry.percentage_delta)
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Inline code. Text containing backticks gets a double-backtick fence,
/// padded so a leading or trailing backtick stays inside the span.
fn code_span(text: &str) -> String {
    if text.contains('`') {
        format!("`` {text} ``")
    } else {
        format!("`{text}`")
    }
}

/// Longest run of blank or comment lines two uncovered lines may straddle
/// and still share one range.
const MAX_BRIDGE_GAP: u32 = 2;

/// Group uncovered lines into inclusive `(first, last)` ranges. Two lines
/// join when they are adjacent, or when only a short run of lines that
/// carry no coverage data sits between them; a covered line always splits.
///
/// Inputs are ascending and free of duplicates.
#[must_use]
pub fn coalesce_ranges(lines: &[u32], all_instrumentable: &[u32]) -> Vec<(u32, u32)> {
    let Some((&first, rest)) = lines.split_first() else {
        return Vec::new();
    };
    debug_assert!(lines.windows(2).all(|w| w[0] < w[1]));

    let is_instrumented = |l: u32| all_instrumentable.binary_search(&l).is_ok();
    let mut ranges = Vec::new();
    let (mut start, mut end) = (first, first);
    for &line in rest {
        let bridged = line - end - 1 <= MAX_BRIDGE_GAP && !(end + 1..line).any(is_instrumented);
        if !bridged {
            ranges.push((start, end));
            start = line;
        }
        end = line;
    }
    ranges.push((start, end));
    ranges
}

/// Format line numbers into compact range notation with Markdown links
/// into `file_url`, e.g. `[3-5](<file_url>#L3-L5)`.
#[must_use]
pub fn format_line_ranges_linked(lines: &[u32], all_instrumentable: &[u32], file_url: &str) -> String {
    coalesce_ranges(lines, all_instrumentable)
        .iter()
        .map(|&(start, end)| {
            if start == end {
                format!("[{start}]({file_url}#L{start})")
            } else {
                format!("[{start}-{end}]({file_url}#L{start}-L{end})")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format line numbers into compact range notation, e.g. "1, 3-5, 8".
#[must_use]
pub fn format_line_ranges(lines: &[u32], all_instrumentable: &[u32]) -> String {
    coalesce_ranges(lines, all_instrumentable)
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::build_diff;
    use crate::parsers::lcov::parse;

    const URL: &str = "https://github.com/acme/app/blob/abc123/src/foo.rs";

    fn refs() -> CommitRefs {
        CommitRefs {
            commit: Some("abc1234def".into()),
            base_commit: Some("0001111".into()),
            head: Some("feature".into()),
            base: Some("main".into()),
        }
    }

    fn options<'a>(repo: &'a RepoIdentity, refs: &'a CommitRefs, link_mode: LinkMode) -> RenderOptions<'a> {
        RenderOptions {
            title: "Coverage Report",
            link_mode,
            filter_changed_files: false,
            repository: Some(repo),
            refs,
            working_dir: None,
        }
    }

    #[test]
    fn test_ranges_from_no_lines() {
        assert!(coalesce_ranges(&[], &[1, 2]).is_empty());
    }

    #[test]
    fn test_adjacent_lines_share_a_range() {
        assert_eq!(coalesce_ranges(&[4, 5, 6, 9], &[4, 5, 6, 7, 9]), vec![(4, 6), (9, 9)]);
    }

    #[test]
    fn test_short_blank_gap_is_spanned() {
        // 12 and 13 carry no coverage data.
        assert_eq!(coalesce_ranges(&[10, 11, 14], &[10, 11, 14]), vec![(10, 14)]);
    }

    #[test]
    fn test_long_blank_gap_splits() {
        assert_eq!(coalesce_ranges(&[10, 14], &[10, 14]), vec![(10, 10), (14, 14)]);
    }

    #[test]
    fn test_covered_line_in_gap_splits() {
        // 11 is instrumented and covered.
        assert_eq!(coalesce_ranges(&[10, 12], &[10, 11, 12]), vec![(10, 10), (12, 12)]);
    }

    // -- format_line_ranges tests -------------------------------------------

    #[test]
    fn test_format_line_ranges_mixed() {
        assert_eq!(
            format_line_ranges(&[1, 3, 4, 5, 10], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            "1, 3-5, 10"
        );
    }

    #[test]
    fn test_format_line_ranges_linked_single() {
        assert_eq!(
            format_line_ranges_linked(&[5], &[5], URL),
            format!("[5]({URL}#L5)")
        );
    }

    #[test]
    fn test_format_line_ranges_linked_mixed() {
        assert_eq!(
            format_line_ranges_linked(&[1, 3, 4, 5, 10], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], URL),
            format!("[1]({URL}#L1), [3-5]({URL}#L3-L5), [10]({URL}#L10)")
        );
    }

    // -- delta formatting ---------------------------------------------------

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(Some(50.0)), "+50.00");
        assert_eq!(format_delta(Some(-3.256)), "-3.26");
        assert_eq!(format_delta(Some(0.0)), "ø");
        assert_eq!(format_delta(Some(-0.0)), "ø");
        assert_eq!(format_delta(None), "ø");
    }

    #[test]
    fn test_link_mode_from_str_and_order() {
        assert_eq!("auto".parse::<LinkMode>().unwrap(), LinkMode::FilesAndLines);
        assert_eq!("files-only".parse::<LinkMode>().unwrap(), LinkMode::FilesOnly);
        assert_eq!("NONE".parse::<LinkMode>().unwrap(), LinkMode::None);
        assert!("everything".parse::<LinkMode>().is_err());

        assert_eq!(LinkMode::FilesAndLines.cheaper(), Some(LinkMode::FilesOnly));
        assert_eq!(LinkMode::FilesOnly.cheaper(), Some(LinkMode::None));
        assert_eq!(LinkMode::None.cheaper(), None);
    }

    // -- markdown rendering -------------------------------------------------

    #[test]
    fn test_render_example_scenario() {
        let current = parse("SF:src/foo.rs\nDA:1,1\nDA:2,0\nend_of_record\n");
        let baseline = parse("SF:src/foo.rs\nDA:1,0\nDA:2,0\nend_of_record\n");
        let entries = build_diff(&current, Some(&baseline), None);
        let repo = RepoIdentity::github("acme/app");
        let refs = refs();

        let md = render(
            &entries,
            &current.stats(),
            Some(&baseline.stats()),
            &options(&repo, &refs, LinkMode::FilesAndLines),
        );

        assert!(md.starts_with("## Coverage Report\n"));
        assert!(md.contains("Coverage after merging `feature` into `main` will be **50.00%** (+50.00)"));
        assert!(md.contains("Lines: 1/2 · Branches: 0/0 · Functions: 0/0"));
        assert!(md.contains(
            "| [`src/foo.rs`](https://github.com/acme/app/blob/abc1234def/src/foo.rs) | 50.00% | +50.00 |"
        ));
        assert!(md.contains("[2](https://github.com/acme/app/blob/abc1234def/src/foo.rs#L2)"));
        assert!(md.contains("abc1234"));
    }

    #[test]
    fn test_render_new_file_differs_from_unchanged() {
        let current = parse("SF:a.js\nDA:1,1\nend_of_record\nSF:b.js\nDA:1,1\nend_of_record\n");
        let baseline = parse("SF:a.js\nDA:1,1\nend_of_record\n");
        let entries = build_diff(&current, Some(&baseline), None);
        let refs = CommitRefs::default();
        let opts = RenderOptions {
            title: "Coverage Report",
            link_mode: LinkMode::None,
            filter_changed_files: false,
            repository: None,
            refs: &refs,
            working_dir: None,
        };

        let md = render(&entries, &current.stats(), Some(&baseline.stats()), &opts);
        assert!(md.contains("| `a.js` | 100.00% | ø |"));
        assert!(md.contains("| `b.js` | 100.00% | new |"));
        assert!(md.contains("Coverage: **100.00%** (ø)"));
    }

    #[test]
    fn test_render_zero_line_file_is_marked() {
        let current = parse("SF:empty.js\nFN:1,f\nend_of_record\n");
        let entries = build_diff(&current, None, None);
        let refs = CommitRefs::default();
        let opts = RenderOptions {
            title: "",
            link_mode: LinkMode::FilesAndLines,
            filter_changed_files: false,
            repository: None,
            refs: &refs,
            working_dir: None,
        };

        let md = render(&entries, &current.stats(), None, &opts);
        assert!(md.starts_with("## Coverage Report\n"));
        assert!(md.contains("| `empty.js` | 100.00%\\* | new |"));
        assert!(md.contains("No instrumented lines."));
    }

    #[test]
    fn test_render_filters_changed_files() {
        let current = parse("SF:a.js\nDA:1,0\nend_of_record\nSF:b.js\nDA:1,1\nend_of_record\n");
        let changed = std::collections::BTreeSet::from(["a.js".to_string()]);
        let entries = build_diff(&current, None, Some(&changed));
        let refs = CommitRefs::default();
        let opts = RenderOptions {
            title: "Coverage Report",
            link_mode: LinkMode::None,
            filter_changed_files: true,
            repository: None,
            refs: &refs,
            working_dir: None,
        };

        let md = render(&entries, &current.get("a.js").unwrap().stats(), None, &opts);
        assert!(md.contains("Changed files coverage: **0.00%** (ø)"));
        assert!(md.contains("`a.js`"));
        assert!(!md.contains("`b.js`"));
    }

    #[test]
    fn test_render_no_changed_rows() {
        let current = parse("SF:a.js\nDA:1,0\nend_of_record\n");
        let changed = std::collections::BTreeSet::new();
        let entries = build_diff(&current, None, Some(&changed));
        let refs = CommitRefs::default();
        let opts = RenderOptions {
            title: "Coverage Report",
            link_mode: LinkMode::None,
            filter_changed_files: true,
            repository: None,
            refs: &refs,
            working_dir: None,
        };

        let md = render(&entries, &FileStats::default(), None, &opts);
        assert!(md.contains("_No changed files with coverage data._"));
        assert!(!md.contains("| File |"));
    }

    #[test]
    fn test_render_without_repository_has_no_links() {
        let current = parse("SF:a.js\nDA:1,0\nend_of_record\n");
        let entries = build_diff(&current, None, None);
        let refs = refs();
        let opts = RenderOptions {
            title: "Coverage Report",
            link_mode: LinkMode::FilesAndLines,
            filter_changed_files: false,
            repository: None,
            refs: &refs,
            working_dir: None,
        };

        let md = render(&entries, &current.stats(), None, &opts);
        assert!(!md.contains("]("));
        assert!(md.contains("| `a.js` | 0.00% | new | 100.00% | 100.00% | 1 |"));
    }

    #[test]
    fn test_link_modes_shrink_output() {
        let current = parse(
            "SF:src/a.js\nDA:1,0\nDA:2,1\nDA:7,0\nend_of_record\nSF:src/b.js\nDA:1,0\nend_of_record\n",
        );
        let entries = build_diff(&current, None, None);
        let repo = RepoIdentity::github("acme/app");
        let refs = refs();
        let stats = current.stats();

        let rich = render(&entries, &stats, None, &options(&repo, &refs, LinkMode::FilesAndLines));
        let files = render(&entries, &stats, None, &options(&repo, &refs, LinkMode::FilesOnly));
        let plain = render(&entries, &stats, None, &options(&repo, &refs, LinkMode::None));

        assert!(rich.len() >= files.len());
        assert!(files.len() >= plain.len());
        assert!(rich.contains("#L7"));
        assert!(!files.contains("#L7"));
        assert!(files.contains("blob/abc1234def/src/a.js"));
        assert!(!plain.contains("blob/"));
    }

    #[test]
    fn test_render_escapes_pipes_in_paths() {
        let current = parse("SF:odd|name.js\nDA:1,1\nend_of_record\n");
        let entries = build_diff(&current, None, None);
        let refs = CommitRefs::default();
        let opts = RenderOptions {
            title: "Coverage Report",
            link_mode: LinkMode::None,
            filter_changed_files: false,
            repository: None,
            refs: &refs,
            working_dir: None,
        };
        let md = render(&entries, &current.stats(), None, &opts);
        assert!(md.contains("`odd\\|name.js`"));
    }

    #[test]
    fn test_render_links_include_working_dir() {
        let current = parse("SF:src/a.js\nDA:1,0\nend_of_record\nSF:/opt/shared/b.js\nDA:1,1\nend_of_record\n");
        let entries = build_diff(&current, None, None);
        let repo = RepoIdentity::github("acme/app");
        let refs = refs();
        let opts = RenderOptions {
            working_dir: Some("web"),
            ..options(&repo, &refs, LinkMode::FilesAndLines)
        };

        let md = render(&entries, &current.stats(), None, &opts);
        assert!(md.contains("[`src/a.js`](https://github.com/acme/app/blob/abc1234def/web/src/a.js)"));
        assert!(md.contains("[1](https://github.com/acme/app/blob/abc1234def/web/src/a.js#L1)"));
        assert!(md.contains("(https://github.com/acme/app/blob/abc1234def/opt/shared/b.js)"));
    }

    #[test]
    fn test_render_backticks_and_spaces_in_paths() {
        let current = parse("SF:src/we`ird dir/a.js\nDA:1,0\nend_of_record\n");
        let entries = build_diff(&current, None, None);
        let repo = RepoIdentity::github("acme/app");
        let refs = refs();

        let md = render(&entries, &current.stats(), None, &options(&repo, &refs, LinkMode::FilesOnly));
        assert!(md.contains(
            "[`` src/we`ird dir/a.js ``](https://github.com/acme/app/blob/abc1234def/src/we%60ird%20dir/a.js)"
        ));
    }

    #[test]
    fn test_text_formatter() {
        let current = parse("SF:a.js\nDA:1,1\nDA:2,0\nDA:3,0\nBRDA:1,0,0,1\nend_of_record\n");
        let baseline = parse("SF:a.js\nDA:1,1\nDA:2,1\nDA:3,0\nend_of_record\n");
        let entries = build_diff(&current, Some(&baseline), None);
        let report = CoverageReport {
            entries: &entries,
            overall: current.stats(),
            baseline_overall: Some(baseline.stats()),
        };

        let text = report.format(&TextFormatter);
        assert!(text.contains("Coverage:   33.33% (-33.34)"));
        assert!(text.contains("Lines:      1/3"));
        assert!(text.contains("Branches:   1/1 (100.00%)"));
        assert!(!text.contains("Functions:"));
        assert!(text.contains("a.js  33.33%  -33.34  uncovered: 2-3"));
    }
}
