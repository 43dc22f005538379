//! Command handler functions for the covdelta CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::changes::{ChangedFilesSource, GitHubSource};
use crate::config::{normalize_working_dir, CommitRefs, PostTarget, RepoIdentity, ReportConfig, DEFAULT_TITLE};
use crate::diff::{build_diff, changed_record_paths, overall_delta};
use crate::github::{self, comment_marker};
use crate::model::FileStats;
use crate::parsers::lcov::LcovParser;
use crate::parsers::RootPrefix;
use crate::pipeline::{generate, ReportInputs};
use crate::report::{CoverageReport, LinkMode, TextFormatter};

/// Render the Markdown report: the size-limited text by default, the full
/// report when `full` is set.
pub fn cmd_report(
    config: &ReportConfig,
    current: &str,
    baseline: Option<&str>,
    changed_files: Option<&BTreeSet<String>>,
    full: bool,
) -> Result<String> {
    let report = generate(
        config,
        &ReportInputs {
            current,
            baseline,
            changed_files,
        },
    )?;
    if report.posted.truncated {
        warn!(max_chars = config.max_chars, "report truncated");
    }
    Ok(if full { report.full } else { report.posted.text })
}

#[derive(Serialize)]
struct SummaryJson<'a> {
    overall: FileStats,
    line_percentage: f64,
    delta: Option<f64>,
    files: Vec<FileSummaryJson<'a>>,
}

#[derive(Serialize)]
struct FileSummaryJson<'a> {
    path: &'a str,
    #[serde(flatten)]
    stats: FileStats,
    line_percentage: f64,
    delta: Option<f64>,
    new: bool,
    uncovered_lines: &'a [u32],
}

/// Coverage totals and per-file rates, as plain text or JSON.
pub fn cmd_summary(
    config: &ReportConfig,
    current: &str,
    baseline: Option<&str>,
    changed_files: Option<&BTreeSet<String>>,
    json: bool,
) -> Result<String> {
    let parser = LcovParser::new()
        .with_root_prefix(config.root_prefix.clone())
        .with_merge_policy(config.merge_policy);
    let current = parser.parse(current);
    let baseline = baseline.map(|text| parser.parse(text));
    let matched = changed_files
        .filter(|_| config.filter_changed_files)
        .map(|changed| {
            let mut models = vec![&current];
            models.extend(baseline.as_ref());
            changed_record_paths(changed, config.working_dir.as_deref(), &models)
        });
    let filter = matched.as_ref();

    let overall = aggregate(&current, filter).overall;
    let baseline_overall = baseline.as_ref().map(|b| aggregate(b, filter).overall);
    let entries: Vec<_> = build_diff(&current, baseline.as_ref(), filter)
        .into_iter()
        .filter(|e| filter.is_none() || e.is_changed_file)
        .collect();

    if json {
        let summary = SummaryJson {
            overall,
            line_percentage: overall.line_percentage(),
            delta: overall_delta(&overall, baseline_overall.as_ref()),
            files: entries
                .iter()
                .map(|e| FileSummaryJson {
                    path: &e.path,
                    stats: e.current,
                    line_percentage: e.current.line_percentage(),
                    delta: e.percentage_delta,
                    new: e.is_new(),
                    uncovered_lines: &e.uncovered_lines,
                })
                .collect(),
        };
        let mut out = serde_json::to_string_pretty(&summary)?;
        out.push('\n');
        return Ok(out);
    }

    let report = CoverageReport {
        entries: &entries,
        overall,
        baseline_overall,
    };
    Ok(report.format(&TextFormatter))
}

// ---------------------------------------------------------------------------
// GitHub Actions mode
// ---------------------------------------------------------------------------

/// Raw action inputs. GitHub passes unset inputs as empty strings, so every
/// value is optional and blank means "use the default".
#[derive(Debug, Clone, Default)]
pub struct ActionInputs {
    pub working_directory: Option<String>,
    pub lcov_file: Option<String>,
    pub lcov_base: Option<String>,
    pub filter_changed_files: Option<String>,
    pub delete_old_comments: Option<String>,
    pub post_to: Option<String>,
    pub title: Option<String>,
    pub create_links: Option<String>,
}

/// Resolved action settings.
#[derive(Debug, Clone)]
pub struct ActionPlan {
    pub lcov_file: PathBuf,
    pub lcov_base: Option<PathBuf>,
    pub delete_old_comments: bool,
    pub post_to: PostTarget,
    pub config: ReportConfig,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn input_flag(value: &Option<String>) -> bool {
    non_blank(value).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Turn raw inputs into a plan. `workspace` is the checkout root stripped
/// from LCOV paths.
pub fn resolve_action_inputs(
    inputs: &ActionInputs,
    workspace: Option<&str>,
    repository: Option<RepoIdentity>,
    refs: CommitRefs,
) -> Result<ActionPlan> {
    let working_directory = non_blank(&inputs.working_directory).unwrap_or("./");
    let working_dir = normalize_working_dir(working_directory);
    let working_directory = PathBuf::from(working_directory);
    let lcov_file = working_directory.join(non_blank(&inputs.lcov_file).unwrap_or("./coverage/lcov.info"));
    let lcov_base = non_blank(&inputs.lcov_base).map(PathBuf::from);

    let link_mode = match non_blank(&inputs.create_links) {
        Some(mode) => mode.parse::<LinkMode>()?,
        None => LinkMode::FilesAndLines,
    };
    let post_to = match inputs.post_to.as_deref() {
        Some(target) => target.parse::<PostTarget>().unwrap_or_else(|e| {
            warn!(error = %e, "not posting the report");
            PostTarget::Nowhere
        }),
        None => PostTarget::Comment,
    };

    let config = ReportConfig {
        title: non_blank(&inputs.title).unwrap_or(DEFAULT_TITLE).to_string(),
        link_mode,
        filter_changed_files: input_flag(&inputs.filter_changed_files),
        root_prefix: workspace.and_then(RootPrefix::new),
        working_dir,
        repository,
        refs,
        ..Default::default()
    };
    config.validate()?;

    Ok(ActionPlan {
        lcov_file,
        lcov_base,
        delete_old_comments: input_flag(&inputs.delete_old_comments),
        post_to,
        config,
    })
}

/// The side effects of the action, behind a trait so the flow can be
/// exercised without a GitHub API.
pub trait Publisher {
    fn changed_files(&self) -> Result<BTreeSet<String>>;
    fn delete_old_comments(&self, marker: &str) -> Result<()>;
    fn post_comment(&self, body: &str) -> Result<()>;
    fn write_job_summary(&self, body: &str) -> Result<()>;
    fn set_output(&self, name: &str, value: &str) -> Result<()>;
}

impl Publisher for github::Context {
    fn changed_files(&self) -> Result<BTreeSet<String>> {
        GitHubSource { context: self }.changed_files()
    }

    fn delete_old_comments(&self, marker: &str) -> Result<()> {
        github::Context::delete_old_comments(self, marker)
    }

    fn post_comment(&self, body: &str) -> Result<()> {
        github::Context::post_comment(self, body)
    }

    fn write_job_summary(&self, body: &str) -> Result<()> {
        Ok(github::write_job_summary(body)?)
    }

    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        Ok(github::set_output(name, value)?)
    }
}

/// Generate the report and publish it according to `plan`.
pub fn cmd_github(
    publisher: &dyn Publisher,
    plan: &ActionPlan,
    current: &str,
    baseline: Option<&str>,
) -> Result<String> {
    let marker = comment_marker(&plan.config.title);

    let changed_files = if plan.config.filter_changed_files {
        Some(publisher.changed_files()?)
    } else {
        None
    };

    // The marker line counts against the comment size limit.
    let config = ReportConfig {
        max_chars: plan
            .config
            .max_chars
            .saturating_sub(marker.chars().count() + 1)
            .max(1),
        ..plan.config.clone()
    };
    let report = generate(
        &config,
        &ReportInputs {
            current,
            baseline,
            changed_files: changed_files.as_ref(),
        },
    )?;

    let mut out = String::new();
    writeln!(
        out,
        "Coverage: {:.2}% (link mode: {}{})",
        report.overall.line_percentage(),
        report.posted.link_mode,
        if report.posted.truncated { ", truncated" } else { "" },
    )
    .unwrap();

    if plan.delete_old_comments {
        publisher.delete_old_comments(&marker)?;
        writeln!(out, "Deleted previous comments").unwrap();
    }

    publisher.set_output("report", &report.full)?;

    if plan.post_to.posts_comment() {
        publisher.post_comment(&format!("{marker}\n{}", report.posted.text))?;
        writeln!(out, "Posted comment").unwrap();
    }
    if plan.post_to.writes_job_summary() {
        publisher.write_job_summary(&report.full)?;
        writeln!(out, "Wrote job summary").unwrap();
    }
    info!(post_to = %plan.post_to, "report published");

    Ok(out)
}

/// Read the baseline file if one was configured; a missing baseline is
/// ignored with a warning.
pub fn read_baseline(path: Option<&Path>) -> Option<String> {
    let path = path?;
    let text = crate::pipeline::read_lcov(path);
    if text.is_none() {
        warn!(path = %path.display(), "baseline coverage report not found, ignoring");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const CURRENT: &str = "SF:src/a.js\nDA:1,1\nDA:2,0\nend_of_record\nSF:src/b.js\nDA:1,1\nend_of_record\n";
    const BASELINE: &str = "SF:src/a.js\nDA:1,0\nDA:2,0\nend_of_record\n";

    #[derive(Default)]
    struct RecordingPublisher {
        changed: BTreeSet<String>,
        calls: RefCell<Vec<String>>,
        comments: RefCell<Vec<String>>,
        outputs: RefCell<Vec<(String, String)>>,
    }

    impl Publisher for RecordingPublisher {
        fn changed_files(&self) -> Result<BTreeSet<String>> {
            self.calls.borrow_mut().push("changed_files".into());
            Ok(self.changed.clone())
        }

        fn delete_old_comments(&self, marker: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("delete:{marker}"));
            Ok(())
        }

        fn post_comment(&self, body: &str) -> Result<()> {
            self.calls.borrow_mut().push("comment".into());
            self.comments.borrow_mut().push(body.to_string());
            Ok(())
        }

        fn write_job_summary(&self, _body: &str) -> Result<()> {
            self.calls.borrow_mut().push("summary".into());
            Ok(())
        }

        fn set_output(&self, name: &str, value: &str) -> Result<()> {
            self.outputs.borrow_mut().push((name.into(), value.into()));
            Ok(())
        }
    }

    #[test]
    fn test_cmd_report() {
        let out = cmd_report(&ReportConfig::default(), CURRENT, Some(BASELINE), None, false).unwrap();
        assert!(out.contains("## Coverage Report"));
        assert!(out.contains("| `src/a.js` | 50.00% | +50.00 |"));
        assert!(out.contains("| `src/b.js` | 100.00% | new |"));
    }

    #[test]
    fn test_cmd_summary_text() {
        let out = cmd_summary(&ReportConfig::default(), CURRENT, Some(BASELINE), None, false).unwrap();
        assert!(out.contains("Coverage:   66.67% (+66.67)"));
        assert!(out.contains("Lines:      2/3"));
        assert!(out.contains("src/a.js  50.00%  +50.00  uncovered: 2"));
    }

    #[test]
    fn test_cmd_summary_json_filtered() {
        let config = ReportConfig {
            filter_changed_files: true,
            ..Default::default()
        };
        let changed = BTreeSet::from(["src/b.js".to_string()]);
        let out = cmd_summary(&config, CURRENT, None, Some(&changed), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["line_percentage"], 100.0);
        assert_eq!(value["overall"]["lines_found"], 1);
        assert_eq!(value["delta"], serde_json::Value::Null);
        let files = value["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["path"], "src/b.js");
        assert_eq!(files[0]["new"], true);
        assert_eq!(files[0]["lines_hit"], 1);
    }

    #[test]
    fn test_resolve_action_inputs_defaults() {
        let plan = resolve_action_inputs(
            &ActionInputs {
                post_to: None,
                title: Some("   ".into()),
                ..Default::default()
            },
            Some("/home/runner/work/app/app"),
            None,
            CommitRefs::default(),
        )
        .unwrap();

        assert_eq!(plan.lcov_file, PathBuf::from("./").join("./coverage/lcov.info"));
        assert_eq!(plan.lcov_base, None);
        assert_eq!(plan.post_to, PostTarget::Comment);
        assert!(!plan.delete_old_comments);
        assert_eq!(plan.config.title, DEFAULT_TITLE);
        assert_eq!(plan.config.working_dir, None);
        assert_eq!(plan.config.link_mode, LinkMode::FilesAndLines);
        assert!(!plan.config.filter_changed_files);
        assert_eq!(
            plan.config.root_prefix.as_ref().map(|p| p.as_str()),
            Some("/home/runner/work/app/app/")
        );
    }

    #[test]
    fn test_resolve_action_inputs_explicit() {
        let plan = resolve_action_inputs(
            &ActionInputs {
                working_directory: Some("web".into()),
                lcov_file: Some("out/lcov.info".into()),
                lcov_base: Some("base/lcov.info".into()),
                filter_changed_files: Some("TRUE".into()),
                delete_old_comments: Some("true".into()),
                post_to: Some("".into()),
                title: Some("Web coverage".into()),
                create_links: Some("files-only".into()),
            },
            None,
            None,
            CommitRefs::default(),
        )
        .unwrap();

        assert_eq!(plan.lcov_file, PathBuf::from("web/out/lcov.info"));
        assert_eq!(plan.config.working_dir.as_deref(), Some("web"));
        assert_eq!(plan.lcov_base, Some(PathBuf::from("base/lcov.info")));
        assert_eq!(plan.post_to, PostTarget::Nowhere);
        assert!(plan.delete_old_comments);
        assert!(plan.config.filter_changed_files);
        assert_eq!(plan.config.link_mode, LinkMode::FilesOnly);
        assert_eq!(plan.config.title, "Web coverage");
        assert!(plan.config.root_prefix.is_none());
    }

    #[test]
    fn test_resolve_action_inputs_rejects_unknown_link_mode() {
        let inputs = ActionInputs {
            create_links: Some("sometimes".into()),
            ..Default::default()
        };
        assert!(resolve_action_inputs(&inputs, None, None, CommitRefs::default()).is_err());
    }

    #[test]
    fn test_unknown_post_target_skips_posting() {
        let inputs = ActionInputs {
            post_to: Some("slack".into()),
            ..Default::default()
        };
        let plan = resolve_action_inputs(&inputs, None, None, CommitRefs::default()).unwrap();
        assert_eq!(plan.post_to, PostTarget::Nowhere);

        let publisher = RecordingPublisher::default();
        cmd_github(&publisher, &plan, CURRENT, None).unwrap();
        assert!(publisher.calls.borrow().is_empty());
        assert_eq!(publisher.outputs.borrow().len(), 1);
    }

    #[test]
    fn test_cmd_github_working_directory() {
        let publisher = RecordingPublisher {
            changed: BTreeSet::from(["web/src/a.js".to_string()]),
            ..Default::default()
        };
        let plan = resolve_action_inputs(
            &ActionInputs {
                working_directory: Some("web".into()),
                filter_changed_files: Some("true".into()),
                ..Default::default()
            },
            Some("/home/runner/work/app/app"),
            Some(RepoIdentity::github("acme/app")),
            CommitRefs {
                commit: Some("abc1234".into()),
                ..Default::default()
            },
        )
        .unwrap();

        cmd_github(&publisher, &plan, "SF:src/a.js\nDA:1,0\nend_of_record\n", None).unwrap();

        let comments = publisher.comments.borrow();
        assert!(comments[0].contains("`src/a.js`"));
        assert!(!comments[0].contains("_No changed files with coverage data._"));
        let outputs = publisher.outputs.borrow();
        assert!(outputs[0]
            .1
            .contains("https://github.com/acme/app/blob/abc1234/web/src/a.js#L1"));
    }

    #[test]
    fn test_cmd_summary_matches_changed_files_in_working_dir() {
        let config = ReportConfig {
            filter_changed_files: true,
            working_dir: Some("web".into()),
            ..Default::default()
        };
        let changed = BTreeSet::from(["web/src/b.js".to_string()]);
        let out = cmd_summary(&config, CURRENT, None, Some(&changed), false).unwrap();
        assert!(out.contains("Lines:      1/1"));
        assert!(out.contains("src/b.js"));
        assert!(!out.contains("src/a.js"));
    }

    #[test]
    fn test_cmd_github_comment_and_summary() {
        let publisher = RecordingPublisher {
            changed: BTreeSet::from(["src/a.js".to_string()]),
            ..Default::default()
        };
        let plan = ActionPlan {
            lcov_file: PathBuf::from("coverage/lcov.info"),
            lcov_base: None,
            delete_old_comments: true,
            post_to: PostTarget::CommentAndJobSummary,
            config: ReportConfig {
                filter_changed_files: true,
                repository: Some(RepoIdentity::github("acme/app")),
                refs: CommitRefs {
                    commit: Some("abcdef0123".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
        };

        let out = cmd_github(&publisher, &plan, CURRENT, Some(BASELINE)).unwrap();
        assert!(out.contains("Coverage: 50.00%"));
        assert!(out.contains("Posted comment"));
        assert!(out.contains("Wrote job summary"));

        let calls = publisher.calls.borrow();
        assert_eq!(
            *calls,
            vec![
                "changed_files".to_string(),
                "delete:<!-- covdelta: Coverage Report -->".to_string(),
                "comment".to_string(),
                "summary".to_string(),
            ]
        );

        let comments = publisher.comments.borrow();
        assert!(comments[0].starts_with("<!-- covdelta: Coverage Report -->\n## Coverage Report"));
        assert!(comments[0].contains("src/a.js"));
        assert!(!comments[0].contains("`src/b.js`"));

        let outputs = publisher.outputs.borrow();
        assert_eq!(outputs[0].0, "report");
        assert!(outputs[0].1.contains("`src/b.js`"));
    }

    #[test]
    fn test_cmd_github_comment_fits_budget() {
        let publisher = RecordingPublisher::default();
        let plan = ActionPlan {
            lcov_file: PathBuf::from("coverage/lcov.info"),
            lcov_base: None,
            delete_old_comments: false,
            post_to: PostTarget::Comment,
            config: ReportConfig {
                max_chars: 120,
                ..Default::default()
            },
        };

        let out = cmd_github(&publisher, &plan, CURRENT, None).unwrap();
        assert!(out.contains("truncated"));
        let comments = publisher.comments.borrow();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].chars().count() <= 120);
        assert!(publisher.calls.borrow().iter().all(|c| !c.starts_with("delete")));
    }

    #[test]
    fn test_read_baseline() {
        assert!(read_baseline(None).is_none());
        let dir = tempfile::tempdir().unwrap();
        assert!(read_baseline(Some(&dir.path().join("missing.info"))).is_none());
    }
}
