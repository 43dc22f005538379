/// Sources for the set of files touched by the change under review, used by
/// the changed-file filter.
///
/// A source yields repository-relative paths with forward slashes. Deleted
/// files are never part of the set.
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};

use crate::github;

/// A source for the changed-files set.
pub trait ChangedFilesSource {
    /// Fetch the changed paths.
    fn changed_files(&self) -> Result<BTreeSet<String>>;
}

/// Paths read from a file, or from stdin when the path is `-`. Accepts
/// either one path per line or a unified diff.
pub struct FileListSource {
    pub path: PathBuf,
}

impl ChangedFilesSource for FileListSource {
    fn changed_files(&self) -> Result<BTreeSet<String>> {
        let text = if self.path.as_os_str() == "-" {
            std::io::read_to_string(std::io::stdin()).context("Failed to read changed files from stdin")?
        } else {
            std::fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read changed files from {}", self.path.display()))?
        };
        Ok(parse_changed_files(&text))
    }
}

/// Changed files from `git diff --name-only` (e.g. `main...HEAD`).
pub struct GitSource {
    /// Arguments to pass to `git diff`.
    pub args: String,
}

impl ChangedFilesSource for GitSource {
    fn changed_files(&self) -> Result<BTreeSet<String>> {
        let diff_args: Vec<&str> = self.args.split_whitespace().collect();
        let output = Command::new("git")
            .arg("diff")
            .arg("--name-only")
            .arg("--diff-filter=d")
            .args(&diff_args)
            .output()
            .context("Failed to run git diff")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git diff failed: {stderr}");
        }

        let stdout = String::from_utf8(output.stdout).context("git diff output not valid UTF-8")?;
        Ok(parse_name_list(&stdout))
    }
}

/// Changed files of the current pull request or push, from the GitHub API.
pub struct GitHubSource<'a> {
    pub context: &'a github::Context,
}

impl ChangedFilesSource for GitHubSource<'_> {
    fn changed_files(&self) -> Result<BTreeSet<String>> {
        self.context.changed_files()
    }
}

/// Parse either a unified diff or a plain newline-separated path list.
pub fn parse_changed_files(text: &str) -> BTreeSet<String> {
    if text.lines().any(|l| l.starts_with("+++ ")) {
        parse_unified_diff(text)
    } else {
        parse_name_list(text)
    }
}

/// One path per line; blank lines are skipped.
pub fn parse_name_list(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.replace('\\', "/"))
        .collect()
}

/// Files named by the `+++` headers of a unified diff. Deleted files
/// (`+++ /dev/null`) are skipped.
pub fn parse_unified_diff(diff_text: &str) -> BTreeSet<String> {
    diff_text
        .lines()
        .filter_map(|line| line.strip_prefix("+++ "))
        .filter(|rest| *rest != "/dev/null")
        .map(|rest| {
            // Drop a trailing tab-separated timestamp, then the VCS prefix.
            let rest = rest.split('\t').next().unwrap_or(rest);
            rest.strip_prefix("b/")
                .or_else(|| rest.strip_prefix("a/"))
                .unwrap_or(rest)
                .to_string()
        })
        .collect()
}
