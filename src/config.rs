//! Explicit configuration handed to the pipeline and the renderer. Nothing
//! in the core reads the environment; the CLI resolves inputs into a
//! `ReportConfig` once and passes it down.

use crate::error::{CovdeltaError, Result};
use crate::model::MergePolicy;
use crate::parsers::RootPrefix;
use crate::report::{LinkMode, RenderOptions};

/// Maximum number of characters a posted comment may contain.
pub const MAX_COMMENT_CHARS: usize = 65536;

pub const DEFAULT_TITLE: &str = "Coverage Report";

/// The hosting repository, used to build source links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentity {
    /// e.g. `https://github.com`
    pub server_url: String,
    /// `owner/name`
    pub full_name: String,
}

impl RepoIdentity {
    pub fn github(full_name: impl Into<String>) -> Self {
        Self {
            server_url: "https://github.com".to_string(),
            full_name: full_name.into(),
        }
    }

    /// Source view of `path` at `commit`. Path segments are percent-encoded
    /// so the URL survives as a Markdown link target.
    pub fn blob_url(&self, commit: &str, path: &str) -> String {
        let server = self.server_url.trim_end_matches('/');
        let path = path
            .trim_start_matches('/')
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        format!("{server}/{}/blob/{commit}/{path}", self.full_name)
    }
}

/// Normalize a package directory given relative to the repository root.
/// `None` for the root itself (`""`, `.`, `./`).
pub fn normalize_working_dir(dir: &str) -> Option<String> {
    let mut dir = dir.trim().replace('\\', "/");
    while let Some(rest) = dir.strip_prefix("./") {
        dir = rest.to_string();
    }
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        None
    } else {
        Some(dir.to_string())
    }
}

/// Repository-relative path of a record path. Relative record paths are
/// taken to be inside `working_dir`; absolute ones are left alone.
pub fn repo_path(working_dir: Option<&str>, path: &str) -> String {
    match working_dir {
        Some(dir) if !path.starts_with('/') => format!("{dir}/{path}"),
        _ => path.to_string(),
    }
}

/// Revisions the report describes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRefs {
    /// Head commit SHA; link target for source views.
    pub commit: Option<String>,
    pub base_commit: Option<String>,
    /// Head branch/ref name.
    pub head: Option<String>,
    /// Base branch/ref name.
    pub base: Option<String>,
}

/// Where the `github` command publishes the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostTarget {
    #[default]
    Comment,
    CommentAndJobSummary,
    JobSummary,
    Nowhere,
}

impl PostTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostTarget::Comment => "comment",
            PostTarget::CommentAndJobSummary => "comment-and-job-summary",
            PostTarget::JobSummary => "job-summary",
            PostTarget::Nowhere => "",
        }
    }

    pub fn posts_comment(&self) -> bool {
        matches!(self, PostTarget::Comment | PostTarget::CommentAndJobSummary)
    }

    pub fn writes_job_summary(&self) -> bool {
        matches!(self, PostTarget::JobSummary | PostTarget::CommentAndJobSummary)
    }
}

impl std::str::FromStr for PostTarget {
    type Err = CovdeltaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "comment" => Ok(PostTarget::Comment),
            "comment-and-job-summary" => Ok(PostTarget::CommentAndJobSummary),
            "job-summary" => Ok(PostTarget::JobSummary),
            "" | "none" => Ok(PostTarget::Nowhere),
            _ => Err(CovdeltaError::UnknownPostTarget(s.to_string())),
        }
    }
}

impl std::fmt::Display for PostTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the pipeline needs besides the LCOV text itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub title: String,
    /// Richest link mode to try; cheaper modes are used when the report
    /// would not fit in `max_chars`.
    pub link_mode: LinkMode,
    pub filter_changed_files: bool,
    pub root_prefix: Option<RootPrefix>,
    /// Package directory inside the repository that relative LCOV paths
    /// are relative to. Used for links and changed-file matching.
    pub working_dir: Option<String>,
    pub repository: Option<RepoIdentity>,
    pub refs: CommitRefs,
    pub max_chars: usize,
    pub merge_policy: MergePolicy,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            link_mode: LinkMode::FilesAndLines,
            filter_changed_files: false,
            root_prefix: None,
            working_dir: None,
            repository: None,
            refs: CommitRefs::default(),
            max_chars: MAX_COMMENT_CHARS,
            merge_policy: MergePolicy::Max,
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CovdeltaError::Config("title must not be empty".into()));
        }
        if self.max_chars == 0 {
            return Err(CovdeltaError::Config(
                "character budget must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Renderer options at a given link mode.
    pub fn render_options(&self, link_mode: LinkMode, filter_changed_files: bool) -> RenderOptions<'_> {
        RenderOptions {
            title: &self.title,
            link_mode,
            filter_changed_files,
            repository: self.repository.as_ref(),
            refs: &self.refs,
            working_dir: self.working_dir.as_deref(),
        }
    }
}
