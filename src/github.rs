//! GitHub API helpers for publishing coverage reports from GitHub Actions:
//! pull request and commit comments, job summaries and step outputs.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{CommitRefs, RepoIdentity};

const USER_AGENT: &str = "covdelta";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

/// Hidden marker identifying comments posted for a report title, so later
/// runs can find and delete them.
pub fn comment_marker(title: &str) -> String {
    // "--" would terminate the HTML comment early.
    format!("<!-- covdelta: {} -->", title.replace("--", "- -"))
}

/// The workflow event the report is produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PullRequest {
        number: u64,
        head_sha: String,
        base_sha: String,
        head_ref: String,
        base_ref: String,
    },
    Push {
        before: String,
        after: String,
        git_ref: String,
    },
    /// Any other event; reports can be rendered but not posted as comments.
    Other(String),
}

#[derive(Deserialize)]
struct PullRequestPayload {
    pull_request: PullRequest,
}

#[derive(Deserialize)]
struct PullRequest {
    number: u64,
    head: GitRef,
    base: GitRef,
}

#[derive(Deserialize)]
struct GitRef {
    sha: String,
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Deserialize)]
struct PushPayload {
    before: String,
    after: String,
    #[serde(rename = "ref")]
    git_ref: String,
}

impl Event {
    /// Interpret the event payload (the JSON file at `GITHUB_EVENT_PATH`).
    pub fn from_payload(event_name: &str, payload: &str) -> Result<Self> {
        match event_name {
            "pull_request" | "pull_request_target" => {
                let p: PullRequestPayload =
                    serde_json::from_str(payload).context("Failed to parse pull_request payload")?;
                Ok(Event::PullRequest {
                    number: p.pull_request.number,
                    head_sha: p.pull_request.head.sha,
                    base_sha: p.pull_request.base.sha,
                    head_ref: p.pull_request.head.git_ref,
                    base_ref: p.pull_request.base.git_ref,
                })
            }
            "push" => {
                let p: PushPayload =
                    serde_json::from_str(payload).context("Failed to parse push payload")?;
                Ok(Event::Push {
                    before: p.before,
                    after: p.after,
                    git_ref: p.git_ref,
                })
            }
            other => Ok(Event::Other(other.to_string())),
        }
    }

    pub fn commit_refs(&self) -> CommitRefs {
        match self {
            Event::PullRequest {
                head_sha,
                base_sha,
                head_ref,
                base_ref,
                ..
            } => CommitRefs {
                commit: Some(head_sha.clone()),
                base_commit: Some(base_sha.clone()),
                head: Some(head_ref.clone()),
                base: Some(base_ref.clone()),
            },
            Event::Push {
                before,
                after,
                git_ref,
            } => CommitRefs {
                commit: Some(after.clone()),
                base_commit: Some(before.clone()),
                head: Some(git_ref.clone()),
                base: None,
            },
            Event::Other(_) => CommitRefs::default(),
        }
    }
}

#[derive(Deserialize)]
struct Comment {
    id: u64,
    body: Option<String>,
}

#[derive(Deserialize)]
struct ChangedFile {
    filename: String,
    status: String,
}

#[derive(Deserialize)]
struct Comparison {
    #[serde(default)]
    files: Vec<ChangedFile>,
}

/// Resolved GitHub Actions context, read from environment variables.
pub struct Context {
    token: String,
    repo: String,
    api_url: String,
    server_url: String,
    pub event: Event,
    /// `GITHUB_WORKSPACE`, the checkout root LCOV paths are relative to.
    pub workspace: Option<String>,
}

impl Context {
    /// Build a context from the standard GitHub Actions environment
    /// (`GITHUB_REPOSITORY`, `GITHUB_EVENT_NAME`, `GITHUB_EVENT_PATH`, ...).
    /// `token` falls back to `GITHUB_TOKEN`.
    pub fn from_env(token: Option<String>) -> Result<Self> {
        let token = match token.filter(|t| !t.is_empty()) {
            Some(t) => t,
            None => std::env::var("GITHUB_TOKEN")
                .context("a GitHub token is required (github-token input or GITHUB_TOKEN)")?,
        };
        let repo = std::env::var("GITHUB_REPOSITORY")
            .context("GITHUB_REPOSITORY environment variable is required")?;
        let event_name = std::env::var("GITHUB_EVENT_NAME")
            .context("GITHUB_EVENT_NAME environment variable is required")?;
        let event_path = std::env::var("GITHUB_EVENT_PATH")
            .context("GITHUB_EVENT_PATH environment variable is required")?;
        let payload = std::fs::read_to_string(&event_path)
            .with_context(|| format!("Failed to read event payload at {event_path}"))?;
        let event = Event::from_payload(&event_name, &payload)?;

        Ok(Self {
            token,
            repo,
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            server_url: std::env::var("GITHUB_SERVER_URL")
                .unwrap_or_else(|_| "https://github.com".to_string()),
            event,
            workspace: std::env::var("GITHUB_WORKSPACE").ok(),
        })
    }

    pub fn repository(&self) -> RepoIdentity {
        RepoIdentity {
            server_url: self.server_url.clone(),
            full_name: self.repo.clone(),
        }
    }

    pub fn commit_refs(&self) -> CommitRefs {
        self.event.commit_refs()
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        ureq::request(method, url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", USER_AGENT)
            .set("X-GitHub-Api-Version", API_VERSION)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .request("GET", url)
            .call()
            .with_context(|| format!("GitHub API request failed: GET {url}"))?;
        resp.into_json().context("Failed to parse GitHub API response")
    }

    /// Files added or modified by the pull request or push. Removed files
    /// are left out.
    pub fn changed_files(&self) -> Result<BTreeSet<String>> {
        let files: Vec<ChangedFile> = match &self.event {
            Event::PullRequest { number, .. } => {
                let mut all = Vec::new();
                let mut page = 1u32;
                loop {
                    let url = format!(
                        "{}/repos/{}/pulls/{}/files?per_page={PER_PAGE}&page={page}",
                        self.api_url, self.repo, number
                    );
                    let batch: Vec<ChangedFile> = self.get_json(&url)?;
                    let done = batch.len() < PER_PAGE;
                    all.extend(batch);
                    if done {
                        break;
                    }
                    page += 1;
                }
                all
            }
            Event::Push { before, after, .. } => {
                let url = format!(
                    "{}/repos/{}/compare/{before}...{after}",
                    self.api_url, self.repo
                );
                let comparison: Comparison = self.get_json(&url)?;
                comparison.files
            }
            Event::Other(name) => bail!("cannot list changed files for '{name}' events"),
        };

        let changed: BTreeSet<String> = files
            .into_iter()
            .filter(|f| f.status != "removed")
            .map(|f| f.filename)
            .collect();
        info!(count = changed.len(), "fetched changed files");
        Ok(changed)
    }

    /// Delete earlier comments carrying `marker` on the pull request or
    /// commit.
    pub fn delete_old_comments(&self, marker: &str) -> Result<()> {
        let (list_url, delete_base) = match &self.event {
            Event::PullRequest { number, .. } => (
                format!("{}/repos/{}/issues/{number}/comments", self.api_url, self.repo),
                format!("{}/repos/{}/issues/comments", self.api_url, self.repo),
            ),
            Event::Push { after, .. } => (
                format!("{}/repos/{}/commits/{after}/comments", self.api_url, self.repo),
                format!("{}/repos/{}/comments", self.api_url, self.repo),
            ),
            Event::Other(name) => {
                warn!(event = %name, "no comments to delete for this event");
                return Ok(());
            }
        };

        let mut stale = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!("{list_url}?per_page={PER_PAGE}&page={page}");
            let comments: Vec<Comment> = self.get_json(&url)?;
            let done = comments.len() < PER_PAGE;
            stale.extend(
                comments
                    .into_iter()
                    .filter(|c| c.body.as_deref().is_some_and(|b| b.contains(marker)))
                    .map(|c| c.id),
            );
            if done {
                break;
            }
            page += 1;
        }

        for id in stale {
            debug!(id, "deleting old comment");
            self.request("DELETE", &format!("{delete_base}/{id}"))
                .call()
                .with_context(|| format!("Failed to delete comment {id}"))?;
        }
        Ok(())
    }

    /// Post `body` as a pull request comment (pull_request events) or a
    /// commit comment (push events).
    pub fn post_comment(&self, body: &str) -> Result<()> {
        let url = match &self.event {
            Event::PullRequest { number, .. } => {
                format!("{}/repos/{}/issues/{number}/comments", self.api_url, self.repo)
            }
            Event::Push { after, .. } => {
                format!("{}/repos/{}/commits/{after}/comments", self.api_url, self.repo)
            }
            Event::Other(name) => {
                warn!(event = %name, "comments are only posted for pull_request and push events");
                return Ok(());
            }
        };

        let resp = self
            .request("POST", &url)
            .send_json(serde_json::json!({ "body": body }));
        match resp {
            Ok(_) => {}
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                bail!("GitHub API error creating comment (HTTP {code}): {body}");
            }
            Err(e) => bail!("Failed to create comment: {e}"),
        }
        info!(repo = %self.repo, "comment posted");
        Ok(())
    }
}

/// Append `body` to the job summary file named by `GITHUB_STEP_SUMMARY`.
pub fn write_job_summary(body: &str) -> crate::error::Result<()> {
    match std::env::var_os("GITHUB_STEP_SUMMARY") {
        Some(path) => append_job_summary(Path::new(&path), body),
        None => {
            warn!("GITHUB_STEP_SUMMARY is not set, skipping job summary");
            Ok(())
        }
    }
}

pub fn append_job_summary(path: &Path, body: &str) -> crate::error::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{body}")?;
    Ok(())
}

/// Export a step output through the file named by `GITHUB_OUTPUT`.
pub fn set_output(name: &str, value: &str) -> crate::error::Result<()> {
    match std::env::var_os("GITHUB_OUTPUT") {
        Some(path) => append_output(Path::new(&path), name, value),
        None => {
            warn!(name, "GITHUB_OUTPUT is not set, skipping step output");
            Ok(())
        }
    }
}

/// Multi-line outputs use the `name<<DELIMITER` form; the delimiter must
/// not occur in the value.
pub fn append_output(path: &Path, name: &str, value: &str) -> crate::error::Result<()> {
    let mut delimiter = String::from("COVDELTA_EOF");
    let mut n = 0u32;
    while value.contains(&delimiter) {
        n += 1;
        delimiter = format!("COVDELTA_EOF_{n}");
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{name}<<{delimiter}\n{value}\n{delimiter}")?;
    Ok(())
}
