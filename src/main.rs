use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use covdelta::changes::{ChangedFilesSource, FileListSource, GitSource};
use covdelta::cli::{self, ActionInputs};
use covdelta::config::{
    normalize_working_dir, CommitRefs, RepoIdentity, ReportConfig, DEFAULT_TITLE, MAX_COMMENT_CHARS,
};
use covdelta::model::MergePolicy;
use covdelta::parsers::RootPrefix;
use covdelta::report::LinkMode;
use covdelta::{github, logging, pipeline};

/// covdelta — LCOV coverage reports with baseline deltas for pull requests.
#[derive(Parser)]
#[command(name = "covdelta", version, about)]
struct Cli {
    /// Log level used when COVDELTA_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the Markdown report to stdout.
    Report {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        render: RenderArgs,

        /// Print the full report (all files, all links, no size limit).
        #[arg(long)]
        full: bool,
    },

    /// Print coverage totals and per-file rates.
    Summary {
        #[command(flatten)]
        input: InputArgs,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Run as a GitHub Action: read `INPUT_*` variables, post the report.
    Github(GithubArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Current LCOV file.
    #[arg(long, default_value = "coverage/lcov.info")]
    lcov_file: PathBuf,

    /// Baseline LCOV file to compare against.
    #[arg(long)]
    lcov_base: Option<PathBuf>,

    /// Prefix stripped from LCOV source paths, usually the checkout root.
    #[arg(long)]
    root_prefix: Option<String>,

    /// Package directory inside the repository that relative LCOV paths
    /// are relative to; used for links and changed-file matching.
    #[arg(long)]
    working_dir: Option<String>,

    /// Changed paths, one per line or as a unified diff. `-` reads stdin.
    #[arg(long, conflicts_with = "git_diff")]
    changed_files: Option<PathBuf>,

    /// Git diff arguments used to find changed files, e.g. "main...HEAD".
    #[arg(long)]
    git_diff: Option<String>,

    /// Restrict totals and rows to changed files.
    #[arg(long)]
    filter_changed_files: bool,

    /// How duplicate records for one file combine (max, sum).
    #[arg(long, default_value = "max")]
    merge_policy: MergePolicy,
}

#[derive(Args)]
struct RenderArgs {
    /// Report heading.
    #[arg(long, default_value = DEFAULT_TITLE)]
    title: String,

    /// Link detail (files-and-lines, files-only, none).
    #[arg(long, default_value = "files-and-lines")]
    link_mode: LinkMode,

    /// Repository as owner/name, used for links.
    #[arg(long)]
    repository: Option<String>,

    #[arg(long, default_value = "https://github.com")]
    server_url: String,

    /// Commit the links point at.
    #[arg(long)]
    commit: Option<String>,

    /// Head ref name, shown in the headline.
    #[arg(long)]
    head: Option<String>,

    /// Base ref name, shown in the headline.
    #[arg(long)]
    base: Option<String>,

    /// Character budget for the size-limited report.
    #[arg(long, default_value_t = MAX_COMMENT_CHARS)]
    max_chars: usize,
}

#[derive(Args)]
struct GithubArgs {
    #[arg(long, env = "INPUT_GITHUB-TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, env = "INPUT_WORKING-DIRECTORY")]
    working_directory: Option<String>,

    #[arg(long, env = "INPUT_LCOV-FILE")]
    lcov_file: Option<String>,

    #[arg(long, env = "INPUT_LCOV-BASE")]
    lcov_base: Option<String>,

    #[arg(long, env = "INPUT_FILTER-CHANGED-FILES")]
    filter_changed_files: Option<String>,

    #[arg(long, env = "INPUT_DELETE-OLD-COMMENTS")]
    delete_old_comments: Option<String>,

    /// comment, comment-and-job-summary, job-summary, or empty for none.
    #[arg(long, env = "INPUT_POST-TO")]
    post_to: Option<String>,

    #[arg(long, env = "INPUT_TITLE")]
    title: Option<String>,

    /// auto, files-and-lines, files-only, none.
    #[arg(long, env = "INPUT_CREATE-LINKS")]
    create_links: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    logging::init_logging(&args.log_level);

    match args.command {
        Commands::Report {
            input,
            render,
            full,
        } => {
            let config = report_config(&input, Some(&render));
            let (current, baseline, changed) = load_inputs(&input)?;
            print!(
                "{}",
                cli::cmd_report(&config, &current, baseline.as_deref(), changed.as_ref(), full)?
            );
            Ok(())
        }
        Commands::Summary { input, json } => {
            let config = report_config(&input, None);
            let (current, baseline, changed) = load_inputs(&input)?;
            print!(
                "{}",
                cli::cmd_summary(&config, &current, baseline.as_deref(), changed.as_ref(), json)?
            );
            Ok(())
        }
        Commands::Github(args) => run_github(args),
    }
}

fn report_config(input: &InputArgs, render: Option<&RenderArgs>) -> ReportConfig {
    let mut config = ReportConfig {
        filter_changed_files: input.filter_changed_files,
        root_prefix: input.root_prefix.as_deref().and_then(RootPrefix::new),
        working_dir: input.working_dir.as_deref().and_then(normalize_working_dir),
        merge_policy: input.merge_policy,
        ..Default::default()
    };
    if let Some(render) = render {
        config.title = render.title.clone();
        config.link_mode = render.link_mode;
        config.max_chars = render.max_chars;
        config.repository = render.repository.as_ref().map(|name| RepoIdentity {
            server_url: render.server_url.trim_end_matches('/').to_string(),
            full_name: name.clone(),
        });
        config.refs = CommitRefs {
            commit: render.commit.clone(),
            base_commit: None,
            head: render.head.clone(),
            base: render.base.clone(),
        };
    }
    config
}

type LoadedInputs = (String, Option<String>, Option<BTreeSet<String>>);

fn load_inputs(input: &InputArgs) -> Result<LoadedInputs> {
    let current = pipeline::read_lcov(&input.lcov_file)
        .with_context(|| format!("No coverage report found at {}", input.lcov_file.display()))?;
    let baseline = cli::read_baseline(input.lcov_base.as_deref());

    let changed = if let Some(path) = &input.changed_files {
        Some(FileListSource { path: path.clone() }.changed_files()?)
    } else if let Some(args) = &input.git_diff {
        Some(GitSource { args: args.clone() }.changed_files()?)
    } else {
        None
    };

    Ok((current, baseline, changed))
}

fn run_github(args: GithubArgs) -> Result<()> {
    let context = github::Context::from_env(args.github_token)?;
    let plan = cli::resolve_action_inputs(
        &ActionInputs {
            working_directory: args.working_directory,
            lcov_file: args.lcov_file,
            lcov_base: args.lcov_base,
            filter_changed_files: args.filter_changed_files,
            delete_old_comments: args.delete_old_comments,
            post_to: args.post_to,
            title: args.title,
            create_links: args.create_links,
        },
        context.workspace.as_deref(),
        Some(context.repository()),
        context.commit_refs(),
    )?;

    let Some(current) = pipeline::read_lcov(&plan.lcov_file) else {
        info!(path = %plan.lcov_file.display(), "no coverage report found, exiting");
        return Ok(());
    };
    let baseline = cli::read_baseline(plan.lcov_base.as_deref());

    eprint!(
        "{}",
        cli::cmd_github(&context, &plan, &current, baseline.as_deref())?
    );
    Ok(())
}
