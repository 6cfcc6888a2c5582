//! Command-line front end.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::diff::DEFAULT_CONTEXT;
use crate::repository::{RepoConfig, RepoResult, Repository, StatusReport};
use crate::storage::RepoPath;

/// sbac - snapshot-based version control for a single working tree
#[derive(Debug, Parser)]
#[command(name = "sbac")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Repository root
    #[arg(long, global = true, env = "SBAC_REPO", default_value = ".")]
    pub repo: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log every storage operation to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init {
        /// Directory to initialize (defaults to --repo)
        path: Option<PathBuf>,
    },
    /// Stage files for the next commit
    Add {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Show staged, modified and untracked files
    Status,
    /// Show line changes of tracked files
    Diff {
        /// Only this file
        file: Option<String>,
        /// Lines of context around each change
        #[arg(short = 'U', long, default_value_t = DEFAULT_CONTEXT)]
        context: usize,
    },
    /// Record the staged files as a new commit
    Commit { message: String },
    /// List commits, newest first
    History {
        /// Maximum number of commits to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Name the current head
    Baseline { name: String },
    /// List every baseline
    ListBaselines,
    /// Restore the files of a baseline or commit
    Checkout {
        /// Baseline name, commit id or unique id prefix
        version: String,
    },
}

/// install the stderr subscriber; `RUST_LOG` wins unless `--verbose` is set
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Run a parsed command line and map the outcome to an exit code.
pub fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match execute(&cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_reported() => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("fatal: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Execute one command, writing its output to `out`.
pub fn execute(cli: &Cli, out: &mut dyn Write) -> RepoResult<()> {
    if let Command::Init { path } = &cli.command {
        let root = path.clone().unwrap_or_else(|| cli.repo.clone());
        let mut repo = Repository::open_with_config(RepoConfig::new(root))?;
        repo.init()?;
        let meta = repo.config().meta_path();
        return emit(out, cli.json, &InitOutput { path: &meta }, |out| {
            writeln!(out, "Initialized empty repository in {}", meta.display())
        });
    }

    let repo = Repository::open_with_config(RepoConfig::new(&cli.repo))?;
    match &cli.command {
        Command::Init { .. } => Ok(()),
        Command::Add { files } => {
            let added = repo.add_all(files)?;
            emit(out, cli.json, &added, |out| {
                for file in &added {
                    writeln!(out, "added {} ({})", file.path, file.last_hash.short())?;
                }
                Ok(())
            })
        }
        Command::Status => {
            let status = repo.status()?;
            emit(out, cli.json, &status, |out| write_status(out, &status))
        }
        Command::Diff { file, context } => {
            let diffs = repo.diff(file.as_deref())?;
            emit(out, cli.json, &diffs, |out| {
                for diff in &diffs {
                    write!(out, "{}", diff.render(*context))?;
                }
                Ok(())
            })
        }
        Command::Commit { message } => {
            let commit = repo.commit(message)?;
            emit(out, cli.json, &commit, |out| {
                writeln!(out, "[{}] {}", commit.id.short(), commit.summary())
            })
        }
        Command::History { limit } => {
            let commits = repo.history(*limit)?;
            emit(out, cli.json, &commits, |out| {
                if commits.is_empty() {
                    return writeln!(out, "no commits yet");
                }
                for commit in &commits {
                    writeln!(
                        out,
                        "{}  {}  {}",
                        commit.id.short(),
                        commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        commit.summary()
                    )?;
                }
                Ok(())
            })
        }
        Command::Baseline { name } => {
            let baseline = repo.baseline(name)?;
            emit(out, cli.json, &baseline, |out| {
                writeln!(
                    out,
                    "baseline '{}' -> {} {}",
                    baseline.name,
                    baseline.commit_id.short(),
                    baseline.message
                )
            })
        }
        Command::ListBaselines => {
            let baselines = repo.list_baselines()?;
            emit(out, cli.json, &baselines, |out| {
                for baseline in &baselines {
                    writeln!(
                        out,
                        "{}\t{}\t{}",
                        baseline.name,
                        baseline.commit_id.short(),
                        baseline.message
                    )?;
                }
                Ok(())
            })
        }
        Command::Checkout { version } => {
            let report = repo.checkout(version)?;
            emit(out, cli.json, &report, |out| {
                writeln!(
                    out,
                    "checked out {} ({} file(s) restored)",
                    report.commit.id.short(),
                    report.restored.len()
                )
            })
        }
    }
}

#[derive(Serialize)]
struct InitOutput<'a> {
    path: &'a std::path::Path,
}

/// write `value` as JSON, or run the text renderer
fn emit<T, F>(out: &mut dyn Write, json: bool, value: &T, text: F) -> RepoResult<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    if json {
        serde_json::to_writer_pretty(&mut *out, value).map_err(io::Error::from)?;
        writeln!(out)?;
    } else {
        text(out)?;
    }
    Ok(())
}

fn write_status(out: &mut dyn Write, status: &StatusReport) -> io::Result<()> {
    if status.is_clean() {
        return writeln!(out, "nothing to commit, working tree clean");
    }
    let sections: [(&str, &[RepoPath]); 3] = [
        ("Staged", &status.staged),
        ("Modified", &status.modified),
        ("Untracked", &status.untracked),
    ];
    for (title, paths) in sections {
        if paths.is_empty() {
            continue;
        }
        writeln!(out, "{}:", title)?;
        for path in paths {
            writeln!(out, "  {}", path)?;
        }
    }
    Ok(())
}
