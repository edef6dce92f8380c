//! uvs: encrypted version control for a working directory
//!
//! Repository commands:
//!   init                       - create `.uvs/` and derive the repository keys
//!   commit -m <msg>            - snapshot the working directory
//!   status                     - head, branch and working-directory state
//!   checkout <ref> [--keep]    - materialize a snapshot, branch or `head`
//!   branch <name> [--switch]   - create a branch at the head snapshot
//!   branches                   - list branches
//!   log [<ref>]                - walk history from a reference
//!   tree-id [<path>]           - compute a directory's tree id without storing
//!   dangling                   - snapshots no branch or head can reach
//!
//! Merge commands:
//!   merge <source>             - merge a branch into the current branch
//!   finalize-merge -m <msg>    - commit a prepared merge
//!   abort-merge                - drop a prepared merge

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uvs_core::{RepoLayout, SnapshotId, UvsConfig};
use uvs_repo::{Author, Diff3Tool, MergeEngine, MergeOutcome, Repository};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "uvs",
    version,
    about = "Encrypted version control",
    long_about = "uvs: snapshot, branch, checkout and merge a working directory whose history is stored only as ciphertext"
)]
struct Cli {
    /// Repository root (the directory holding `.uvs/`)
    #[arg(long, short = 'C', env = "UVS_REPO", default_value = ".")]
    repo: PathBuf,

    /// Settings file (default: <repo>/.uvs/config.toml)
    #[arg(long, short = 'c', env = "UVS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overriding `[log] level`
    #[arg(long)]
    log: Option<String>,

    /// Log format, overriding `[log] format`
    #[arg(long, value_parser = ["text", "json"])]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new repository in the repo directory
    Init,

    /// Record the working directory as a new snapshot
    Commit {
        /// Snapshot message
        #[arg(long, short = 'm')]
        message: String,

        #[command(flatten)]
        author: AuthorArgs,
    },

    /// Show head, branch and whether the working directory has changes
    Status,

    /// Replace the working directory with a snapshot
    Checkout {
        /// Snapshot id, branch name or `head`
        reference: String,

        /// Keep files that are not part of the snapshot
        #[arg(long)]
        keep: bool,
    },

    /// Create a branch at the head snapshot
    Branch {
        name: String,

        /// Make the new branch current
        #[arg(long)]
        switch: bool,
    },

    /// List branches and the snapshots they point at
    Branches,

    /// Show history reachable from a reference
    Log {
        /// Snapshot id, branch name or `head`
        #[arg(default_value = "head")]
        reference: String,
    },

    /// Merge a branch into the current branch
    Merge {
        /// Branch to merge from
        source: String,
    },

    /// Commit a prepared merge, replacing the working directory with its result
    FinalizeMerge {
        #[arg(long, short = 'm')]
        message: String,

        #[command(flatten)]
        author: AuthorArgs,
    },

    /// Discard a prepared merge
    AbortMerge,

    /// Compute the tree id of a directory without storing anything
    TreeId {
        /// Directory to hash (default: the repo root)
        path: Option<PathBuf>,
    },

    /// List snapshots not reachable from any branch or the head
    Dangling,
}

#[derive(Args, Debug)]
struct AuthorArgs {
    /// Author name
    #[arg(long, env = "UVS_AUTHOR_NAME", default_value = "uvs")]
    author: String,

    /// Author email
    #[arg(long, env = "UVS_AUTHOR_EMAIL", default_value = "uvs@localhost")]
    email: String,
}

impl AuthorArgs {
    fn to_author(&self) -> Author {
        Author::new(self.author.clone(), self.email.clone())
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let layout = RepoLayout::new(&cli.repo);
    let config_path = cli.config.clone().unwrap_or_else(|| layout.config_path());
    let mut settings = UvsConfig::load(&config_path)
        .with_context(|| format!("loading settings: {}", config_path.display()))?;

    if let Some(level) = &cli.log {
        settings.log.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        settings.log.format = format.clone();
    }
    init_logging(&settings.log.level, &settings.log.format);

    match &cli.command {
        Commands::Init => cmd_init(&cli.repo, &settings),
        Commands::Commit { message, author } => {
            let mut repo = open_repo(&cli.repo, &settings)?;
            cmd_commit(&mut repo, message, &author.to_author())
        }
        Commands::Status => cmd_status(&open_repo(&cli.repo, &settings)?),
        Commands::Checkout { reference, keep } => {
            let mut repo = open_repo(&cli.repo, &settings)?;
            let id = repo
                .checkout(reference, !keep)
                .with_context(|| format!("checking out '{reference}'"))?;
            println!("Checked out {} ({})", reference, id.short());
            println!("Head: {}", repo.head()?);
            Ok(())
        }
        Commands::Branch { name, switch } => {
            let mut repo = open_repo(&cli.repo, &settings)?;
            repo.create_branch(name, *switch)
                .with_context(|| format!("creating branch '{name}'"))?;
            if *switch {
                println!("Switched to new branch '{name}'");
            } else {
                println!("Created branch '{name}'");
            }
            Ok(())
        }
        Commands::Branches => cmd_branches(&open_repo(&cli.repo, &settings)?),
        Commands::Log { reference } => cmd_log(&open_repo(&cli.repo, &settings)?, reference),
        Commands::Merge { source } => {
            let mut repo = open_repo(&cli.repo, &settings)?;
            cmd_merge(&mut repo, &settings, source)
        }
        Commands::FinalizeMerge { message, author } => {
            let mut repo = open_repo(&cli.repo, &settings)?;
            let id = MergeEngine::new(&mut repo)
                .finalize_merge(message, &author.to_author())
                .context("finalizing merge")?;
            println!("Merge committed as {}", id.short());
            Ok(())
        }
        Commands::AbortMerge => {
            let mut repo = open_repo(&cli.repo, &settings)?;
            MergeEngine::new(&mut repo)
                .abort_merge()
                .context("aborting merge")?;
            println!("Merge aborted");
            Ok(())
        }
        Commands::TreeId { path } => {
            let repo = open_repo(&cli.repo, &settings)?;
            let target = path.clone().unwrap_or_else(|| cli.repo.clone());
            let id = repo
                .compute_tree_id(&target)
                .with_context(|| format!("hashing {}", target.display()))?;
            println!("{id}");
            Ok(())
        }
        Commands::Dangling => {
            let repo = open_repo(&cli.repo, &settings)?;
            for id in repo.dangling_snapshots()? {
                println!("{id}");
            }
            Ok(())
        }
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Password and repository access ────────────────────────────────────────────

/// `UVS_PASSWORD` if set, otherwise an interactive prompt.
fn read_password(confirm: bool) -> Result<SecretString> {
    if let Ok(password) = std::env::var("UVS_PASSWORD") {
        return Ok(SecretString::from(password));
    }
    let password =
        rpassword::prompt_password("Repository password: ").context("reading password")?;
    if password.is_empty() {
        bail!("empty password");
    }
    if confirm {
        let again =
            rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if again != password {
            bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(password))
}

fn open_repo(root: &Path, settings: &UvsConfig) -> Result<Repository> {
    let password = read_password(false)?;
    let spinner = make_spinner("open");
    spinner.set_message("deriving keys");
    let result = Repository::open(root, &password, settings);
    spinner.finish_and_clear();
    result.with_context(|| format!("opening repository at {}", root.display()))
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `uvs init` ────────────────────────────────────────────────────────────────

fn cmd_init(root: &Path, settings: &UvsConfig) -> Result<()> {
    std::fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    let password = read_password(true)?;

    let spinner = make_spinner("init");
    spinner.set_message("deriving keys");
    let result = Repository::init(root, &password, settings);
    spinner.finish_and_clear();
    let repo = result.with_context(|| format!("initializing repository at {}", root.display()))?;

    println!(
        "Initialized empty uvs repository in {}",
        repo.layout().internal_dir().display()
    );
    println!("  store:          {}", settings.store.backend);
    println!("  default branch: {}", settings.repository.default_branch);
    Ok(())
}

// ── `uvs commit` ──────────────────────────────────────────────────────────────

fn cmd_commit(repo: &mut Repository, message: &str, author: &Author) -> Result<()> {
    let spinner = make_spinner("commit");
    spinner.set_message("storing snapshot");
    let result = repo.take_snapshot(message, author);
    spinner.finish_and_clear();
    let id = result.context("taking snapshot")?;

    let head = repo.head()?;
    let place = head.branch().unwrap_or("detached");
    println!("[{} {}] {}", place, id.short(), message);
    Ok(())
}

// ── `uvs status` ──────────────────────────────────────────────────────────────

fn cmd_status(repo: &Repository) -> Result<()> {
    let status = repo.status().context("computing status")?;
    println!("Head:      {}", status.head);
    match &status.head_snapshot {
        Some(id) => println!("Snapshot:  {id}"),
        None => println!("Snapshot:  (none yet)"),
    }
    println!("Tree:      {}", status.root_tree_id);
    println!(
        "Working:   {}",
        if status.dirty { "modified" } else { "clean" }
    );
    if status.merge_pending {
        println!(
            "Merge:     pending, result in {}",
            repo.layout().merge_result_dir().display()
        );
    }
    Ok(())
}

// ── `uvs branches` ────────────────────────────────────────────────────────────

fn cmd_branches(repo: &Repository) -> Result<()> {
    let head = repo.head()?;
    let branches = repo.branches()?;
    if branches.is_empty() {
        if let Some(name) = head.branch() {
            println!("* {name} (no snapshots yet)");
        }
        return Ok(());
    }
    for (name, id) in &branches {
        let marker = if head.is_attached_to(name) { "*" } else { " " };
        println!("{marker} {name:<20} {}", id.short());
    }
    Ok(())
}

// ── `uvs log` ─────────────────────────────────────────────────────────────────

fn cmd_log(repo: &Repository, reference: &str) -> Result<()> {
    let entries = repo
        .log(reference)
        .with_context(|| format!("reading history of '{reference}'"))?;
    for (id, record) in entries {
        println!("snapshot {id}");
        if record.parents.len() > 1 {
            let parents: Vec<&str> = record.parents.iter().map(SnapshotId::short).collect();
            println!("Merge:  {}", parents.join(" "));
        }
        println!("Author: {}", record.author);
        println!("Date:   {} (unix)", record.created_at);
        println!();
        for line in record.message.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}

// ── `uvs merge` ───────────────────────────────────────────────────────────────

fn cmd_merge(repo: &mut Repository, settings: &UvsConfig, source: &str) -> Result<()> {
    let head = repo.head()?;
    let Some(current) = head.branch().map(str::to_string) else {
        bail!("head is detached; check out the branch to merge into first");
    };

    let spinner = make_spinner("merge");
    spinner.set_message(format!("{source} into {current}"));
    let result = MergeEngine::with_merger(repo, Diff3Tool::from_settings(&settings.merge))
        .merge(&current, source);
    spinner.finish_and_clear();
    let outcome = result.with_context(|| format!("merging '{source}' into '{current}'"))?;

    match outcome {
        MergeOutcome::UpToDate => println!("Already up to date"),
        MergeOutcome::FastForward { from, to } => {
            println!("Fast-forward {current}: {} -> {}", from.short(), to.short());
        }
        MergeOutcome::Merged(report) => {
            println!("Merge base: {}", report.base.short());
            println!("Result:     {}", report.result_dir.display());
            for path in &report.conflicted_paths {
                println!("  conflict: {}", path.display());
            }
            for path in &report.troubled_paths {
                println!("  trouble:  {}", path.display());
            }
            if report.is_clean() {
                println!("Merged cleanly; run `uvs finalize-merge -m <msg>` to commit");
            } else {
                println!(
                    "Resolve the paths above in the result directory, then run \
                     `uvs finalize-merge -m <msg>` or `uvs abort-merge`"
                );
            }
        }
    }
    Ok(())
}
