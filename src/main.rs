//! CLI entry point for `maildir-restore`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use maildir_restore::archive::metadata::{load_index, MetadataDir};
use maildir_restore::archive::name::group_backup_sets;
use maildir_restore::archive::tool::ArchiveTool;
use maildir_restore::config::{self, Config, Filters};
use maildir_restore::error::RestoreError;
use maildir_restore::index::MetadataIndex;
use maildir_restore::model::batch::RestoreBatch;
use maildir_restore::planner;
use maildir_restore::restore::progress::{ProgressReporter, ProgressTick};
use maildir_restore::restore::summary::RestoreSummary;
use maildir_restore::restore::{self, JobEvent, JobObserver, RunHooks};

#[derive(Parser)]
#[command(
    name = "maildir-restore",
    version,
    about = "Plan and run restores of sharded tarsnap Maildir backups"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (overrides $MAILDIR_RESTORE_CONFIG)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tarsnap key file
    #[arg(short, long, global = true, value_name = "FILE")]
    keyfile: Option<PathBuf>,

    /// Backup set base name (YYYY-MM-DD.host); newest set when omitted
    #[arg(short, long, global = true, value_name = "BASE")]
    archive: Option<String>,

    /// Regex selecting users
    #[arg(short, long, global = true, value_name = "REGEX")]
    user: Option<String>,

    /// Regex selecting mailboxes (INBOX, Sent, Lists.rust, ...)
    #[arg(short, long, global = true, value_name = "REGEX")]
    mailbox: Option<String>,

    /// Restore destination directory
    #[arg(short = 'O', long, global = true, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Use already extracted metadata listings from this directory
    #[arg(short = 'M', long, global = true, value_name = "DIR")]
    metadata_dir: Option<PathBuf>,

    /// Tarsnap program to run
    #[arg(short = 'T', long, global = true, value_name = "PROGRAM")]
    tarsnap_command: Option<PathBuf>,

    /// Maximum concurrent restore processes
    #[arg(short, long, global = true, value_name = "N")]
    jobs: Option<usize>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the files that would be restored
    Files {
        #[arg(value_name = "ARCHIVE")]
        set: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show per-user and per-mailbox totals
    Users {
        #[arg(value_name = "ARCHIVE")]
        set: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Plan and run the restore
    Restore {
        #[arg(value_name = "ARCHIVE")]
        set: Option<String>,
        /// Print the plan without starting any process
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// List backup sets stored under the key
    Archives {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    if let Some(log_file) = init_logging(&log_level, &config) {
        tracing::debug!(log_file = %log_file.display(), "File logging enabled");
    }

    match cli.command {
        Commands::Files { set, json } => {
            cmd_files(&config, set.or(cli.archive), json).await
        }
        Commands::Users { set, json } => {
            cmd_users(&config, set.or(cli.archive), json).await
        }
        Commands::Restore {
            set,
            dry_run,
            json,
            no_progress,
        } => {
            if dry_run {
                config.restore.dry_run = true;
            }
            if no_progress || json {
                config.restore.progress = false;
            }
            cmd_restore(&config, set.or(cli.archive), json).await
        }
        Commands::Archives { json } => cmd_archives(&config, json).await,
        Commands::Completions { shell } => cmd_generate(Some(shell)),
        Commands::Manpage => cmd_generate(None),
    }
}

/// Command-line flags win over the configuration file.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(ref keyfile) = cli.keyfile {
        config.tarsnap.keyfile = Some(keyfile.clone());
    }
    if let Some(ref command) = cli.tarsnap_command {
        config.tarsnap.command = command.clone();
    }
    if let Some(ref user) = cli.user {
        config.filter.user = user.clone();
    }
    if let Some(ref mailbox) = cli.mailbox {
        config.filter.mailbox = mailbox.clone();
    }
    if let Some(ref dir) = cli.output_dir {
        config.restore.output_dir = dir.clone();
    }
    if let Some(ref dir) = cli.metadata_dir {
        config.restore.metadata_dir = Some(dir.clone());
    }
    if let Some(jobs) = cli.jobs {
        config.restore.concurrency = jobs;
    }
}

/// Log file written under the cache directory.
const LOG_FILE: &str = "maildir-restore.log";

/// Install the subscriber: human-readable events on stderr and, when the
/// cache directory is writable, a plain-text copy with thread ids in
/// [`LOG_FILE`]. Returns the log file path if file logging is on.
fn init_logging(level: &str, config: &Config) -> Option<PathBuf> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_dir = config::cache_dir(config);
    let log_file = std::fs::create_dir_all(&log_dir)
        .ok()
        .map(|()| log_dir.join(LOG_FILE));
    // Restore jobs log from many tasks at once; thread ids keep the file
    // readable.
    let file_layer = log_file.as_ref().map(|_| {
        fmt::layer()
            .with_ansi(false)
            .with_thread_ids(true)
            .with_writer(tracing_appender::rolling::never(&log_dir, LOG_FILE))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    log_file
}

/// Write shell completions for `shell`, or the man page when it is `None`.
fn cmd_generate(shell: Option<clap_complete::Shell>) -> anyhow::Result<()> {
    let mut command = Cli::command();
    let mut out = std::io::stdout().lock();
    match shell {
        Some(shell) => {
            let bin = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, bin, &mut out);
        }
        None => clap_mangen::Man::new(command)
            .render(&mut out)
            .context("rendering man page")?,
    }
    out.flush().context("writing to stdout")?;
    Ok(())
}

/// Pick the backup set: the one named, or the newest with metadata.
async fn resolve_archive(config: &Config, archive: Option<String>) -> anyhow::Result<String> {
    if let Some(base) = archive {
        return Ok(base);
    }
    let tool = ArchiveTool::from_config(config)
        .context("no archive given and the archive list needs a key file")?;
    let names = tool.list_archives().await?;
    group_backup_sets(names.iter().map(String::as_str))
        .into_iter()
        .find(|set| set.has_metadata)
        .map(|set| set.base)
        .context("no backup set with metadata found")
}

/// Resolve the archive, obtain its metadata, and build the index.
async fn load(config: &Config, archive: Option<String>) -> anyhow::Result<MetadataIndex> {
    config.validate()?;
    let filters = Filters::compile(&config.filter)?;
    let base = resolve_archive(config, archive).await?;
    let metadata = MetadataDir::acquire(config, &base).await?;
    let index = load_index(metadata.path(), &base, &filters)?;
    Ok(index)
}

/// Print every restorable file.
async fn cmd_files(config: &Config, archive: Option<String>, json: bool) -> anyhow::Result<()> {
    let index = load(config, archive).await?;
    let files = index.files();
    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else {
        for file in files {
            println!("{file}");
        }
    }
    Ok(())
}

/// Print per-user and per-mailbox totals.
async fn cmd_users(config: &Config, archive: Option<String>, json: bool) -> anyhow::Result<()> {
    let index = load(config, archive).await?;
    let summaries = index.user_summaries();

    if json {
        let output = serde_json::json!({
            "archive": index.archive(),
            "file_count": index.file_count(),
            "total_size": index.total_size(),
            "users": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Backup set:", index.archive());
    println!("  {:<20} {}", "Files:", index.file_count());
    println!(
        "  {:<20} {}",
        "Total size:",
        format_size(index.total_size(), BINARY)
    );
    for user in &summaries {
        println!();
        println!(
            "  {}  ({} files, {})",
            user.name,
            user.files,
            format_size(user.size, BINARY)
        );
        println!(
            "    {:>8}  {:>8}  {:>10}  {}",
            "files", "messages", "size", "mailbox"
        );
        for mailbox in &user.mailboxes {
            println!(
                "    {:>8}  {:>8}  {:>10}  {}",
                mailbox.files,
                mailbox.messages,
                format_size(mailbox.size, BINARY),
                mailbox.name
            );
        }
    }
    println!();
    Ok(())
}

/// Plan the restore and, unless this is a dry run, execute it.
async fn cmd_restore(config: &Config, archive: Option<String>, json: bool) -> anyhow::Result<()> {
    let index = load(config, archive).await?;
    let batches = planner::plan(&index, config.restore.command_length_limit)?;

    if config.restore.dry_run {
        if json {
            print_plan_json(&index, &batches)?;
        } else {
            print_plan_table(&index, &batches);
        }
    }

    let pb = if config.restore.progress && !config.restore.dry_run {
        let pb = ProgressBar::new(index.total_size());
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} Restoring [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}",
                )
                .expect("valid template")
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let events_pb = pb.clone();
    let on_event: JobObserver = Arc::new(move |event: &JobEvent| match event {
        JobEvent::Started { label, .. } => events_pb.set_message(label.clone()),
        JobEvent::Finished(report) if !report.succeeded() => {
            events_pb.println(format!("  failed {}", report.label()));
        }
        JobEvent::Finished(_) => {}
    });
    let ticks_pb = pb.clone();
    let on_progress: ProgressReporter = Box::new(move |tick: ProgressTick| {
        ticks_pb.set_length(tick.total);
        ticks_pb.set_position(tick.restored);
    });
    let hooks = RunHooks {
        on_event: Some(on_event),
        on_progress: Some(on_progress),
    };

    let result = restore::execute(config, &index, batches, hooks).await;
    pb.finish_and_clear();

    match result {
        Ok(summary) => {
            if !summary.dry_run {
                print_summary(&summary, config, json)?;
            }
            Ok(())
        }
        Err(RestoreError::JobsFailed { summary }) => {
            print_summary(&summary, config, json)?;
            if !json {
                print_failures(&summary);
            }
            anyhow::bail!("{} of {} restore jobs failed", summary.failed, summary.total)
        }
        Err(e) => Err(e.into()),
    }
}

/// List backup sets that carry a metadata archive, newest first.
async fn cmd_archives(config: &Config, json: bool) -> anyhow::Result<()> {
    let tool = ArchiveTool::from_config(config)?;
    let names = tool.list_archives().await?;
    let sets: Vec<_> = group_backup_sets(names.iter().map(String::as_str))
        .into_iter()
        .filter(|set| set.has_metadata)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&sets)?);
        return Ok(());
    }

    for set in &sets {
        println!(
            "  {}  {:<16} {} user(s)",
            set.date.format("%Y-%m-%d"),
            set.host,
            set.users.len()
        );
    }
    Ok(())
}

/// Print the planned batches in a human-readable table.
fn print_plan_table(index: &MetadataIndex, batches: &[RestoreBatch]) {
    let (files, size) = planner::plan_totals(batches);
    println!();
    println!("  {:<20} {}", "Backup set:", index.archive());
    println!("  {:<20} {}", "Batches:", batches.len());
    println!("  {:<20} {}", "Files:", files);
    println!("  {:<20} {}", "Total size:", format_size(size, BINARY));
    println!();
    for batch in batches {
        println!(
            "  {:>5}  {:>6} files  {:>10}  {}/{}  ({})",
            batch.sequence,
            batch.files.len(),
            format_size(batch.total_size, BINARY),
            batch.user,
            batch.mailbox,
            batch.archive
        );
    }
    println!();
}

/// Print the planned batches as JSON.
fn print_plan_json(index: &MetadataIndex, batches: &[RestoreBatch]) -> anyhow::Result<()> {
    let (files, size) = planner::plan_totals(batches);
    let output = serde_json::json!({
        "archive": index.archive(),
        "batch_count": batches.len(),
        "file_count": files,
        "total_size": size,
        "batches": batches,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the outcome of a run.
fn print_summary(summary: &RestoreSummary, config: &Config, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let restored: u64 = summary
        .jobs
        .iter()
        .filter(|j| j.succeeded())
        .map(|j| j.size)
        .sum();
    println!();
    println!(
        "  {:<20} {}",
        "Destination:",
        config::expand_path(&config.restore.output_dir).display()
    );
    println!("  {:<20} {}", "Jobs:", summary.total);
    println!("  {:<20} {}", "Succeeded:", summary.succeeded);
    println!("  {:<20} {}", "Failed:", summary.failed);
    println!("  {:<20} {}", "Peak concurrency:", summary.peak_running);
    println!("  {:<20} {}", "Restored:", format_size(restored, BINARY));
    println!(
        "  {:<20} {:.2?}",
        "Elapsed:",
        std::time::Duration::from_millis(summary.elapsed_ms)
    );
    if summary.timed_out {
        println!("  {:<20} yes", "Timed out:");
    }
    println!();
    Ok(())
}

/// List every failed job with the tail of its error output.
fn print_failures(summary: &RestoreSummary) {
    eprintln!("  Failed jobs:");
    for job in summary.failures() {
        let reason = job
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        eprintln!("    {}  {}  {}", job.label(), job.archive, reason);
    }
    eprintln!();
}
