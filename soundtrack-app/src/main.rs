//! soundtrack - build a looped, tagged soundtrack from a config file
//!
//! Reads a JSON5 config, builds every track it describes, and keeps the
//! album manifest up to date after each one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::Receiver;
use tracing_subscriber::EnvFilter;

use soundtrack_library::{BuildOptions, BuildProgress, Config, Soundtrack};

#[derive(Parser, Debug)]
#[command(name = "soundtrack", version, about = "Build a looped, tagged soundtrack from a config file")]
struct Cli {
    /// Soundtrack config (JSON5)
    #[arg(env = "SOUNDTRACK_CONFIG")]
    config: PathBuf,

    /// Write outputs and the manifest under this directory instead of the config's
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep the existing manifest and skip tracks that are already built
    #[arg(long)]
    resume: bool,

    /// Stop at the first track that fails
    #[arg(long)]
    fail_fast: bool,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    tracing::info!(config = %cli.config.display(), "Loading config");
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    let options = BuildOptions {
        resume: cli.resume,
        fail_fast: cli.fail_fast,
        output_root: cli.output.clone(),
    };
    let mut soundtrack = Soundtrack::new(config, options).context("Failed to prepare build")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_cancel = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_cancel.store(true, Ordering::SeqCst);
        eprintln!("Stopping after the current track...");
    })
    .context("Failed to install Ctrl-C handler")?;

    let (progress_tx, progress_rx) = crossbeam_channel::unbounded();
    let reporter = thread::spawn(move || report_progress(progress_rx));

    let result = soundtrack.build(&cancel, Some(progress_tx));
    let _ = reporter.join();

    let report = result.context("Build failed")?;
    println!(
        "Built {} track(s), skipped {}, failed {}. Manifest: {}",
        report.built,
        report.skipped,
        report.failed,
        report.manifest.display()
    );

    if report.failed > 0 {
        anyhow::bail!("{} track(s) failed", report.failed);
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Print progress until the build drops its sender
fn report_progress(rx: Receiver<BuildProgress>) {
    for event in rx.iter() {
        match event {
            BuildProgress::Started { total } => println!("Building {total} track(s)"),
            BuildProgress::Track { current, total, title } => {
                println!("[{current}/{total}] {title}");
            }
            BuildProgress::Skipped { current, total, title } => {
                println!("[{current}/{total}] {title} (already built)");
            }
            BuildProgress::Failed { title, message } => {
                eprintln!("FAILED {title}: {message}");
            }
            BuildProgress::Complete { cancelled: true, .. } => println!("Cancelled"),
            BuildProgress::Complete { .. } => {}
        }
    }
}
