mod cli;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use cli::{Cli, Commands};
use swingsmith_rs::predictor::predict_from_reader;
use swingsmith_rs::process::process_watchlist;
use swingsmith_rs::trainer::train;
use tracing_appender::non_blocking;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, prelude::*};

const LOG_FILE_NAME: &str = "swingsmith.log";

/// Console output goes to stderr for `predict` so stdout carries only the
/// signal.
fn init_tracing(console: BoxMakeWriter, log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer().with_writer(console);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // The writer must outlive every log call; leak the guard for the
        // lifetime of the process.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn log_invocation(log_file: Option<&PathBuf>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    tracing::info!("==================== new swingsmith run ====================");
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "swingsmith invoked"
    );
    if argv.len() >= 2 {
        tracing::info!(
            "cargo_repro_command=cargo run --release -p swingsmith_cli -- {}",
            argv[1..].join(" ")
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => {
            let no_file_log = args.no_file_log;
            let config = args.into_config()?;
            let log_file = (!no_file_log).then(|| config.processed_dir.join(LOG_FILE_NAME));
            init_tracing(BoxMakeWriter::new(io::stdout), log_file.clone())?;
            log_invocation(log_file.as_ref());

            let summary = process_watchlist(&config)?;
            for report in &summary.processed {
                println!(
                    "{:<6} rows={:<5} written={:<5} buy={:<4} stop={:<4} expired={:<4} -> {}",
                    report.symbol,
                    report.raw_rows,
                    report.written_rows,
                    report.labels.profit,
                    report.labels.stop,
                    report.labels.expired,
                    report.output.display()
                );
            }
            for symbol in &summary.skipped {
                println!("{symbol:<6} skipped (no raw data)");
            }
            Ok(())
        }
        Commands::Train(args) => {
            let no_file_log = args.no_file_log;
            let config = args.into_config()?;
            let log_file = (!no_file_log).then(|| config.model_dir.join(LOG_FILE_NAME));
            init_tracing(BoxMakeWriter::new(io::stdout), log_file.clone())?;
            log_invocation(log_file.as_ref());

            let outcome = train(&config)?;
            let artifact = &outcome.artifact;
            println!(
                "Best parameters: n_estimators={} max_depth={} learning_rate={} (cv f1 {:.4})",
                artifact.best.params.n_estimators,
                artifact.best.params.max_depth,
                artifact.best.params.learning_rate,
                artifact.best.mean_f1
            );
            println!();
            println!("Classification report ({}):", artifact.symbol);
            println!("{}", artifact.report);
            println!("Feature importances:");
            for entry in &artifact.feature_importances {
                println!("  {:<16} {:.4}", entry.feature, entry.importance);
            }
            println!();
            println!("Model saved to {}", outcome.model_path.display());
            Ok(())
        }
        Commands::Predict(args) => {
            let config = args.into_config()?;
            init_tracing(BoxMakeWriter::new(io::stderr), None)?;
            log_invocation(None);

            let signal = predict_from_reader(io::stdin().lock(), &config.model_path())?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{signal}")?;
            stdout.flush()?;
            Ok(())
        }
    }
}
