//! dirsync CLI entry point.

use clap::Parser;
use colored::Colorize;
use dirsync::cli::Cli;
use dirsync::creds::CliCredentials;
use dirsync::engine::local::LocalScanEngine;
use dirsync::error::Error;
use dirsync::proxy::EnvProxyResolver;
use dirsync::session::{SessionSummary, SyncSessionController};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            return match e.kind() {
                // --help / --version are not usage errors.
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    print!("{e}");
                    ExitCode::SUCCESS
                }
                _ => {
                    eprint!("{e}");
                    ExitCode::from(1)
                }
            };
        }
    };

    init_tracing(cli.silent);

    let silent = cli.silent;
    // Non-TTY consumers get machine-readable output.
    let json = !std::io::stdout().is_terminal();

    match run(cli) {
        Ok(summary) => {
            if json {
                print_json_summary(&summary);
            } else if !silent {
                print_summary(&summary);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if std::io::stderr().is_terminal() {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            } else {
                eprintln!("{}", e.to_structured_json());
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(silent: bool) {
    use tracing_subscriber::EnvFilter;

    // Honor RUST_LOG if set, otherwise derive the level from --silent
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if silent {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<SessionSummary, Error> {
    let options = cli.into_session_options()?;

    let credentials = CliCredentials::from_options(&options);
    let engine = Arc::new(LocalScanEngine::new());
    let mut controller =
        SyncSessionController::new(options, engine, credentials, EnvProxyResolver);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(controller.run())
}

fn print_json_summary(summary: &SessionSummary) {
    let output = serde_json::json!({
        "success": summary.succeeded(),
        "outcome": summary.outcome.as_str(),
        "passes": summary.passes,
        "started_at": summary.started_at.to_rfc3339(),
        "duration_secs": summary.duration.as_secs_f64(),
        "stats": summary.stats,
    });
    println!("{output}");
}

fn print_summary(summary: &SessionSummary) {
    let headline = if summary.succeeded() {
        "Sync complete".green().bold()
    } else {
        "Sync failed".red().bold()
    };

    println!(
        "{headline}: {} pass{} in {:.1}s",
        summary.passes,
        if summary.passes == 1 { "" } else { "es" },
        summary.duration.as_secs_f64()
    );
    println!("  Files seen:   {}", summary.stats.files_seen);
    println!("  Rows written: {}", summary.stats.rows_written);
    if summary.stats.rows_removed > 0 {
        println!("  Rows removed: {}", summary.stats.rows_removed);
    }
    if summary.stats.soft_failures > 0 {
        println!(
            "  {} {}",
            "Soft failures:".yellow(),
            summary.stats.soft_failures
        );
    }
}
