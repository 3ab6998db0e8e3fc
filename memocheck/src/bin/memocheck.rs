//! memocheck - run the built-in memo-service suites.
//!
//! # Usage
//!
//! In-process nodes, ten-node fixture, default retry:
//! ```bash
//! cargo run --bin memocheck
//! ```
//!
//! Against a real service binary, leaving out the newest node:
//! ```bash
//! cargo run --bin memocheck -- --service-cmd "memod --listen {addr}" --exclude-newest 1 -v
//! ```
//!
//! Exit code is 0 when every case passed, 1 when any case failed or errored,
//! 2 when the configuration is invalid.

use clap::Parser;
use memocheck::cli::Cli;
use memocheck::runner::display::eprint_report;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match cli.harness_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("memocheck: {err}");
            std::process::exit(2);
        }
    };
    let report = match memocheck::run(&config, cli.verbose).await {
        Ok(report) => report,
        Err(err) => {
            eprintln!("memocheck: {err}");
            std::process::exit(2);
        }
    };

    eprint_report(&report);
    std::process::exit(report.exit_code());
}
