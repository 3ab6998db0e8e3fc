//! Command-line surface of the `memocheck` binary.
//!
//! Flags override the JSON config file, which overrides the defaults of
//! [`HarnessConfig`].

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use memocheck_harness::{HarnessConfig, HarnessResult, StabilityStrategy};

/// Stability strategy as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Every ready node.
    AllNodes,
    /// Drop the most recently ready nodes, see `--exclude-newest`.
    ExcludeNewest,
    /// Lowest-id majority.
    Majority,
}

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "memocheck")]
#[command(about = "Run memo-service behavior suites against managed clusters", long_about = None)]
pub struct Cli {
    /// JSON config file; flags given here override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Nodes per cluster of the configured fixture
    #[arg(long)]
    pub nodes: Option<usize>,

    /// Which nodes count as known stable
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Newest nodes to leave out; implies `--strategy exclude-newest`
    #[arg(long)]
    pub exclude_newest: Option<usize>,

    /// Retry transient failures
    #[arg(long, overrides_with = "no_retry")]
    pub retry: bool,

    /// Fail on the first transient failure
    #[arg(long, overrides_with = "retry")]
    pub no_retry: bool,

    /// Attempts per retried call, first one included
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Replication delay of in-process nodes in milliseconds
    #[arg(long)]
    pub replication_delay_ms: Option<u64>,

    /// Cases run at once
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Only run cases whose name contains this
    #[arg(long)]
    pub filter: Option<String>,

    /// External memo-service command ({port}, {addr}, {index}, {cluster} are substituted)
    #[arg(long = "service-cmd")]
    pub service_cmd: Option<String>,

    /// -v prints a character per case, -vv a line per operation and debug logs
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Config file (if any) with every given flag applied, validated.
    pub fn harness_config(&self) -> HarnessResult<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_json_file(path)?,
            None => HarnessConfig::default(),
        };

        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
        if let Some(strategy) = self.stability_strategy() {
            config.strategy = strategy;
        }
        if self.retry {
            config.retry.enabled = true;
        }
        if self.no_retry {
            config.retry.enabled = false;
        }
        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = self.backoff_ms {
            config.retry.backoff_ms = ms;
        }
        if let Some(ms) = self.replication_delay_ms {
            config.sim.replication_delay_ms = ms;
        }
        if let Some(n) = self.parallelism {
            config.parallelism = n;
        }
        if let Some(filter) = &self.filter {
            config.filter = Some(filter.clone());
        }
        if let Some(command) = &self.service_cmd {
            config.service_command = Some(command.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn stability_strategy(&self) -> Option<StabilityStrategy> {
        match (self.strategy, self.exclude_newest) {
            (Some(StrategyArg::AllNodes), _) => Some(StabilityStrategy::AllNodes),
            (Some(StrategyArg::Majority), _) => Some(StabilityStrategy::Majority),
            (Some(StrategyArg::ExcludeNewest), k) => {
                Some(StabilityStrategy::ExcludeNewest(k.unwrap_or(1)))
            }
            (None, Some(k)) => Some(StabilityStrategy::ExcludeNewest(k)),
            (None, None) => None,
        }
    }

    /// Default `RUST_LOG` directive for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose >= 2 {
            "info,memocheck=debug"
        } else {
            "warn"
        }
    }
}
