// src/cli.rs

use clap::{Args as ClapArgs, Parser, Subcommand};
use fwk_miner::config::{DiscoveryConfig, RetryPolicy, Settings};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the population and per-user passes for a framework and store the result
    Integrate {
        /// TOML file describing the framework's tracked commands
        #[arg(short, long)]
        descriptor: PathBuf,
    },
    /// Analyze one contributor against a stored framework result
    AnalyzeUser {
        #[arg(short, long)]
        framework: String,

        #[arg(short, long)]
        email: String,
    },
}

#[derive(ClapArgs, Debug)]
pub struct SettingsArgs {
    /// Directory holding results and scratch clones
    #[arg(long, default_value = "./data", global = true)]
    pub data_dir: PathBuf,

    /// Token for the GitHub search API
    #[arg(long, env = "GITHUB_KEY", hide_env_values = true, global = true)]
    pub github_token: Option<String>,

    /// Lower bound of the population star window
    #[arg(long, default_value_t = 50, global = true)]
    pub min_stars: u32,

    /// Upper bound of the population star window
    #[arg(long, default_value_t = 1000, global = true)]
    pub max_stars: u32,

    /// Result pages requested in the population search
    #[arg(long, default_value_t = 1, global = true)]
    pub population_pages: u32,

    /// Clone attempts before a repository is given up on
    #[arg(long, default_value_t = 5, global = true)]
    pub clone_attempts: u32,

    /// Upper bound of the delay between clone attempts, in seconds
    #[arg(long, default_value_t = 60, global = true)]
    pub clone_max_delay_secs: u64,

    /// Wall-clock budget for scanning one repository, in minutes
    #[arg(long, default_value_t = 30, global = true)]
    pub scan_budget_mins: u64,

    /// Repositories processed at the same time
    #[arg(long, default_value_t = 1, global = true)]
    pub concurrency: usize,
}

impl SettingsArgs {
    pub fn into_settings(self) -> Settings {
        Settings {
            data_dir: self.data_dir,
            github_token: self.github_token.filter(|t| !t.is_empty()),
            discovery: DiscoveryConfig {
                min_stars: self.min_stars,
                max_stars: self.max_stars,
                population_pages: self.population_pages,
                ..Default::default()
            },
            clone_retry: RetryPolicy {
                max_attempts: self.clone_attempts,
                max_delay: Duration::from_secs(self.clone_max_delay_secs),
                ..Default::default()
            },
            scan_budget: Duration::from_secs(self.scan_budget_mins * 60),
            concurrency: self.concurrency,
        }
    }
}
