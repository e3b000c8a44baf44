// src/main.rs

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Args, Command};
use fwk_miner::clone::GitCloner;
use fwk_miner::config::FrameworkDescriptor;
use fwk_miner::discovery::GitHubSearch;
use fwk_miner::pipeline::Pipeline;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();

    debug!("Started with verbosity level: {}", verbose);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let start_time = Instant::now();

    let settings = args.settings.into_settings();
    let search = GitHubSearch::new(settings.github_token.clone()).context("Failed to set up the search client")?;
    let pipeline = Pipeline::new(settings, Arc::new(search), Arc::new(GitCloner));

    match args.command {
        Command::Integrate { descriptor } => {
            let descriptor = FrameworkDescriptor::load(&descriptor)
                .with_context(|| format!("Invalid framework descriptor {}", descriptor.display()))?;
            let result = pipeline.integrate(&descriptor).await?;
            info!(
                "Integration finished in {:.2?}. {} adopting repositories, {} from contributors, {} users.",
                start_time.elapsed(),
                result.repo_count,
                result.users_repo_count,
                result.users_count
            );
            info!("Result written to {}", pipeline.store().path(&descriptor.framework).display());
        }
        Command::AnalyzeUser { framework, email } => {
            let analysis = pipeline.analyze_user(&framework, &email).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            info!("Total time: {:.2?}", start_time.elapsed());
        }
    }

    Ok(())
}
