//! spindle - build an app repository from a tree of package build specs

mod console;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use spindle_core::config::CONFIG_FILE;
use spindle_core::{Config, Pipeline, Reporter, prepare_output};

use crate::console::ConsoleReporter;

#[derive(Debug, Parser)]
#[command(name = "spindle")]
#[command(author, version, about = "Build a distributable app repository from package build specs")]
struct Args {
    /// Directory holding the package directories
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Where the repository is written
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Build into a non-empty output directory that holds no repository
    #[arg(short = 'i', long)]
    ignore_non_empty_output: bool,

    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Packages assembled at once
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl Args {
    /// Settings from the config file, overridden by any flags given.
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config)
            .with_context(|| format!("failed to load {}", self.config.display()))?;
        if let Some(target) = &self.target {
            config.target_dir.clone_from(target);
        }
        if let Some(output) = &self.output {
            config.output_dir.clone_from(output);
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let reporter = ConsoleReporter;
    match build(&args, &reporter).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            reporter.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Run one build. `Ok(false)` means at least one package failed.
async fn build(args: &Args, reporter: &ConsoleReporter) -> Result<bool> {
    let config = args.config()?;
    tracing::debug!(?config, "resolved configuration");

    reporter.section(concat!("spindle ", env!("CARGO_PKG_VERSION")));
    let output = prepare_output(&config.output_dir, args.ignore_non_empty_output)
        .with_context(|| format!("cannot use output directory {}", config.output_dir.display()))?;
    if output.is_incremental() {
        reporter.info(&format!("Updating repository at {}", output.root().display()));
    } else {
        reporter.info(&format!("Creating repository at {}", output.root().display()));
    }

    let summary = Pipeline::new(&config, reporter)?
        .run(&config.target_dir, &output)
        .await?;
    Ok(summary.is_success())
}
