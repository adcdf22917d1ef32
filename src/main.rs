mod bench;
mod compile;
mod config;
mod dataset;
mod error;
mod ext;
mod format;
mod logging;
mod metrics;
mod order;
mod registry;
mod report;
mod run;
mod stats;
mod sweep;
mod verify;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};

use self::{
  config::HarnessConfig,
  registry::Registry,
  run::Executor,
  sweep::{Selection, Sweep, Tally},
};

#[derive(Parser)]
#[command(version, about = "Conformance and benchmark harness for sorting implementations")]
struct Args {
  /// YAML settings file; flags below override it.
  #[arg(long, global = true)]
  config: Option<PathBuf>,
  /// Number of cells to run concurrently.
  #[arg(short, long, global = true)]
  jobs: Option<usize>,
  #[arg(long, global = true)]
  results_dir: Option<PathBuf>,
  /// Root of the per-language source trees.
  #[arg(long, global = true)]
  sorting_dir: Option<PathBuf>,
  #[arg(long, global = true)]
  dataset_dir: Option<PathBuf>,
  #[command(subcommand)]
  command: Command,
}

#[derive(ClapArgs, Debug)]
struct Targets {
  /// Languages to run; `all` or none for every language with sources.
  #[arg(short, long, num_args = 1..)]
  languages: Vec<String>,
  /// Algorithms to run; `all` or none for every algorithm.
  #[arg(short, long, num_args = 1..)]
  algorithms: Vec<String>,
  /// Every available language and every algorithm.
  #[arg(long)]
  all: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Check each candidate's output against the canonical ordering.
  Verify {
    #[command(flatten)]
    targets: Targets,
  },
  /// Time each candidate over every size and distribution.
  Bench {
    #[command(flatten)]
    targets: Targets,
    /// Repetitions per cell.
    #[arg(short, long)]
    repetitions: Option<u32>,
    #[arg(long, num_args = 1..)]
    sizes: Vec<usize>,
    #[arg(long, num_args = 1..)]
    distributions: Vec<String>,
    /// Count cells where only some repetitions failed as passed.
    #[arg(long)]
    allow_partial: bool,
  },
  /// Print every configured candidate and whether its source exists.
  List,
}

impl Args {
  fn config(&self) -> Result<HarnessConfig> {
    let mut config = match &self.config {
      Some(path) => HarnessConfig::load(path).context("load config")?,
      None => HarnessConfig::default(),
    };

    if let Some(jobs) = self.jobs {
      config.jobs = jobs;
    }
    if let Some(dir) = &self.results_dir {
      config.results_dir = dir.clone();
    }
    if let Some(dir) = &self.sorting_dir {
      config.sorting_dir = dir.clone();
    }
    if let Some(dir) = &self.dataset_dir {
      config.dataset_dir = dir.clone();
    }

    Ok(config)
  }
}

fn select(registry: &Registry, targets: &Targets) -> Result<Selection> {
  let (languages, algorithms) = if targets.all {
    (Vec::new(), Vec::new())
  } else {
    (targets.languages.clone(), targets.algorithms.clone())
  };

  let (selection, errors) = Selection::resolve(registry, &languages, &algorithms);
  for err in &errors {
    warn!("{err}; skipping");
  }

  if selection.languages.is_empty() || selection.algorithms.is_empty() {
    anyhow::bail!("nothing to run");
  }

  Ok(selection)
}

fn main() -> Result<()> {
  let args = Args::parse();
  let mut config = args.config()?;

  logging::init_logging(&config.log_level);

  let registry = Registry::new(&config.sorting_dir);
  let executor = Executor::new(config.time_command.clone());

  let failed = match args.command {
    Command::List => {
      for (language, algorithm, spec) in registry.iter() {
        let kind = if spec.is_interpreted() { "interpreted" } else { "compiled" };
        let source = if spec.source_present() { "present" } else { "missing" };
        println!("{language:<8}{algorithm:<11}{kind:<13}{source:<9}{}", spec.source.display());
      }
      0
    }
    Command::Verify { targets } => {
      let mut selection = select(&registry, &targets)?;
      selection.distributions = config.distributions.clone();

      info!(languages = ?selection.languages, algorithms = ?selection.algorithms, "verifying");
      let report = Sweep::new(&registry, &executor, &config)
        .verify(&selection)
        .context("verify")?;

      let tally = Tally::of(&report, false);
      println!("{tally}");
      tally.failed
    }
    Command::Bench {
      targets,
      repetitions,
      sizes,
      distributions,
      allow_partial,
    } => {
      if !sizes.is_empty() {
        config.sizes = sizes;
      }
      if !distributions.is_empty() {
        config.distributions = distributions;
      }

      let mut selection = select(&registry, &targets)?;
      selection.sizes = config.sizes.clone();
      selection.distributions = config.distributions.clone();
      let repetitions = repetitions.unwrap_or(config.repetitions).max(1);

      info!(languages = ?selection.languages, algorithms = ?selection.algorithms, repetitions, "benchmarking");
      let report = Sweep::new(&registry, &executor, &config)
        .benchmark(&selection, repetitions)
        .context("bench")?;

      println!("{}", format::format(&report).context("format")?);
      let tally = Tally::of(&report, allow_partial);
      println!("{tally}");
      tally.failed
    }
  };

  if failed > 0 {
    std::process::exit(1);
  }

  Ok(())
}
