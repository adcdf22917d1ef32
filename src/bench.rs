use std::{
  fs::OpenOptions,
  io::Write,
  path::PathBuf,
  time::Duration,
};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
  dataset::Dataset,
  registry::BuildRunSpec,
  run::{Executor, Input, Invocation, Output},
  stats::{BenchmarkCell, Cell, RunRecord},
};

const STDERR_SEPARATOR: &str = "\n--- STDERR ---\n";

/// Times repeated executions of a single cell.
pub struct BenchmarkRunner<'a> {
  executor: &'a Executor,
  /// One log per repetition lands here.
  log_dir: PathBuf,
  timeout: Duration,
}

impl<'a> BenchmarkRunner<'a> {
  pub fn new(executor: &'a Executor, log_dir: PathBuf, timeout: Duration) -> Self {
    Self {
      executor,
      log_dir,
      timeout,
    }
  }

  /// Runs `spec` against `dataset` `repetitions` times, one after the other.
  /// A failing repetition is recorded and the next one still runs.
  pub fn benchmark(&self, cell: &Cell, spec: &BuildRunSpec, dataset: &Dataset, repetitions: u32) -> Result<BenchmarkCell> {
    if !dataset.exists() {
      return Ok(BenchmarkCell::not_run(dataset.missing()));
    }

    let mut runs = Vec::with_capacity(repetitions as usize);
    for repetition in 0..repetitions {
      info!("{cell}: run {}/{repetitions}", repetition + 1);

      let run = self
        .run_once(cell, spec, dataset, repetition)
        .with_context(|| format!("{cell} run {repetition}"))?;
      runs.push(run);
    }

    Ok(BenchmarkCell::from_runs(runs))
  }

  fn run_once(&self, cell: &Cell, spec: &BuildRunSpec, dataset: &Dataset, repetition: u32) -> Result<RunRecord> {
    let log = self.log_dir.join(cell.log_name(repetition));

    let invocation = Invocation::new(&spec.run, self.timeout)
      .stdin(Input::File(&dataset.path))
      .stdout(Output::File(&log));
    let result = self.executor.run(&invocation)?;

    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&log)
      .with_context(|| format!("open {log:?}"))?;
    file.write_all(STDERR_SEPARATOR.as_bytes()).context("write log")?;
    file.write_all(result.stderr.as_bytes()).context("write log")?;

    let failure = result.failure();
    if let Some(failure) = &failure {
      warn!("{cell}: run {repetition} failed: {failure}");
    }

    let warning = result.metrics_warning();
    if let Some(warning) = &warning {
      warn!("{cell}: run {repetition}: {warning}");
    }

    Ok(RunRecord {
      repetition,
      exit_code: result.exit_code(),
      metrics: result.metrics,
      failure,
      warning,
      log,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::*;
  use crate::{
    error::Failure,
    registry::{Algorithm, Language},
    run::stand_in_time,
  };

  fn cell() -> Cell {
    Cell {
      language: Language::Python,
      algorithm: Algorithm::Merge,
      size: 3,
      distribution: "random".to_string(),
    }
  }

  fn sh(script: &str) -> BuildRunSpec {
    BuildRunSpec::interpreted(
      PathBuf::from("unused"),
      vec!["sh".to_string(), "-c".to_string(), script.to_string()],
    )
  }

  fn dataset(dir: &TempDir) -> Dataset {
    let dataset = Dataset::locate(dir.path(), 3, "random");
    fs::create_dir_all(dataset.path.parent().unwrap()).unwrap();
    fs::write(&dataset.path, "3\n1\n2\n").unwrap();
    dataset
  }

  #[test]
  fn writes_one_log_per_repetition() {
    let dir = TempDir::new().unwrap();
    let executor = Executor::new(None);
    let runner = BenchmarkRunner::new(&executor, dir.path().to_path_buf(), Duration::from_secs(10));

    let result = runner
      .benchmark(&cell(), &sh("sort -n; echo done >&2"), &dataset(&dir), 3)
      .unwrap();

    assert_eq!(result.runs.len(), 3);
    assert!(result.clean());
    for (i, run) in result.runs.iter().enumerate() {
      assert_eq!(run.repetition, i as u32);
      assert_eq!(run.exit_code, Some(0));
      assert_eq!(
        fs::read_to_string(&run.log).unwrap(),
        "1\n2\n3\n\n--- STDERR ---\ndone\n"
      );
    }
    assert!(dir.path().join("python_merge_3_random_run2.log").is_file());
  }

  #[test]
  fn failed_repetitions_do_not_stop_the_cell() {
    let dir = TempDir::new().unwrap();
    let counter = dir.path().join("count");
    let script = format!(
      "n=$(cat {c} 2>/dev/null || echo 0); echo $((n + 1)) > {c}; [ $((n % 2)) -eq 0 ] || exit 7; sort -n",
      c = counter.display()
    );
    let executor = Executor::new(None);
    let runner = BenchmarkRunner::new(&executor, dir.path().to_path_buf(), Duration::from_secs(10));

    let result = runner.benchmark(&cell(), &sh(&script), &dataset(&dir), 5).unwrap();

    assert_eq!(result.runs.len(), 5);
    assert_eq!(result.failed_runs(), 2);
    assert_eq!(result.runs[1].exit_code, Some(7));
    assert!(result.completed());
    // No accounting wrapper, so no CPU time to summarize.
    assert_eq!(result.summary.avg_time, None);
  }

  #[test]
  fn summary_averages_only_the_successful_repetitions() {
    let dir = TempDir::new().unwrap();
    let counter = dir.path().join("count");
    let script = format!(
      "n=$(cat {c} 2>/dev/null || echo 0); echo $((n + 1)) > {c}; [ $((n % 2)) -eq 0 ] || exit 7; sort -n",
      c = counter.display()
    );
    let executor = Executor::new(Some(stand_in_time(dir.path(), true)));
    let runner = BenchmarkRunner::new(&executor, dir.path().to_path_buf(), Duration::from_secs(10));

    let result = runner.benchmark(&cell(), &sh(&script), &dataset(&dir), 5).unwrap();

    assert_eq!(result.failed_runs(), 2);
    assert_eq!(result.runs[3].exit_code, Some(7));
    assert_eq!(result.runs[3].metrics.user_time, Some(9.0));
    assert_eq!(result.summary.avg_time, Some(0.25));
    assert_eq!(result.summary.stddev_time, Some(0.0));
    assert_eq!(result.summary.avg_memory_kb, Some(1024.0));
    assert!(result.runs.iter().all(|run| run.warning.is_none()));
    assert_eq!(
      fs::read_to_string(&result.runs[0].log).unwrap(),
      "1\n2\n3\n\n--- STDERR ---\n"
    );
  }

  #[test]
  fn missing_dataset_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let executor = Executor::new(None);
    let runner = BenchmarkRunner::new(&executor, dir.path().to_path_buf(), Duration::from_secs(10));
    let missing = Dataset::locate(dir.path(), 3, "identical");

    let result = runner.benchmark(&cell(), &sh("sort -n"), &missing, 5).unwrap();

    assert!(result.runs.is_empty());
    assert_eq!(result.failure, Some(Failure::MissingInputFile { path: missing.path }));
  }
}
