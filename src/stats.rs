use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
  error::Failure,
  metrics::Metrics,
  registry::{Algorithm, Language},
};

/// One (language, algorithm, size, distribution) coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
  pub language: Language,
  pub algorithm: Algorithm,
  pub size: usize,
  pub distribution: String,
}

impl Cell {
  /// Key of a benchmark cell within its language.
  pub fn bench_key(&self) -> String {
    format!("{}_{}_{}", self.algorithm, self.size, self.distribution)
  }

  /// Key of a verification outcome within its language.
  pub fn outcome_key(&self) -> String {
    format!("{}_{}", self.algorithm, self.distribution)
  }

  pub fn log_name(&self, repetition: u32) -> String {
    format!(
      "{}_{}_{}_{}_run{repetition}.log",
      self.language, self.algorithm, self.size, self.distribution
    )
  }
}

impl fmt::Display for Cell {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{} + {} ({})", self.language, self.algorithm, self.distribution, self.size)
  }
}

/// One timed repetition of a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
  pub repetition: u32,
  pub exit_code: Option<i32>,
  pub metrics: Metrics,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure: Option<Failure>,
  /// Non-fatal accounting problems.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub warning: Option<Failure>,
  pub log: PathBuf,
}

impl RunRecord {
  pub fn succeeded(&self) -> bool {
    self.failure.is_none()
  }
}

/// Aggregates over the successful repetitions of a cell. A value is `None`
/// when no repetition reported the underlying metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
  /// Mean user CPU time, seconds.
  pub avg_time: Option<f64>,
  /// Sample standard deviation of user CPU time; 0 for a single point.
  pub stddev_time: Option<f64>,
  pub avg_memory_kb: Option<f64>,
}

impl Summary {
  pub fn from_runs(runs: &[RunRecord]) -> Self {
    let ok = || runs.iter().filter(|run| run.succeeded());

    let times: Vec<f64> = ok().filter_map(|run| run.metrics.user_time).collect();
    let memory: Vec<f64> = ok().filter_map(|run| run.metrics.max_rss_kb).map(|kb| kb as f64).collect();

    Self {
      avg_time: mean(&times),
      stddev_time: sample_stddev(&times),
      avg_memory_kb: mean(&memory),
    }
  }
}

fn mean(samples: &[f64]) -> Option<f64> {
  if samples.is_empty() {
    return None;
  }

  Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

fn sample_stddev(samples: &[f64]) -> Option<f64> {
  let mean = mean(samples)?;
  if samples.len() < 2 {
    return Some(0.0);
  }

  let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
  Some(variance.sqrt())
}

/// Every repetition of one (language, algorithm, size, distribution) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCell {
  pub runs: Vec<RunRecord>,
  pub summary: Summary,
  /// Set when the cell never ran: a failed compile or a missing dataset.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure: Option<Failure>,
}

impl BenchmarkCell {
  pub fn from_runs(runs: Vec<RunRecord>) -> Self {
    Self {
      summary: Summary::from_runs(&runs),
      runs,
      failure: None,
    }
  }

  pub fn not_run(failure: Failure) -> Self {
    Self {
      runs: Vec::new(),
      summary: Summary::default(),
      failure: Some(failure),
    }
  }

  pub fn failed_runs(&self) -> usize {
    self.runs.iter().filter(|run| !run.succeeded()).count()
  }

  /// Whether any run succeeded.
  pub fn completed(&self) -> bool {
    self.failure.is_none() && self.runs.iter().any(RunRecord::succeeded)
  }

  /// Whether every repetition succeeded.
  pub fn clean(&self) -> bool {
    self.completed() && self.failed_runs() == 0
  }
}
