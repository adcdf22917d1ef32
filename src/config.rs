use std::{
  fs,
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::verify;

pub const DISTRIBUTIONS: [&str; 6] = ["random", "sorted", "reverse", "nearly_sorted", "few_unique", "identical"];

/// Harness settings, read from an optional YAML file. Command-line flags are
/// applied on top in `main`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
  /// Root of the per-language source trees.
  pub sorting_dir: PathBuf,
  /// Datasets live at `{dataset_dir}/{size}/{distribution}.txt`.
  pub dataset_dir: PathBuf,
  pub results_dir: PathBuf,
  pub repetitions: u32,
  pub sizes: Vec<usize>,
  pub distributions: Vec<String>,
  /// Dataset size used in verification mode.
  pub verify_size: usize,
  pub verify_timeout_secs: u64,
  pub bench_timeout_secs: u64,
  pub compile_timeout_secs: u64,
  /// GNU `time`, used for CPU and memory accounting. `null` disables it.
  pub time_command: Option<PathBuf>,
  pub jobs: usize,
  pub log_level: String,
}

impl Default for HarnessConfig {
  fn default() -> Self {
    Self {
      sorting_dir: PathBuf::from("."),
      dataset_dir: PathBuf::from("datasets"),
      results_dir: PathBuf::from("results"),
      repetitions: 5,
      sizes: vec![10_000, 100_000, 500_000, 1_000_000],
      distributions: DISTRIBUTIONS.iter().map(|d| d.to_string()).collect(),
      verify_size: 10_000,
      verify_timeout_secs: verify::DEFAULT_TIMEOUT.as_secs(),
      bench_timeout_secs: 600,
      compile_timeout_secs: 30,
      time_command: Some(PathBuf::from("/usr/bin/time")),
      jobs: 1,
      log_level: "info".to_string(),
    }
  }
}

impl HarnessConfig {
  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path).with_context(|| format!("read {path:?}"))?;

    serde_yaml::from_str(&content).with_context(|| format!("parse {path:?}"))
  }

  pub fn verify_timeout(&self) -> Duration {
    Duration::from_secs(self.verify_timeout_secs)
  }

  pub fn bench_timeout(&self) -> Duration {
    Duration::from_secs(self.bench_timeout_secs)
  }

  pub fn compile_timeout(&self) -> Duration {
    Duration::from_secs(self.compile_timeout_secs)
  }

  pub fn log_dir(&self) -> PathBuf {
    self.results_dir.join("logs")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_file_keeps_defaults() {
    let config: HarnessConfig = serde_yaml::from_str("repetitions: 3\nsizes: [100]\ntime_command: null\n").unwrap();

    assert_eq!(config.repetitions, 3);
    assert_eq!(config.sizes, vec![100]);
    assert_eq!(config.time_command, None);
    assert_eq!(config.distributions.len(), 6);
    assert_eq!(config.verify_timeout(), Duration::from_secs(60));
  }

  #[test]
  fn load_reports_missing_file() {
    let err = HarnessConfig::load(Path::new("/nonexistent/harness.yaml")).unwrap_err();

    assert!(format!("{err:#}").contains("harness.yaml"));
  }

  #[test]
  fn sample_file_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("harness.yaml");
    let sample = HarnessConfig::load(&path).unwrap();
    let defaults = HarnessConfig::default();

    assert_eq!(serde_yaml::to_string(&sample).unwrap(), serde_yaml::to_string(&defaults).unwrap());
  }
}
