//! Collection and persistence of sweep results.

use std::{
  collections::BTreeMap,
  fs,
  io::Write,
  path::{Path, PathBuf},
  sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::ext::NamedTempFileExt;

/// `language -> cell key -> entry`.
pub type Results<T> = BTreeMap<String, BTreeMap<String, T>>;

/// The machine a sweep ran on, captured once at its start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineMetadata {
  pub timestamp: DateTime<Utc>,
  pub os: String,
  pub os_release: Option<String>,
  pub processor: String,
  pub cpu_count: usize,
  pub harness_version: String,
}

impl MachineMetadata {
  pub fn capture() -> Self {
    Self {
      timestamp: Utc::now(),
      os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
      os_release: fs::read_to_string("/proc/sys/kernel/osrelease")
        .ok()
        .map(|release| release.trim().to_string()),
      processor: cpu_model().unwrap_or_else(|| std::env::consts::ARCH.to_string()),
      cpu_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
      harness_version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    }
  }
}

fn cpu_model() -> Option<String> {
  fs::read_to_string("/proc/cpuinfo").ok().and_then(|cpuinfo| {
    cpuinfo
      .lines()
      .find(|line| line.starts_with("model name"))
      .and_then(|line| line.split(':').nth(1))
      .map(|model| model.trim().to_string())
  })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report<T> {
  pub metadata: MachineMetadata,
  pub results: Results<T>,
}

/// Collects one entry per attempted cell. Safe to share between workers;
/// with a checkpoint path, the results so far are rewritten after every
/// record so an interrupted sweep keeps everything it finished.
pub struct ResultAggregator<T> {
  metadata: MachineMetadata,
  results: Mutex<Results<T>>,
  checkpoint: Option<PathBuf>,
}

impl<T: Serialize> ResultAggregator<T> {
  pub fn new(metadata: MachineMetadata, checkpoint: Option<PathBuf>) -> Self {
    Self {
      metadata,
      results: Mutex::new(BTreeMap::new()),
      checkpoint,
    }
  }

  pub fn record(&self, language: &str, key: String, entry: T) -> Result<()> {
    let mut results = self.results.lock().map_err(|_| anyhow!("results lock poisoned"))?;

    let cells = results.entry(language.to_string()).or_default();
    anyhow::ensure!(!cells.contains_key(&key), "{language}/{key} recorded twice");
    cells.insert(key, entry);

    if let Some(path) = &self.checkpoint {
      write_json(path, &*results).context("checkpoint")?;
    }

    Ok(())
  }

  pub fn persist(&self, path: &Path) -> Result<()> {
    let results = self.results.lock().map_err(|_| anyhow!("results lock poisoned"))?;

    write_json(path, &*results)
  }

  pub fn finalize(self) -> Result<Report<T>> {
    let results = self.results.into_inner().map_err(|_| anyhow!("results lock poisoned"))?;

    Ok(Report {
      metadata: self.metadata,
      results,
    })
  }
}

/// Writes `value` as pretty JSON, atomically replacing `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
  let mut file = NamedTempFile::beside(path)?;

  serde_json::to_writer_pretty(&mut file, value).context("serialize")?;
  file.write_all(b"\n").context("write")?;
  file.persist(path).with_context(|| format!("persist {path:?}"))?;

  Ok(())
}
