use std::{
  fs,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::error::Failure;

/// One input file, produced ahead of time by an external generator: one
/// token per line, no header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
  pub size: usize,
  pub distribution: String,
  pub path: PathBuf,
}

impl Dataset {
  /// The dataset for `size` and `distribution` under `dir`, laid out as
  /// `{dir}/{size}/{distribution}.txt`.
  pub fn locate(dir: &Path, size: usize, distribution: &str) -> Self {
    Self {
      size,
      distribution: distribution.to_string(),
      path: dir.join(size.to_string()).join(format!("{distribution}.txt")),
    }
  }

  pub fn exists(&self) -> bool {
    self.path.is_file()
  }

  pub fn missing(&self) -> Failure {
    Failure::MissingInputFile { path: self.path.clone() }
  }

  pub fn tokens(&self) -> Result<Vec<String>> {
    let bytes = fs::read(&self.path).with_context(|| format!("read {:?}", self.path))?;

    Ok(
      String::from_utf8_lossy(&bytes)
        .split_whitespace()
        .map(str::to_string)
        .collect(),
    )
  }
}
