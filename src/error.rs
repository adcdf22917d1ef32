use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a cell (or a single repetition of one) did not succeed. Every variant
/// is caught at the cell boundary and recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
  #[error("executable not found: {program}")]
  ExecutableNotFound { program: String },

  #[error("compile failed: {message}")]
  CompileFailed { message: String },

  #[error("{}", describe_exit(.code, .signal, .stderr))]
  NonZeroExit {
    code: Option<i32>,
    signal: Option<i32>,
    stderr: String,
  },

  #[error("timed out ({}s)", secs(.timeout_ms))]
  Timeout { timeout_ms: u64 },

  #[error("output mismatch at line {line}")]
  OutputMismatch { line: usize },

  #[error("input file missing: {}", .path.display())]
  MissingInputFile { path: PathBuf },

  /// Not fatal: the run is kept with whatever fields did parse.
  #[error("incomplete metrics, missing {}", .missing.join(", "))]
  MetricsParseIncomplete { missing: Vec<String> },
}

impl Failure {
  /// Failures reported as SKIP rather than FAIL: the candidate never ran.
  pub fn is_skip(&self) -> bool {
    matches!(self, Failure::CompileFailed { .. } | Failure::MissingInputFile { .. })
  }
}

fn secs(ms: &u64) -> f64 {
  *ms as f64 / 1000.0
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>, stderr: &str) -> String {
  let status = match (*code, *signal) {
    (Some(code), _) => format!("exit code {code}"),
    (None, Some(signal)) => format!("terminated by signal {signal}"),
    (None, None) => "abnormal termination".to_string(),
  };

  let stderr = stderr.trim();
  if stderr.is_empty() {
    status
  } else {
    format!("{status}: {stderr}")
  }
}

/// A (language, algorithm) pair with no registry entry.
#[derive(Debug, Error)]
#[error("{algorithm} is not configured for {language}")]
pub struct NotFound {
  pub language: String,
  pub algorithm: String,
}

/// A name on the command line that names nothing we know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
  #[error("language '{0}' is not configured")]
  UnknownLanguage(String),
  #[error("algorithm '{0}' is not configured")]
  UnknownAlgorithm(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn non_zero_exit_includes_trimmed_stderr() {
    let failure = Failure::NonZeroExit {
      code: Some(3),
      signal: None,
      stderr: "boom\n".to_string(),
    };

    assert_eq!(failure.to_string(), "exit code 3: boom");
  }

  #[test]
  fn signal_termination_is_described() {
    let failure = Failure::NonZeroExit {
      code: None,
      signal: Some(9),
      stderr: String::new(),
    };

    assert_eq!(failure.to_string(), "terminated by signal 9");
  }

  #[test]
  fn serializes_with_kind_tag() {
    let json = serde_json::to_value(Failure::OutputMismatch { line: 2 }).unwrap();

    assert_eq!(json["kind"], "output_mismatch");
    assert_eq!(json["line"], 2);
  }

  #[test]
  fn timeout_reports_seconds() {
    assert_eq!(Failure::Timeout { timeout_ms: 60_000 }.to_string(), "timed out (60s)");
  }

  #[test]
  fn skip_classification() {
    assert!(Failure::CompileFailed { message: String::new() }.is_skip());
    assert!(!Failure::Timeout { timeout_ms: 1000 }.is_skip());
  }
}
