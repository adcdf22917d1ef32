//! Pass/fail judgment of one candidate against one dataset.

use std::{
  fs::{self, File},
  io::{self, BufRead, BufReader},
  time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::debug;

use crate::{
  dataset::Dataset,
  error::Failure,
  order::{canonical_sort, settle_ties, CanonicalOrder},
  registry::BuildRunSpec,
  run::{Executor, Input, Invocation, Output},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestOutcome {
  Pass,
  Fail { reason: Failure },
}

impl TestOutcome {
  pub fn is_pass(&self) -> bool {
    matches!(self, TestOutcome::Pass)
  }

  /// `PASS`, `FAIL`, or `SKIP` when the candidate never ran.
  pub fn label(&self) -> &'static str {
    match self {
      TestOutcome::Pass => "PASS",
      TestOutcome::Fail { reason } if reason.is_skip() => "SKIP",
      TestOutcome::Fail { .. } => "FAIL",
    }
  }
}

impl From<Failure> for TestOutcome {
  fn from(reason: Failure) -> Self {
    TestOutcome::Fail { reason }
  }
}

pub struct Verifier<'a> {
  executor: &'a Executor,
  timeout: Duration,
}

impl<'a> Verifier<'a> {
  pub fn new(executor: &'a Executor, timeout: Duration) -> Self {
    Self { executor, timeout }
  }

  /// Runs `spec` on `dataset` and compares its output against the dataset
  /// sorted by the harness itself. Errors are reserved for the harness's own
  /// I/O; everything the candidate does wrong is a `Fail`.
  pub fn verify(&self, dataset: &Dataset, spec: &BuildRunSpec) -> Result<TestOutcome> {
    if !dataset.exists() {
      return Ok(dataset.missing().into());
    }

    let tokens = dataset.tokens()?;
    let order = CanonicalOrder::detect(&tokens);
    debug!(?order, tokens = tokens.len(), "computing oracle");
    let oracle = canonical_sort(tokens);

    let scratch = TempDir::with_prefix("sortbench-verify-").context("tempdir")?;
    let expected_path = scratch.path().join("expected.txt");
    let actual_path = scratch.path().join("actual.txt");

    let mut expected = oracle.join("\n");
    if !expected.is_empty() {
      expected.push('\n');
    }
    fs::write(&expected_path, expected).context("write oracle")?;

    let invocation = Invocation::new(&spec.run, self.timeout)
      .stdin(Input::File(&dataset.path))
      .stdout(Output::File(&actual_path));
    let result = self.executor.run(&invocation).context("run candidate")?;

    if let Some(failure) = result.failure() {
      return Ok(failure.into());
    }

    let expected = BufReader::new(File::open(&expected_path).context("open oracle")?);
    let mut actual = fs::read(&actual_path).context("read output")?;
    if order == CanonicalOrder::Numeric {
      actual = settled(&actual);
    }

    Ok(match first_mismatch(expected, actual.as_slice()).context("compare")? {
      None => TestOutcome::Pass,
      Some(line) => Failure::OutputMismatch { line }.into(),
    })
  }
}

/// `output` with runs of numerically equal lines put in the oracle's tie
/// order, so that how a candidate arranges equal values does not matter.
fn settled(output: &[u8]) -> Vec<u8> {
  let mut lines: Vec<Vec<u8>> = output.split(|b| *b == b'\n').map(<[u8]>::to_vec).collect();
  settle_ties(&mut lines);
  lines.join(&b'\n')
}

/// The 1-based line where `actual` departs from `expected`. A lone trailing
/// empty line on either side is not a difference.
fn first_mismatch<E: BufRead, A: BufRead>(expected: E, actual: A) -> io::Result<Option<usize>> {
  let mut expected = expected.split(b'\n');
  let mut actual = actual.split(b'\n');
  let mut line = 0;

  loop {
    line += 1;

    match (expected.next().transpose()?, actual.next().transpose()?) {
      (None, None) => return Ok(None),
      (Some(e), Some(a)) if e == a => {}
      (None, Some(extra)) if extra.is_empty() => return Ok(actual.next().transpose()?.map(|_| line)),
      (Some(extra), None) if extra.is_empty() => return Ok(expected.next().transpose()?.map(|_| line)),
      _ => return Ok(Some(line)),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Instant;

  use super::*;

  struct Fixture {
    dir: TempDir,
    executor: Executor,
  }

  impl Fixture {
    fn new() -> Self {
      Self {
        dir: TempDir::new().unwrap(),
        executor: Executor::new(None),
      }
    }

    fn dataset(&self, content: &str) -> Dataset {
      let dataset = Dataset::locate(self.dir.path(), 10, "random");
      fs::create_dir_all(dataset.path.parent().unwrap()).unwrap();
      fs::write(&dataset.path, content).unwrap();
      dataset
    }

    fn verify(&self, dataset: &Dataset, script: &str) -> TestOutcome {
      self.verify_with_timeout(dataset, script, Duration::from_secs(10))
    }

    fn verify_with_timeout(&self, dataset: &Dataset, script: &str, timeout: Duration) -> TestOutcome {
      let spec = BuildRunSpec::interpreted(
        self.dir.path().to_path_buf(),
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
      );
      Verifier::new(&self.executor, timeout).verify(dataset, &spec).unwrap()
    }
  }

  fn mismatch(expected: &str, actual: &str) -> Option<usize> {
    first_mismatch(expected.as_bytes(), actual.as_bytes()).unwrap()
  }

  #[test]
  fn conforming_candidate_passes() {
    let fixture = Fixture::new();
    let dataset = fixture.dataset("3\n1\n2\n");

    assert_eq!(fixture.verify(&dataset, "sort -n"), TestOutcome::Pass);
  }

  #[test]
  fn duplicates_pass() {
    let fixture = Fixture::new();
    let dataset = fixture.dataset("2\n2\n1\n");

    assert_eq!(fixture.verify(&dataset, "sort -n"), TestOutcome::Pass);
  }

  #[test]
  fn equal_values_may_come_out_in_any_order() {
    let fixture = Fixture::new();
    let pair = fixture.dataset("1.0\n1\n");
    assert_eq!(fixture.verify(&pair, "printf '1\\n1.0\\n'"), TestOutcome::Pass);
    assert_eq!(fixture.verify(&pair, "printf '1.0\\n1\\n'"), TestOutcome::Pass);

    let dataset = fixture.dataset("1.0\n1\n2\n1.00\n");

    assert_eq!(fixture.verify(&dataset, "printf '1\\n1.0\\n1.00\\n2\\n'"), TestOutcome::Pass);
    assert_eq!(fixture.verify(&dataset, "printf '1.00\\n1.0\\n1\\n2\\n'"), TestOutcome::Pass);
    assert_eq!(
      fixture.verify(&dataset, "printf '1\\n1.0\\n2\\n1.00\\n'"),
      TestOutcome::from(Failure::OutputMismatch { line: 3 })
    );
  }

  #[test]
  fn empty_input_passes() {
    let fixture = Fixture::new();
    let dataset = fixture.dataset("");

    assert_eq!(fixture.verify(&dataset, "cat"), TestOutcome::Pass);
    assert_eq!(fixture.verify(&dataset, "echo"), TestOutcome::Pass);
  }

  #[test]
  fn wrong_order_is_a_mismatch() {
    let fixture = Fixture::new();
    let dataset = fixture.dataset("3\n1\n2\n");

    let outcome = fixture.verify(&dataset, "printf '1\\n3\\n2\\n'");

    assert_eq!(outcome, TestOutcome::from(Failure::OutputMismatch { line: 2 }));
    assert_eq!(outcome.label(), "FAIL");
  }

  #[test]
  fn non_zero_exit_is_reported_with_stderr() {
    let fixture = Fixture::new();
    let dataset = fixture.dataset("1\n");

    let outcome = fixture.verify(&dataset, "echo 'index out of range' >&2; exit 2");

    assert_eq!(
      outcome,
      TestOutcome::from(Failure::NonZeroExit {
        code: Some(2),
        signal: None,
        stderr: "index out of range".to_string(),
      })
    );
  }

  #[test]
  fn hanging_candidate_times_out() {
    let fixture = Fixture::new();
    let dataset = fixture.dataset("1\n");

    let start = Instant::now();
    let outcome = fixture.verify_with_timeout(&dataset, "sleep 30", Duration::from_millis(300));

    assert_eq!(outcome, TestOutcome::from(Failure::Timeout { timeout_ms: 300 }));
    assert!(start.elapsed() < Duration::from_secs(5));
  }

  #[test]
  fn missing_dataset_is_skipped() {
    let fixture = Fixture::new();
    let dataset = Dataset::locate(fixture.dir.path(), 10, "reverse");

    let outcome = fixture.verify(&dataset, "sort -n");

    assert_eq!(outcome, TestOutcome::from(dataset.missing()));
    assert_eq!(outcome.label(), "SKIP");
  }

  #[test]
  fn missing_executable() {
    let fixture = Fixture::new();
    let dataset = fixture.dataset("1\n");
    let spec = BuildRunSpec::interpreted(fixture.dir.path().to_path_buf(), vec!["no-such-sorter".to_string()]);

    let outcome = Verifier::new(&fixture.executor, DEFAULT_TIMEOUT)
      .verify(&dataset, &spec)
      .unwrap();

    assert_eq!(
      outcome,
      TestOutcome::from(Failure::ExecutableNotFound {
        program: "no-such-sorter".to_string(),
      })
    );
  }

  #[test]
  fn trailing_newline_tolerance() {
    assert_eq!(mismatch("1\n2\n", "1\n2\n"), None);
    assert_eq!(mismatch("1\n2\n", "1\n2"), None);
    assert_eq!(mismatch("1\n2\n", "1\n2\n\n"), None);
    assert_eq!(mismatch("", "\n"), None);
    assert_eq!(mismatch("1\n2\n", "1\n2\n\n\n"), Some(3));
    assert_eq!(mismatch("1\n2\n", "1\n"), Some(2));
    assert_eq!(mismatch("1\n2\n", "1\n2\n3\n"), Some(3));
    assert_eq!(mismatch("1\n", "\n1\n"), Some(1));
  }

  #[test]
  fn outcome_serializes_with_status() {
    let json = serde_json::to_value(TestOutcome::from(Failure::OutputMismatch { line: 4 })).unwrap();

    assert_eq!(json["status"], "FAIL");
    assert_eq!(json["reason"]["kind"], "output_mismatch");
    assert_eq!(serde_json::to_value(TestOutcome::Pass).unwrap()["status"], "PASS");
  }
}
