use std::fmt::Write;

use anyhow::Result;

use crate::{report::Report, stats::BenchmarkCell};

const COLUMN_WIDTH: usize = 14;
const COLUMN_PADDING: &str = "  ";

fn format_header(key_width: usize) -> String {
  let header = [
    format!("{:<COLUMN_WIDTH$}", "language"),
    format!("{:<key_width$}", "cell"),
  ]
  .into_iter()
  .chain(
    ["avg time (s)", "stddev (s)", "avg mem (KB)", "runs ok"]
      .into_iter()
      .map(|col| format!("{col:>COLUMN_WIDTH$}")),
  )
  .collect::<Vec<_>>()
  .join(COLUMN_PADDING);

  format!("{header}\n{}", "=".repeat(header.len()))
}

fn seconds(value: Option<f64>) -> String {
  value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

fn kilobytes(value: Option<f64>) -> String {
  value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.0}"))
}

fn format_row(language: &str, key: &str, key_width: usize, cell: &BenchmarkCell) -> String {
  let ok = cell.runs.len() - cell.failed_runs();
  let runs = match &cell.failure {
    Some(_) => "skipped".to_string(),
    None => format!("{ok}/{}", cell.runs.len()),
  };

  [
    format!("{language:<COLUMN_WIDTH$}"),
    format!("{key:<key_width$}"),
  ]
  .into_iter()
  .chain(
    [
      seconds(cell.summary.avg_time),
      seconds(cell.summary.stddev_time),
      kilobytes(cell.summary.avg_memory_kb),
      runs,
    ]
    .into_iter()
    .map(|col| format!("{col:>COLUMN_WIDTH$}")),
  )
  .collect::<Vec<_>>()
  .join(COLUMN_PADDING)
}

/// Per-cell summary table, one block per language.
pub fn format(report: &Report<BenchmarkCell>) -> Result<String> {
  let key_width = report
    .results
    .values()
    .flat_map(|cells| cells.keys())
    .map(String::len)
    .chain(["cell".len()])
    .max()
    .unwrap_or_default();

  let mut table = String::new();

  writeln!(table, "{}", format_header(key_width))?;

  for (language, cells) in &report.results {
    let mut width = 0;
    for (key, cell) in cells {
      let row = format_row(language, key, key_width, cell);
      width = row.len();
      writeln!(table, "{row}")?;
    }
    writeln!(table, "{}", "-".repeat(width))?;
  }

  Ok(table)
}

#[cfg(test)]
mod tests {
  use std::{collections::BTreeMap, path::PathBuf};

  use super::*;
  use crate::{
    error::Failure,
    metrics::Metrics,
    report::MachineMetadata,
    stats::RunRecord,
  };

  fn run(user_time: f64) -> RunRecord {
    RunRecord {
      repetition: 1,
      exit_code: Some(0),
      metrics: Metrics {
        user_time: Some(user_time),
        max_rss_kb: Some(2048),
        ..Metrics::default()
      },
      failure: None,
      warning: None,
      log: PathBuf::from("run1.log"),
    }
  }

  #[test]
  fn table_has_a_row_per_cell() {
    let mut rust = BTreeMap::new();
    rust.insert("quick_1000_random".to_string(), BenchmarkCell::from_runs(vec![run(0.5), run(1.5)]));
    rust.insert(
      "merge_1000_random".to_string(),
      BenchmarkCell::not_run(Failure::CompileFailed { message: "rustc: error".to_string() }),
    );

    let report = Report {
      metadata: MachineMetadata::capture(),
      results: BTreeMap::from([("rust".to_string(), rust)]),
    };

    let table = format(&report).unwrap();
    let lines: Vec<&str> = table.lines().collect();

    assert!(lines[0].starts_with("language"));
    assert!(lines[1].chars().all(|c| c == '='));
    assert!(lines[2].contains("merge_1000_random") && lines[2].contains("n/a") && lines[2].contains("skipped"));
    assert!(lines[3].contains("quick_1000_random") && lines[3].contains("1.0000") && lines[3].contains("2/2"));
    assert_eq!(lines[2].len(), lines[0].len());
  }

  #[test]
  fn long_keys_widen_the_cell_column() {
    let cells = BTreeMap::from([
      ("insertion_1000000_nearly_sorted".to_string(), BenchmarkCell::from_runs(vec![run(2.0)])),
      ("quick_10_random".to_string(), BenchmarkCell::from_runs(vec![run(0.1)])),
    ]);
    let report = Report {
      metadata: MachineMetadata::capture(),
      results: BTreeMap::from([("cpp".to_string(), cells)]),
    };

    let table = format(&report).unwrap();
    let lines: Vec<&str> = table.lines().collect();

    assert_eq!(lines[1].len(), lines[0].len());
    assert_eq!(lines[2].len(), lines[0].len());
    assert_eq!(lines[3].len(), lines[0].len());
    assert_eq!(lines[2].find("  2.0000"), lines[3].find("  0.1000"));
  }
}
