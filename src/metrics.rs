//! Parsing of GNU `time -v` accounting output.

use serde::{Deserialize, Serialize};

const WALL_TIME: &str = "Elapsed (wall clock) time";
const USER_TIME: &str = "User time (seconds)";
const SYSTEM_TIME: &str = "System time (seconds)";
const MAX_RSS: &str = "Maximum resident set size";

/// Resource usage of one execution. Each field is independent: a platform
/// that cannot report one leaves it `None` without affecting the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
  /// Seconds.
  pub wall_time: Option<f64>,
  pub user_time: Option<f64>,
  pub system_time: Option<f64>,
  pub max_rss_kb: Option<u64>,
}

impl Metrics {
  /// Names of the fields that are absent.
  pub fn missing(&self) -> Vec<String> {
    [
      ("wall_time", self.wall_time.is_none()),
      ("user_time", self.user_time.is_none()),
      ("system_time", self.system_time.is_none()),
      ("max_rss_kb", self.max_rss_kb.is_none()),
    ]
    .into_iter()
    .filter(|(_, missing)| *missing)
    .map(|(name, _)| name.to_string())
    .collect()
  }
}

/// Extracts the four recognized fields from `text`. Unrecognized lines are
/// skipped, a malformed value leaves its field empty, and only the first
/// occurrence of each label counts.
pub fn parse(text: &str) -> Metrics {
  let mut metrics = Metrics::default();

  for line in text.lines() {
    let Some((label, value)) = line.trim().rsplit_once(": ") else {
      continue;
    };
    let value = value.trim();

    if label.starts_with(WALL_TIME) {
      metrics.wall_time = metrics.wall_time.or_else(|| parse_clock(value));
    } else if label.starts_with(USER_TIME) {
      metrics.user_time = metrics.user_time.or_else(|| value.parse().ok());
    } else if label.starts_with(SYSTEM_TIME) {
      metrics.system_time = metrics.system_time.or_else(|| value.parse().ok());
    } else if label.starts_with(MAX_RSS) {
      metrics.max_rss_kb = metrics.max_rss_kb.or_else(|| value.parse().ok());
    }
  }

  metrics
}

/// `h:mm:ss` or `m:ss.ss` to seconds.
fn parse_clock(value: &str) -> Option<f64> {
  let mut seconds = 0.0;

  for part in value.split(':') {
    let part: f64 = part.parse().ok()?;
    if part < 0.0 {
      return None;
    }
    seconds = seconds * 60.0 + part;
  }

  Some(seconds)
}
