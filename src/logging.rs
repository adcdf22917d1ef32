use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Diagnostics go to stderr; stdout carries only PASS/FAIL lines, tallies
/// and tables. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str) {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

  tracing_subscriber::registry().with(filter).with(layer).init();
}
