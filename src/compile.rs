use std::{fs, time::Duration};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{
  error::Failure,
  registry::BuildRunSpec,
  run::{Executor, Invocation, RunStatus},
};

/// Runs every compile step of `spec` in order, stopping at the first that
/// fails. Returns the failure, if any; `Err` only for harness I/O.
pub fn compile(executor: &Executor, spec: &BuildRunSpec, timeout: Duration) -> Result<Option<Failure>> {
  if let Some(dir) = spec.artifact.as_ref().and_then(|artifact| artifact.parent()) {
    fs::create_dir_all(dir).with_context(|| format!("create {dir:?}"))?;
  }

  for step in &spec.compile {
    info!("compiling {:?}", spec.source);
    debug!(argv = ?step.argv, "compile step");

    let invocation = Invocation::new(&step.argv, timeout).cwd(step.cwd.as_deref());
    let result = executor.run(&invocation).context("run compiler")?;

    let message = match result.status {
      RunStatus::Exited(0) => continue,
      RunStatus::NotFound => format!("compiler not found: {}", result.program),
      RunStatus::TimedOut => "compile timed out".to_string(),
      RunStatus::Exited(_) | RunStatus::Signaled(_) => {
        let stderr = result.stderr.trim();
        if stderr.is_empty() {
          String::from_utf8_lossy(&result.stdout).trim().to_string()
        } else {
          stderr.to_string()
        }
      }
    };

    return Ok(Some(Failure::CompileFailed { message }));
  }

  Ok(None)
}
