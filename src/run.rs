//! The single process-spawn abstraction every component goes through.

use std::{
  env,
  fs::{self, File},
  io::{Read, Seek},
  path::{Path, PathBuf},
  process::{Command, Stdio},
  time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{
  error::Failure,
  ext::{ChildExt, CommandExt, ExitStatusExt},
  metrics::{self, Metrics},
};

/// Longest stderr excerpt carried in a [`Failure`].
const STDERR_EXCERPT: usize = 500;

const SIGNAL_PREFIX: &str = "Command terminated by signal ";

pub enum Input<'a> {
  Null,
  File(&'a Path),
}

pub enum Output<'a> {
  /// Collect stdout into [`ExecutionResult::stdout`].
  Capture,
  /// Write stdout straight to a file; `stdout` stays empty.
  File(&'a Path),
}

pub struct Invocation<'a> {
  pub argv: &'a [String],
  pub cwd: Option<&'a Path>,
  pub stdin: Input<'a>,
  pub stdout: Output<'a>,
  pub timeout: Duration,
}

impl<'a> Invocation<'a> {
  pub fn new(argv: &'a [String], timeout: Duration) -> Self {
    Self {
      argv,
      cwd: None,
      stdin: Input::Null,
      stdout: Output::Capture,
      timeout,
    }
  }

  pub fn cwd(mut self, cwd: Option<&'a Path>) -> Self {
    self.cwd = cwd;
    self
  }

  pub fn stdin(mut self, stdin: Input<'a>) -> Self {
    self.stdin = stdin;
    self
  }

  pub fn stdout(mut self, stdout: Output<'a>) -> Self {
    self.stdout = stdout;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
  Exited(i32),
  Signaled(i32),
  TimedOut,
  /// The executable could not be located; nothing was spawned.
  NotFound,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
  pub program: String,
  pub status: RunStatus,
  /// Empty unless stdout was captured and the process finished in time.
  pub stdout: Vec<u8>,
  pub stderr: String,
  pub metrics: Metrics,
  /// Whether an accounting wrapper was used, i.e. whether CPU and memory
  /// fields were expected at all.
  pub accounted: bool,
  pub timeout: Duration,
}

impl ExecutionResult {
  fn not_found(program: &str, timeout: Duration) -> Self {
    Self {
      program: program.to_string(),
      status: RunStatus::NotFound,
      stdout: Vec::new(),
      stderr: String::new(),
      metrics: Metrics::default(),
      accounted: false,
      timeout,
    }
  }

  pub fn exit_code(&self) -> Option<i32> {
    match self.status {
      RunStatus::Exited(code) => Some(code),
      _ => None,
    }
  }

  pub fn failure(&self) -> Option<Failure> {
    match self.status {
      RunStatus::Exited(0) => None,
      RunStatus::Exited(code) => Some(Failure::NonZeroExit {
        code: Some(code),
        signal: None,
        stderr: self.stderr_excerpt(),
      }),
      RunStatus::Signaled(signal) => Some(Failure::NonZeroExit {
        code: None,
        signal: Some(signal),
        stderr: self.stderr_excerpt(),
      }),
      RunStatus::TimedOut => Some(Failure::Timeout {
        timeout_ms: self.timeout.as_millis() as u64,
      }),
      RunStatus::NotFound => Some(Failure::ExecutableNotFound {
        program: self.program.clone(),
      }),
    }
  }

  /// Set when accounting ran to completion but did not yield every field.
  pub fn metrics_warning(&self) -> Option<Failure> {
    if !self.accounted || matches!(self.status, RunStatus::TimedOut | RunStatus::NotFound) {
      return None;
    }

    let missing = self.metrics.missing();
    (!missing.is_empty()).then_some(Failure::MetricsParseIncomplete { missing })
  }

  fn stderr_excerpt(&self) -> String {
    self.stderr.trim().chars().take(STDERR_EXCERPT).collect()
  }
}

pub struct Executor {
  /// GNU `time`, when available.
  time_command: Option<PathBuf>,
}

impl Executor {
  pub fn new(time_command: Option<PathBuf>) -> Self {
    let time_command = time_command.and_then(|time| {
      if is_executable(&time) {
        Some(time)
      } else {
        warn!("{time:?} not found, recording wall time only");
        None
      }
    });

    Self { time_command }
  }

  pub fn run(&self, invocation: &Invocation) -> Result<ExecutionResult> {
    let Some((program, args)) = invocation.argv.split_first() else {
      anyhow::bail!("empty argv");
    };

    let Some(resolved) = locate(program, invocation.cwd) else {
      debug!("{program:?} not found");
      return Ok(ExecutionResult::not_found(program, invocation.timeout));
    };

    let stdin = match invocation.stdin {
      Input::Null => Stdio::null(),
      Input::File(path) => File::open(path).with_context(|| format!("open {path:?}"))?.into(),
    };

    let mut captured = None;
    let stdout = match invocation.stdout {
      Output::Capture => {
        let file = tempfile::tempfile().context("stdout tempfile")?;
        let handle = file.try_clone().context("clone stdout")?;
        captured = Some(file);
        Stdio::from(handle)
      }
      Output::File(path) => File::create(path).with_context(|| format!("create {path:?}"))?.into(),
    };

    let mut stderr = tempfile::tempfile().context("stderr tempfile")?;

    let accounting = match &self.time_command {
      Some(_) => Some(NamedTempFile::new().context("accounting tempfile")?),
      None => None,
    };

    let mut command = match (&self.time_command, &accounting) {
      (Some(time), Some(accounting)) => {
        let mut wrapped = vec!["-v".to_string(), "-o".to_string()];
        wrapped.push(accounting.path().to_string_lossy().into_owned());
        wrapped.push(resolved.to_string_lossy().into_owned());
        wrapped.extend(args.iter().cloned());

        Command::isolated(time, &wrapped)
      }
      _ => Command::isolated(&resolved, args),
    };

    if let Some(cwd) = invocation.cwd {
      command.current_dir(cwd);
    }
    command
      .stdin(stdin)
      .stdout(stdout)
      .stderr(stderr.try_clone().context("clone stderr")?);

    debug!(argv = ?invocation.argv, cwd = ?invocation.cwd, "spawning");

    let start = Instant::now();
    let mut child = match command.spawn() {
      Ok(child) => child,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        return Ok(ExecutionResult::not_found(program, invocation.timeout));
      }
      Err(err) => return Err(err).with_context(|| format!("spawn {program:?}")),
    };
    let exit = child.wait_or_kill(invocation.timeout)?;
    let elapsed = start.elapsed();
    drop(command);

    let mut stderr_bytes = Vec::new();
    stderr.rewind().context("rewind stderr")?;
    stderr.read_to_end(&mut stderr_bytes).context("read stderr")?;

    let accounting_text = match &accounting {
      Some(file) if exit.is_some() => fs::read_to_string(file.path()).unwrap_or_default(),
      _ => String::new(),
    };

    let status = match exit {
      None => RunStatus::TimedOut,
      Some(status) => match (parse_signal(&accounting_text), status.code(), status.terminating_signal()) {
        (Some(signal), _, _) => RunStatus::Signaled(signal),
        (None, Some(code), _) => RunStatus::Exited(code),
        (None, None, Some(signal)) => RunStatus::Signaled(signal),
        (None, None, None) => RunStatus::Exited(-1),
      },
    };

    let mut stdout_bytes = Vec::new();
    if let (Some(mut file), Some(_)) = (captured, exit) {
      file.rewind().context("rewind stdout")?;
      file.read_to_end(&mut stdout_bytes).context("read stdout")?;
    }

    let mut metrics = metrics::parse(&accounting_text);
    metrics.wall_time = metrics.wall_time.or(Some(elapsed.as_secs_f64()));

    Ok(ExecutionResult {
      program: program.clone(),
      status,
      stdout: stdout_bytes,
      stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
      metrics,
      accounted: accounting.is_some(),
      timeout: invocation.timeout,
    })
  }
}

/// The wrapper exits with `128 + signal` for a signaled child, so the
/// signal is read back from its report instead.
fn parse_signal(accounting: &str) -> Option<i32> {
  accounting
    .lines()
    .find_map(|line| line.trim().strip_prefix(SIGNAL_PREFIX))
    .and_then(|signal| signal.trim().parse().ok())
}

/// Resolves `program` the way a shell would: paths are taken relative to
/// `cwd`, bare names are searched on `PATH`.
fn locate(program: &str, cwd: Option<&Path>) -> Option<PathBuf> {
  let path = Path::new(program);

  if path.components().count() > 1 || path.is_absolute() {
    let path = match cwd {
      Some(cwd) if path.is_relative() => cwd.join(path),
      _ => path.to_path_buf(),
    };
    return is_executable(&path).then_some(path);
  }

  let paths = env::var_os("PATH")?;
  env::split_paths(&paths)
    .map(|dir| dir.join(program))
    .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
  let Ok(meta) = path.metadata() else {
    return false;
  };

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
  }
  #[cfg(not(unix))]
  {
    meta.is_file()
  }
}

/// Writes an executable stand-in for GNU `time -v -o FILE`. It runs the
/// command and reports 0.25s of user time when it exits 0 and 9s when it
/// does not; the memory line is left out unless `with_rss`.
#[cfg(test)]
pub(crate) fn stand_in_time(dir: &Path, with_rss: bool) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let rss = if with_rss { "\\tMaximum resident set size (kbytes): 1024\\n" } else { "" };
  let script = format!(
    "#!/bin/sh\n\
     shift\n\
     out=$2\n\
     shift 2\n\
     \"$@\"\n\
     code=$?\n\
     if [ $code -eq 0 ]; then user=0.25; else user=9.00; fi\n\
     printf '\\tUser time (seconds): %s\\n\\tSystem time (seconds): 0.01\\n\\tElapsed (wall clock) time (h:mm:ss or m:ss): 0:00.30\\n{rss}' $user > \"$out\"\n\
     exit $code\n"
  );

  let path = dir.join("time");
  fs::write(&path, script).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}
