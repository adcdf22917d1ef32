use std::{
  io,
  path::Path,
  process::{Child, Command, ExitStatus},
  time::Duration,
};

use anyhow::{Context, Result};
use tempfile::{Builder, NamedTempFile};
use wait_timeout::ChildExt as WaitExt;

#[extend::ext]
pub impl ExitStatus {
  /// The signal that terminated the process, if it did not exit normally.
  fn terminating_signal(&self) -> Option<i32> {
    #[cfg(unix)]
    {
      std::os::unix::process::ExitStatusExt::signal(self)
    }
    #[cfg(not(unix))]
    {
      None
    }
  }
}

#[extend::ext]
pub impl Child {
  /// Waits for the child to exit. On timeout, kills the child's process group,
  /// reaps the child, and returns `Ok(None)`.
  fn wait_or_kill(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
    if let Some(status) = self.wait_timeout(timeout).context("wait")? {
      return Ok(Some(status));
    }

    self.kill_group().context("kill")?;
    self.wait().context("reap")?;

    Ok(None)
  }

  /// Kills the process group led by this child. Falls back to killing just
  /// the child when there is no such group.
  fn kill_group(&mut self) -> io::Result<()> {
    #[cfg(unix)]
    {
      use nix::{
        sys::signal::{killpg, Signal},
        unistd::Pid,
      };

      if killpg(Pid::from_raw(self.id() as i32), Signal::SIGKILL).is_ok() {
        return Ok(());
      }
    }

    self.kill()
  }
}

#[extend::ext]
pub impl Command {
  /// A command that leads its own process group, so that a timeout can take
  /// down everything it spawned.
  fn isolated<P: AsRef<Path>>(program: P, args: &[String]) -> Command {
    let mut command = Command::new(program.as_ref());
    command.args(args);

    #[cfg(unix)]
    {
      use std::os::unix::process::CommandExt as _;
      command.process_group(0);
    }

    command
  }
}

#[extend::ext]
pub impl NamedTempFile {
  /// A temporary file next to `path`, so that persisting onto `path` is an
  /// atomic rename.
  fn beside(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };

    Builder::new().prefix(".tmp-").tempfile_in(dir).context("tempfile")
  }
}
