//! Engine subprocess adapter
//!
//! [`spawn`] launches the engine; [`wait_or_cancel`] waits for it while
//! watching the cancel token and the optional timeout. Spawn failures are
//! returned immediately and never retried.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rotaslice_core::{CancelToken, EngineError};

use crate::messages::{pump, EngineMessage, MessageDispatcher};

/// Everything needed to launch one engine run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Working directory of the child
    pub work_dir: PathBuf,
    /// File the engine is expected to leave behind
    pub output: PathBuf,
    pub timeout: Option<Duration>,
}

impl EngineCommand {
    pub fn new(executable: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            executable: executable.into(),
            args: Vec::new(),
            output: work_dir.join("toolpath.stream"),
            work_dir,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.executable.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a wait ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// Engine exited successfully and left its output
    Finished { output: PathBuf },
    /// Cancel token fired; the engine was terminated and reaped
    Cancelled,
}

/// One live engine subprocess
///
/// Dropping the handle kills the child.
#[derive(Debug)]
pub struct EngineHandle {
    child: Child,
    pid: Option<u32>,
    executable: String,
    output: PathBuf,
    timeout: Option<Duration>,
    cancel: CancelToken,
    reader: Option<JoinHandle<usize>>,
}

impl EngineHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Kill the child and wait for it
    ///
    /// A child that already exited makes the kill fail; that race is
    /// expected and only logged.
    pub async fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(
                "Engine {:?} exited before it could be terminated: {}",
                self.pid,
                e
            );
        }
        match self.child.wait().await {
            Ok(status) => tracing::debug!("Engine {:?} reaped ({})", self.pid, status),
            Err(e) => tracing::warn!("Failed to reap engine {:?}: {}", self.pid, e),
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    async fn drain_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            match reader.await {
                Ok(count) => tracing::debug!("Engine sent {} messages", count),
                Err(e) => tracing::warn!("Engine message reader failed: {}", e),
            }
        }
    }
}

/// Launch the engine
///
/// Decoded stdout messages are sent to `messages` when given.
pub fn spawn(
    command: &EngineCommand,
    dispatcher: MessageDispatcher,
    messages: Option<mpsc::UnboundedSender<EngineMessage>>,
    cancel: CancelToken,
) -> Result<EngineHandle, EngineError> {
    let executable = command.executable.display().to_string();
    tracing::info!("Starting engine: {}", command.display());

    let mut child = Command::new(&command.executable)
        .args(&command.args)
        .current_dir(&command.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            let err = EngineError::from_spawn_io(executable.clone(), &e);
            tracing::error!("{}", err);
            err
        })?;

    let pid = child.id();
    let reader = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(pump(stdout, dispatcher, messages)));

    tracing::debug!("Engine {} running as pid {:?}", executable, pid);
    Ok(EngineHandle {
        child,
        pid,
        executable,
        output: command.output.clone(),
        timeout: command.timeout,
        cancel,
        reader,
    })
}

/// Wait for the engine to exit, terminating it on cancel or timeout
pub async fn wait_or_cancel(mut handle: EngineHandle) -> Result<EngineOutcome, EngineError> {
    let cancel = handle.cancel.clone();
    let timeout = handle.timeout;

    let wake = tokio::select! {
        status = handle.child.wait() => Wake::Exited(status),
        _ = cancel.cancelled() => Wake::Cancelled,
        _ = deadline(timeout) => Wake::TimedOut,
    };

    let status = match wake {
        Wake::Exited(status) => status,
        Wake::Cancelled => {
            tracing::info!("Cancelling engine {:?}", handle.pid);
            handle.terminate().await;
            return Ok(EngineOutcome::Cancelled);
        }
        Wake::TimedOut => {
            let timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
            tracing::error!("Engine {:?} timed out after {}ms", handle.pid, timeout_ms);
            handle.terminate().await;
            return Err(EngineError::Timeout { timeout_ms });
        }
    };

    let status = status.map_err(|e| EngineError::Io {
        reason: e.to_string(),
    })?;
    handle.drain_reader().await;

    if !status.success() {
        let err = EngineError::Exited {
            code: status.code(),
        };
        tracing::error!("{} ({})", err, handle.executable);
        return Err(err);
    }

    if !handle.output.is_file() {
        return Err(EngineError::MissingOutput {
            path: handle.output.display().to_string(),
        });
    }

    tracing::info!("Engine {} finished", handle.executable);
    Ok(EngineOutcome::Finished {
        output: handle.output.clone(),
    })
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut,
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let command = EngineCommand::new("/opt/engine", "/tmp/run")
            .arg("slice")
            .args(["-j", "request.json"])
            .with_timeout(Some(Duration::from_secs(5)));
        assert_eq!(command.output, PathBuf::from("/tmp/run/toolpath.stream"));
        assert_eq!(command.display(), "/opt/engine slice -j request.json");
        assert_eq!(command.timeout, Some(Duration::from_secs(5)));
    }
}
