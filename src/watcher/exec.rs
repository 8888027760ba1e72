//! Subprocess execution strategies.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::error::DispatchError;

/// How commands are launched relative to the watch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run on the loop task; the next event waits for the command to exit.
    #[default]
    Inline,
    /// Run on a bounded set of background tasks. No ordering between commands.
    Pooled,
}

/// A rendered command ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Name of the rule that produced the command.
    pub rule: String,
    /// File that triggered the rule.
    pub path: PathBuf,
    /// Rendered command string passed to the shell.
    pub command: String,
}

/// What an executor did with an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecReport {
    /// The command ran to completion successfully.
    Completed,
    /// The command was handed to a background task.
    Submitted,
}

/// Launches invocations.
pub trait Executor: Send + Sync {
    fn execute(&self, invocation: Invocation) -> BoxFuture<'_, Result<ExecReport, DispatchError>>;

    /// Stop accepting work and wait for commands already started to exit.
    fn drain(&self) -> BoxFuture<'_, ()> {
        futures::future::ready(()).boxed()
    }
}

/// `shell flag command`, with output forwarded to the log.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    shell: String,
    flag: String,
}

impl ShellCommand {
    pub fn new(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }

    /// Run `invocation` and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be spawned or the command exits
    /// unsuccessfully.
    pub async fn run(&self, invocation: &Invocation) -> Result<(), DispatchError> {
        let mut child = Command::new(&self.shell)
            .arg(&self.flag)
            .arg(&invocation.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DispatchError::Spawn {
                shell: self.shell.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            rule = %invocation.rule,
            path = %invocation.path.display(),
            command = %invocation.command,
            pid = child.id(),
            "Running command"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, (), ()) = tokio::join!(
            child.wait(),
            forward_lines(stdout, &invocation.rule, "stdout"),
            forward_lines(stderr, &invocation.rule, "stderr"),
        );

        let status = status.map_err(|e| DispatchError::Spawn {
            shell: self.shell.clone(),
            reason: e.to_string(),
        })?;

        check_status(status, &invocation.command)
    }
}

fn check_status(status: ExitStatus, command: &str) -> Result<(), DispatchError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(DispatchError::NonZeroExit {
            command: command.to_string(),
            code,
        }),
        None => Err(DispatchError::Signaled {
            command: command.to_string(),
        }),
    }
}

async fn forward_lines<R>(reader: Option<R>, rule: &str, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(rule, stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(rule, stream, error = %e, "Failed to read command output");
                break;
            }
        }
    }
}

/// Runs each command to completion before returning.
#[derive(Debug, Clone)]
pub struct InlineExecutor {
    shell: ShellCommand,
}

impl InlineExecutor {
    #[must_use]
    pub fn new(shell: ShellCommand) -> Self {
        Self { shell }
    }
}

impl Executor for InlineExecutor {
    fn execute(&self, invocation: Invocation) -> BoxFuture<'_, Result<ExecReport, DispatchError>> {
        async move {
            self.shell.run(&invocation).await?;
            Ok(ExecReport::Completed)
        }
        .boxed()
    }
}

/// Runs commands on background tasks, at most `workers` at a time.
///
/// `execute` waits for a free slot, so a saturated pool applies
/// backpressure to the watch loop. Running commands are not cancelled when
/// the loop stops; [`Executor::drain`] waits for them.
#[derive(Debug, Clone)]
pub struct PooledExecutor {
    shell: Arc<ShellCommand>,
    slots: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl PooledExecutor {
    #[must_use]
    pub fn new(shell: ShellCommand, workers: usize) -> Self {
        Self {
            shell: Arc::new(shell),
            slots: Arc::new(Semaphore::new(workers.max(1))),
            tasks: TaskTracker::new(),
        }
    }

    /// Number of commands that can start right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Number of commands still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

impl Executor for PooledExecutor {
    fn execute(&self, invocation: Invocation) -> BoxFuture<'_, Result<ExecReport, DispatchError>> {
        async move {
            let permit = Arc::clone(&self.slots)
                .acquire_owned()
                .await
                .map_err(|_| DispatchError::Spawn {
                    shell: self.shell.shell.clone(),
                    reason: "executor pool closed".to_string(),
                })?;

            let shell = Arc::clone(&self.shell);
            self.tasks.spawn(async move {
                if let Err(e) = shell.run(&invocation).await {
                    tracing::error!(rule = %invocation.rule, error = %e, "Command failed");
                }
                drop(permit);
            });

            Ok(ExecReport::Submitted)
        }
        .boxed()
    }

    fn drain(&self) -> BoxFuture<'_, ()> {
        async move {
            self.tasks.close();
            let running = self.tasks.len();
            if running > 0 {
                tracing::info!(running, "Waiting for running commands to exit");
            }
            self.tasks.wait().await;
        }
        .boxed()
    }
}

/// Build the executor for `mode`.
#[must_use]
pub fn executor_for(mode: ExecutionMode, shell: ShellCommand, workers: usize) -> Arc<dyn Executor> {
    match mode {
        ExecutionMode::Inline => Arc::new(InlineExecutor::new(shell)),
        ExecutionMode::Pooled => Arc::new(PooledExecutor::new(shell, workers)),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sh() -> ShellCommand {
        ShellCommand::new("/bin/sh", "-c")
    }

    fn invocation(command: &str) -> Invocation {
        Invocation {
            rule: "test".to_string(),
            path: PathBuf::from("/w/a.txt"),
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn test_run_success() {
        assert!(sh().run(&invocation("echo hello; echo oops >&2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_non_zero_exit() {
        let err = sh().run(&invocation("exit 3")).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::NonZeroExit {
                command: "exit 3".to_string(),
                code: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_run_spawn_failure() {
        let shell = ShellCommand::new("/nonexistent/shell", "-c");
        let err = shell.run(&invocation("true")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_inline_waits_for_command() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("done");
        let executor = InlineExecutor::new(sh());

        let report = executor
            .execute(invocation(&format!("sleep 0.1; touch {}", marker.display())))
            .await
            .unwrap();

        assert_eq!(report, ExecReport::Completed);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_pooled_runs_in_background() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("done");
        let executor = PooledExecutor::new(sh(), 2);

        let report = executor
            .execute(invocation(&format!("touch {}", marker.display())))
            .await
            .unwrap();
        assert_eq!(report, ExecReport::Submitted);

        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_pooled_bounds_concurrency() {
        let executor = PooledExecutor::new(sh(), 1);
        assert_eq!(executor.available(), 1);

        executor.execute(invocation("sleep 0.2")).await.unwrap();
        assert_eq!(executor.available(), 0);

        // Waits for the first command to release its slot.
        executor.execute(invocation("true")).await.unwrap();
    }

    #[test]
    fn test_pooled_drain_waits_for_running_commands() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("done");
        let command = format!("sleep 0.3; echo progress; touch {}", marker.display());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let executor = PooledExecutor::new(sh(), 2);
            executor.execute(invocation(&command)).await.unwrap();
            assert_eq!(executor.in_flight(), 1);

            executor.drain().await;
            assert_eq!(executor.in_flight(), 0);
        });
        drop(runtime);

        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_inline_drain_is_immediate() {
        let executor = InlineExecutor::new(sh());
        tokio::time::timeout(Duration::from_secs(1), executor.drain())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_killed_by_signal() {
        let err = sh().run(&invocation("kill -9 $$")).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::Signaled {
                command: "kill -9 $$".to_string(),
            }
        );
    }

    #[test]
    fn test_execution_mode_default() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::Inline);
    }
}
