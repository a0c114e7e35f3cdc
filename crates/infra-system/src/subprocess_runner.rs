// Subprocess runner implementation
// reason: tokio::process for async supervision, nix for process-group signals
use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use regwatch_core::application::constants::{DEFAULT_KILL_GRACE, PIPE_DRAIN_TIMEOUT};
use regwatch_core::application::ShutdownToken;
use regwatch_core::port::{RunError, RunOutput, ScriptInvocation, ScriptRunner, Termination, TimeProvider};

/// How the wait for the child ended
enum Waited {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Interrupted,
}

/// Subprocess runner
///
/// Each script runs as the leader of a fresh process group so that a timeout
/// can take down everything it spawned (browsers, drivers, helpers).
pub struct SubprocessRunner {
    time_provider: Arc<dyn TimeProvider>,
    kill_grace: Duration,
}

impl SubprocessRunner {
    /// Create a new subprocess runner
    ///
    /// # Arguments
    /// * `time_provider` - Time provider for duration tracking
    /// * `kill_grace` - Time between SIGTERM and SIGKILL for a timed-out group
    pub fn new(time_provider: Arc<dyn TimeProvider>, kill_grace: Duration) -> Self {
        Self {
            time_provider,
            kill_grace,
        }
    }

    fn command(invocation: &ScriptInvocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    /// SIGTERM the whole group, wait for it to disappear, SIGKILL after the grace period
    #[cfg(unix)]
    async fn terminate_group(&self, child: &mut Child, pid: Option<u32>) -> Result<(), RunError> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        use regwatch_core::application::constants::KILL_POLL_INTERVAL;

        let Some(pid) = pid else {
            // Already reaped
            return Ok(());
        };
        let pgid = Pid::from_raw(pid as i32);

        info!(pgid = pid, "Sending SIGTERM to process group");
        match killpg(pgid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(RunError::KillFailed(format!("SIGTERM failed: {}", e))),
        }

        let started = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(KILL_POLL_INTERVAL).await;

            // Reap the leader so its zombie does not keep the group alive
            let _ = child.try_wait();
            if killpg(pgid, None) == Err(Errno::ESRCH) {
                debug!(pgid = pid, "Process group exited after SIGTERM");
                break;
            }

            if started.elapsed() >= self.kill_grace {
                warn!(pgid = pid, "Process group still alive after SIGTERM, sending SIGKILL");
                match killpg(pgid, Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => return Err(RunError::KillFailed(format!("SIGKILL failed: {}", e))),
                }
                break;
            }
        }

        child
            .wait()
            .await
            .map(|_| ())
            .map_err(|e| RunError::Io(e.to_string()))
    }

    #[cfg(not(unix))]
    async fn terminate_group(&self, child: &mut Child, _pid: Option<u32>) -> Result<(), RunError> {
        child
            .kill()
            .await
            .map_err(|e| RunError::KillFailed(e.to_string()))
    }
}

#[async_trait]
impl ScriptRunner for SubprocessRunner {
    async fn run(
        &self,
        invocation: &ScriptInvocation,
        mut shutdown: ShutdownToken,
    ) -> Result<RunOutput, RunError> {
        let start_time = self.time_provider.now_millis();

        let mut child = Self::command(invocation)
            .spawn()
            .map_err(|e| RunError::SpawnFailed(e.to_string()))?;
        let pid = child.id();

        info!(
            program = %invocation.program,
            args = ?invocation.args,
            working_dir = %invocation.working_dir.display(),
            pid = ?pid,
            timeout_secs = invocation.timeout.as_secs(),
            "Spawned scraper process"
        );

        let mut stdout = drain(child.stdout.take());
        let mut stderr = drain(child.stderr.take());

        let waited = tokio::select! {
            result = timeout(invocation.timeout, child.wait()) => match result {
                Ok(status) => Waited::Exited(status),
                Err(_) => Waited::TimedOut,
            },
            _ = shutdown.wait() => Waited::Interrupted,
        };

        let termination = match waited {
            Waited::Exited(Ok(status)) => termination_of(status),
            Waited::Exited(Err(e)) => {
                self.terminate_group(&mut child, pid).await?;
                return Err(RunError::Io(e.to_string()));
            }
            Waited::TimedOut => {
                warn!(pid = ?pid, timeout_secs = invocation.timeout.as_secs(), "Scraper timed out");
                self.terminate_group(&mut child, pid).await?;
                Termination::TimedOut
            }
            Waited::Interrupted => {
                warn!(pid = ?pid, "Shutdown requested, terminating scraper");
                self.terminate_group(&mut child, pid).await?;
                Termination::Interrupted
            }
        };

        let duration_ms = self.time_provider.now_millis() - start_time;
        let stdout = collect(&mut stdout).await;
        let stderr = collect(&mut stderr).await;

        info!(
            pid = ?pid,
            duration_ms = duration_ms,
            termination = ?termination,
            "Scraper process finished"
        );

        Ok(RunOutput {
            termination,
            duration_ms,
            pid,
            stdout,
            stderr,
        })
    }
}

fn termination_of(status: ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        Termination::Signaled(status.signal())
    }
    #[cfg(not(unix))]
    {
        Termination::Signaled(None)
    }
}

/// Read a pipe to the end on its own task so a chatty child never blocks
fn drain<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!(error = %e, "Pipe read ended with error");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Orphaned grandchildren may hold the pipe open; stop waiting after a bound
async fn collect(handle: &mut JoinHandle<String>) -> String {
    match timeout(PIPE_DRAIN_TIMEOUT, &mut *handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(error = %e, "Pipe reader task failed");
            String::new()
        }
        Err(_) => {
            handle.abort();
            debug!("Pipe still open after process exit, output discarded");
            String::new()
        }
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new(
            Arc::new(regwatch_core::port::time_provider::SystemTimeProvider),
            DEFAULT_KILL_GRACE,
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use regwatch_core::application::shutdown_channel;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn sh(script: &str, timeout: Duration) -> ScriptInvocation {
        ScriptInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: PathBuf::from("/tmp"),
            env: BTreeMap::from([("REGWATCH_TEST".to_string(), "42".to_string())]),
            timeout,
        }
    }

    /// Zombies count as gone: orphans are reaped by whatever init the host runs
    fn running(pid: u32) -> bool {
        use sysinfo::{Pid, ProcessStatus, System};
        let mut sys = System::new();
        let pid = Pid::from_u32(pid);
        sys.refresh_process(pid);
        sys.process(pid)
            .map_or(false, |p| p.status() != ProcessStatus::Zombie)
    }

    fn background_pid(stdout: &str) -> u32 {
        stdout.lines().next().unwrap().trim().parse().unwrap()
    }

    #[tokio::test]
    async fn test_run_success_captures_output_and_env() {
        let runner = SubprocessRunner::default();
        let output = runner
            .run(&sh("echo hello $REGWATCH_TEST", Duration::from_secs(5)), ShutdownToken::never())
            .await
            .unwrap();

        assert_eq!(output.termination, Termination::Exited(0));
        assert_eq!(output.stdout.trim(), "hello 42");
        assert!(output.pid.is_some());
    }

    #[tokio::test]
    async fn test_run_failure_keeps_stderr() {
        let runner = SubprocessRunner::default();
        let output = runner
            .run(&sh("echo broken >&2; exit 3", Duration::from_secs(5)), ShutdownToken::never())
            .await
            .unwrap();

        assert_eq!(output.termination, Termination::Exited(3));
        assert_eq!(output.stderr.trim(), "broken");
    }

    #[tokio::test]
    async fn test_timeout_kills_whole_group() {
        let runner = SubprocessRunner::new(
            Arc::new(regwatch_core::port::time_provider::SystemTimeProvider),
            Duration::from_millis(500),
        );
        let output = runner
            .run(
                &sh("sleep 30 & echo $!; sleep 30", Duration::from_millis(300)),
                ShutdownToken::never(),
            )
            .await
            .unwrap();

        assert_eq!(output.termination, Termination::TimedOut);
        assert!(output.duration_ms >= 300);
        assert!(output.duration_ms < 5_000);
        assert!(!running(background_pid(&output.stdout)));
    }

    #[tokio::test]
    async fn test_sigterm_ignoring_group_is_killed() {
        let runner = SubprocessRunner::new(
            Arc::new(regwatch_core::port::time_provider::SystemTimeProvider),
            Duration::from_millis(300),
        );
        let output = runner
            .run(
                &sh(
                    "trap '' TERM; sleep 30 & echo $!; while true; do sleep 0.1; done",
                    Duration::from_millis(200),
                ),
                ShutdownToken::never(),
            )
            .await
            .unwrap();

        assert_eq!(output.termination, Termination::TimedOut);
        assert!(output.duration_ms < 5_000);
        assert!(!running(background_pid(&output.stdout)));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts() {
        let runner = SubprocessRunner::default();
        let (sender, token) = shutdown_channel();

        let handle = tokio::spawn(async move {
            runner.run(&sh("sleep 30", Duration::from_secs(60)), token).await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        sender.shutdown();

        let output = handle.await.unwrap().unwrap();
        assert_eq!(output.termination, Termination::Interrupted);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = SubprocessRunner::default();
        let mut invocation = sh("true", Duration::from_secs(1));
        invocation.program = "/nonexistent/regwatch-interpreter".to_string();

        let result = runner.run(&invocation, ShutdownToken::never()).await;
        assert!(matches!(result, Err(RunError::SpawnFailed(_))));
    }
}
