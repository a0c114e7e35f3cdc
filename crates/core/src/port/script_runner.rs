// Script Runner Port
// Abstraction for launching one scraper process and bounding its runtime

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::application::shutdown::ShutdownToken;

/// Everything needed to launch one scraper process
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Added on top of the inherited environment
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

/// How the process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with this code
    Exited(i32),
    /// Killed by a signal it did not ask for
    Signaled(Option<i32>),
    /// Exceeded its timeout; the process group was terminated
    TimedOut,
    /// Batch shutdown requested; the process group was terminated
    Interrupted,
}

/// Result of a finished (or terminated) process
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub termination: Termination,
    pub duration_ms: i64,
    pub pid: Option<u32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runner errors (the process could not be supervised at all)
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Process kill failed: {0}")]
    KillFailed(String),
}

/// Script Runner trait
///
/// Implementations:
/// - SubprocessRunner: spawns the interpreter in its own process group
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run to completion, timeout, or shutdown
    ///
    /// Timeout and shutdown are not errors: they come back as
    /// [`Termination::TimedOut`] / [`Termination::Interrupted`] once the
    /// process group is gone.
    async fn run(
        &self,
        invocation: &ScriptInvocation,
        shutdown: ShutdownToken,
    ) -> Result<RunOutput, RunError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Exit with code and stderr
        Exit(i32, String),
        /// Report a timeout
        Timeout,
        /// Fail to spawn
        SpawnFail(String),
        /// Panic (for task isolation testing)
        Panic(String),
        /// Wait for shutdown, then report interruption
        Hang,
    }

    type Hook = Arc<dyn Fn(&ScriptInvocation) + Send + Sync>;

    /// Mock Script Runner for testing
    ///
    /// Behavior is chosen by the script file name (last argument).
    pub struct MockScriptRunner {
        default: MockBehavior,
        per_script: Mutex<HashMap<String, MockBehavior>>,
        invocations: Mutex<Vec<ScriptInvocation>>,
        on_run: Option<Hook>,
    }

    impl MockScriptRunner {
        pub fn new(default: MockBehavior) -> Self {
            Self {
                default,
                per_script: Mutex::new(HashMap::new()),
                invocations: Mutex::new(Vec::new()),
                on_run: None,
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Exit(0, String::new()))
        }

        pub fn with_script(self, script: impl Into<String>, behavior: MockBehavior) -> Self {
            self.per_script
                .lock()
                .unwrap()
                .insert(script.into(), behavior);
            self
        }

        /// Side effect executed for every run (e.g. writing output files)
        pub fn with_hook(mut self, hook: impl Fn(&ScriptInvocation) + Send + Sync + 'static) -> Self {
            self.on_run = Some(Arc::new(hook));
            self
        }

        pub fn invocations(&self) -> Vec<ScriptInvocation> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScriptRunner for MockScriptRunner {
        async fn run(
            &self,
            invocation: &ScriptInvocation,
            mut shutdown: ShutdownToken,
        ) -> Result<RunOutput, RunError> {
            self.invocations.lock().unwrap().push(invocation.clone());

            let script = invocation.args.last().cloned().unwrap_or_default();
            let behavior = self
                .per_script
                .lock()
                .unwrap()
                .get(&script)
                .cloned()
                .unwrap_or_else(|| self.default.clone());

            if let Some(hook) = &self.on_run {
                hook(invocation);
            }

            let output = |termination| RunOutput {
                termination,
                duration_ms: 10,
                pid: Some(4242),
                stdout: String::new(),
                stderr: String::new(),
            };

            match behavior {
                MockBehavior::Exit(code, stderr) => Ok(RunOutput {
                    stderr,
                    ..output(Termination::Exited(code))
                }),
                MockBehavior::Timeout => Ok(RunOutput {
                    duration_ms: invocation.timeout.as_millis() as i64,
                    ..output(Termination::TimedOut)
                }),
                MockBehavior::SpawnFail(msg) => Err(RunError::SpawnFailed(msg)),
                MockBehavior::Panic(msg) => panic!("{}", msg),
                MockBehavior::Hang => {
                    shutdown.wait().await;
                    Ok(output(Termination::Interrupted))
                }
            }
        }
    }
}
