//! Process invocation for the executor.
//!
//! The orchestrator never spawns processes directly; it goes through a
//! [`CommandRunner`] so callers can substitute their own primitive (a
//! sandbox, a remote shell, or a timeout wrapper).

pub mod process;

use std::io;

use async_trait::async_trait;

pub use process::ProcessRunner;

/// Captured result of one command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code (-1 if terminated by a signal)
    pub exit_code: i32,

    /// Full stdout, lossily decoded as UTF-8
    pub stdout: String,

    /// Full stderr, lossily decoded as UTF-8
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Output of the no-op invocation used for an empty argv
    pub fn empty() -> Self {
        Self::new(0, String::new(), String::new())
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The process-invocation primitive: `(argv) -> (exit_code, stdout, stderr)`
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Human-readable runner name
    fn name(&self) -> &str;

    /// Run `argv` to completion and capture both streams.
    ///
    /// An empty `argv` is a no-op that succeeds with empty output. An `Err`
    /// means the process could not be started at all.
    async fn invoke(&self, argv: &[String]) -> io::Result<CommandOutput>;
}
