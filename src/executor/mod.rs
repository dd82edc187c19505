// Executor module - remote command execution engine

use thiserror::Error;

pub mod fanout;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod ssh;
pub mod task;

#[cfg(test)]
pub(crate) mod fake;

pub use fanout::{FanOut, ResultOrder};
pub use retry::{RetryPolicy, RetryResult};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use session::{Session, SessionStatus};
pub use ssh::{HostKeyPolicy, SshConfig, SshTransport};
pub use task::execute_on;

/// Opens remote shells. Implementations block the calling thread.
pub trait Transport: Send + Sync {
    /// Make one connection attempt to `host`, including authentication
    fn connect(&self, host: &str) -> Result<Box<dyn RemoteShell>, TransportError>;
}

/// An authenticated connection to a single host
pub trait RemoteShell: Send {
    /// Run a command to completion
    fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError>;

    /// Release the connection. Called exactly once.
    fn disconnect(&mut self);
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors raised by a transport or a session
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}: {message}")]
    Connect { host: String, message: String },

    #[error("SSH handshake with {host} failed: {message}")]
    Handshake { host: String, message: String },

    #[error("Host key verification failed for {host}: {message}")]
    HostKey { host: String, message: String },

    #[error("Authentication failed for {user}@{host}: no usable key in agent or ~/.ssh")]
    Auth { host: String, user: String },

    #[error("Remote channel on {host} failed: {message}")]
    Exec { host: String, message: String },

    #[error("Failed to connect to {host} after {attempts} attempt(s): {last_error}")]
    ConnectFailed {
        host: String,
        attempts: u32,
        #[source]
        last_error: Box<TransportError>,
    },

    #[error("Session for {host} is {actual}, expected {expected}")]
    InvalidState {
        host: String,
        expected: SessionStatus,
        actual: SessionStatus,
    },
}
