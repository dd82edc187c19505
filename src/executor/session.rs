// Single-command remote session with an explicit lifecycle

use std::fmt;

use tracing::debug;

use super::retry::{RetryPolicy, RetryResult};
use super::{CommandOutput, RemoteShell, Transport, TransportError};

/// Observable session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unopened,
    Open,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Unopened => "unopened",
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

enum State {
    Unopened,
    Open(Box<dyn RemoteShell>),
    Closed,
}

/// One remote shell to one host, used for at most one command.
///
/// `Unopened -> Open -> Closed`. A failed `open` goes straight to `Closed`.
/// Dropping an open session closes it.
pub struct Session<'t> {
    host: String,
    transport: &'t dyn Transport,
    retry: RetryPolicy,
    state: State,
}

impl<'t> Session<'t> {
    pub fn new(transport: &'t dyn Transport, host: impl Into<String>, retry: RetryPolicy) -> Self {
        Session {
            host: host.into(),
            transport,
            retry,
            state: State::Unopened,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            State::Unopened => SessionStatus::Unopened,
            State::Open(_) => SessionStatus::Open,
            State::Closed => SessionStatus::Closed,
        }
    }

    /// Connect, retrying per the session's policy.
    ///
    /// Fails with `ConnectFailed` carrying the last underlying error once
    /// every attempt is used up.
    pub fn open(&mut self) -> Result<(), TransportError> {
        self.expect(SessionStatus::Unopened)?;

        let transport = self.transport;
        let host = self.host.clone();
        let outcome = self.retry.run_blocking(&host, |attempt| {
            debug!(target: "fleet::session", host = %host, attempt, "connecting");
            transport.connect(&host)
        });

        match outcome {
            RetryResult::Success(shell) => {
                debug!(target: "fleet::session", host = %self.host, "session open");
                self.state = State::Open(shell);
                Ok(())
            }
            RetryResult::Failed {
                last_error,
                attempts,
                total_time,
            } => {
                debug!(
                    target: "fleet::session",
                    host = %self.host,
                    attempts,
                    elapsed_ms = total_time.as_millis() as u64,
                    "giving up on connection"
                );
                self.state = State::Closed;
                Err(TransportError::ConnectFailed {
                    host: self.host.clone(),
                    attempts,
                    last_error: Box::new(last_error),
                })
            }
        }
    }

    /// Run one command on the open session.
    ///
    /// A transport failure while running becomes a synthetic result with
    /// exit code -1 and the diagnostic in stderr.
    pub fn run(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        if let State::Open(shell) = &mut self.state {
            return Ok(match shell.exec(command) {
                Ok(output) => output,
                Err(e) => CommandOutput {
                    stdout: String::new(),
                    stderr: format!("Execution error: {}", e),
                    exit_code: -1,
                },
            });
        }

        Err(self.state_error(SessionStatus::Open))
    }

    /// Release the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if let State::Open(mut shell) = std::mem::replace(&mut self.state, State::Closed) {
            shell.disconnect();
            debug!(target: "fleet::session", host = %self.host, "session closed");
        }
    }

    fn expect(&self, expected: SessionStatus) -> Result<(), TransportError> {
        if self.status() == expected {
            Ok(())
        } else {
            Err(self.state_error(expected))
        }
    }

    fn state_error(&self, expected: SessionStatus) -> TransportError {
        TransportError::InvalidState {
            host: self.host.clone(),
            expected,
            actual: self.status(),
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
