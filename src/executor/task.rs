// Task executor: one task on one host

use std::time::Instant;

use tracing::{debug, warn};

use super::retry::RetryPolicy;
use super::session::Session;
use super::Transport;
use crate::output::terminal::ExecutionResult;
use crate::parser::ast::Task;

/// Run `task` on `hostname` through a fresh session.
///
/// Never fails: connection and execution problems are folded into the
/// returned result with `success = false`.
pub fn execute_on(
    transport: &dyn Transport,
    hostname: &str,
    task: &Task,
    retry: &RetryPolicy,
) -> ExecutionResult {
    let start = Instant::now();
    let mut result = ExecutionResult::pending(hostname, &task.name, &task.command);
    let mut session = Session::new(transport, hostname, retry.clone());

    let outcome = session.open().and_then(|()| session.run(&task.command));
    session.close();

    match outcome {
        Ok(output) => {
            debug!(
                target: "fleet::task",
                host = %hostname,
                task = %task.name,
                exit_code = output.exit_code,
                "command finished"
            );
            result.success = output.success();
            result.exit_code = output.exit_code;
            result.stdout = output.stdout;
            result.stderr = output.stderr;
        }
        Err(e) => {
            let message = e.to_string();
            warn!(target: "fleet::task", host = %hostname, task = %task.name, error = %message, "host unreachable");
            result.stderr = format!("Connection/execution error: {}", message);
            result.connection_error = Some(message);
        }
    }

    result.with_duration(start.elapsed())
}

/// Result for a host whose worker died before producing one
pub(crate) fn unexpected_failure(hostname: &str, task: &Task, error: &str) -> ExecutionResult {
    let mut result = ExecutionResult::pending(hostname, &task.name, &task.command);
    result.stderr = format!("Unexpected error: {}", error);
    result.connection_error = Some(error.to_string());
    result
}
