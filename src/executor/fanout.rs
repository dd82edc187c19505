// Bounded parallel fan-out of one task across many hosts

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::retry::RetryPolicy;
use super::task::{execute_on, unexpected_failure};
use super::Transport;
use crate::output::errors::FleetError;
use crate::output::terminal::ExecutionResult;
use crate::parser::ast::Task;

/// Order of results within one task's fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultOrder {
    /// As hosts finish
    #[default]
    Completion,
    /// Host-group order, buffered until the whole task is done
    Inventory,
}

/// Runs one task across hosts with at most `workers` sessions in flight
pub struct FanOut {
    transport: Arc<dyn Transport>,
    workers: usize,
    retry: RetryPolicy,
    order: ResultOrder,
}

impl FanOut {
    pub fn new(transport: Arc<dyn Transport>, workers: usize) -> Self {
        FanOut {
            transport,
            workers,
            retry: RetryPolicy::default(),
            order: ResultOrder::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_order(mut self, order: ResultOrder) -> Self {
        self.order = order;
        self
    }

    /// Run `task` on every host, one result per host.
    ///
    /// A host's failure never affects the others. Once `cancel` fires no
    /// further hosts are started; sessions already running finish and close,
    /// then `FleetError::Interrupted` is returned, even if every host had
    /// already been started.
    pub async fn run_on_hosts(
        &self,
        hosts: &[String],
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExecutionResult>, FleetError> {
        if self.workers == 0 {
            return Err(FleetError::Config {
                message: "Worker count must be at least 1".to_string(),
                suggestion: Some("Pass --workers with a positive number".to_string()),
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut running: JoinSet<(usize, ExecutionResult)> = JoinSet::new();
        let mut finished: Vec<(usize, ExecutionResult)> = Vec::with_capacity(hosts.len());
        let mut interrupted = false;

        for (index, host) in hosts.iter().enumerate() {
            // Keep collecting finished hosts while waiting for a free slot
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break None,
                    permit = semaphore.clone().acquire_owned() => break permit.ok(),
                    Some(joined) = running.join_next(), if !running.is_empty() => {
                        collect(joined, &mut finished);
                    }
                }
            };

            let Some(permit) = permit else {
                interrupted = true;
                break;
            };

            debug!(target: "fleet::fanout", host = %host, task = %task.name, "dispatching");

            let transport = self.transport.clone();
            let retry = self.retry.clone();
            let host = host.clone();
            let task = task.clone();
            running.spawn(async move {
                let worker_host = host.clone();
                let worker_task = task.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    execute_on(transport.as_ref(), &worker_host, &worker_task, &retry)
                });

                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        let reason = if e.is_panic() {
                            panic_message(e.into_panic())
                        } else {
                            e.to_string()
                        };
                        error!(target: "fleet::fanout", host = %host, error = %reason, "worker died");
                        unexpected_failure(&host, &task, &reason)
                    }
                };
                (index, result)
            });
        }

        while let Some(joined) = running.join_next().await {
            collect(joined, &mut finished);
        }

        // A cancel that lands after the last host was dispatched still aborts the run
        if interrupted || cancel.is_cancelled() {
            warn!(
                target: "fleet::fanout",
                task = %task.name,
                completed = finished.len(),
                remaining = hosts.len() - finished.len(),
                "interrupted"
            );
            return Err(FleetError::Interrupted {
                completed: finished.len(),
            });
        }

        if self.order == ResultOrder::Inventory {
            finished.sort_by_key(|(index, _)| *index);
        }

        Ok(finished.into_iter().map(|(_, result)| result).collect())
    }
}

fn collect(
    joined: Result<(usize, ExecutionResult), tokio::task::JoinError>,
    finished: &mut Vec<(usize, ExecutionResult)>,
) {
    match joined {
        Ok(entry) => finished.push(entry),
        // The wrapper future never panics; this only happens on runtime shutdown
        Err(e) => error!(target: "fleet::fanout", error = %e, "result collector lost a worker"),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
