// Playbook runner: plays and tasks in order, one fan-out per task

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::fanout::{FanOut, ResultOrder};
use super::retry::RetryPolicy;
use super::Transport;
use crate::inventory::Inventory;
use crate::output::errors::FleetError;
use crate::output::terminal::{ResultSet, RunSummary};
use crate::parser::ast::Playbook;

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum concurrent hosts per task
    pub max_parallel_hosts: usize,
    /// Connection retry policy
    pub retry: RetryPolicy,
    /// Order of results within each task
    pub result_order: ResultOrder,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_parallel_hosts: 10,
            retry: RetryPolicy::default(),
            result_order: ResultOrder::Completion,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.max_parallel_hosts == 0 {
            return Err(FleetError::Config {
                message: "Worker count must be at least 1".to_string(),
                suggestion: Some("Pass --workers with a positive number".to_string()),
            });
        }
        if self.retry.attempts == 0 {
            return Err(FleetError::Config {
                message: "Connection attempts must be at least 1".to_string(),
                suggestion: Some("Pass --connect-retries with a positive number".to_string()),
            });
        }
        Ok(())
    }
}

/// Runs whole playbooks.
///
/// Plays and the tasks inside them run strictly one after another; a task
/// starts only once the previous task has finished on every host.
pub struct Scheduler {
    fanout: FanOut,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, transport: Arc<dyn Transport>) -> Result<Self, FleetError> {
        config.validate()?;

        let fanout = FanOut::new(transport, config.max_parallel_hosts)
            .with_retry(config.retry.clone())
            .with_order(config.result_order);

        Ok(Scheduler {
            fanout,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that aborts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check that every play's host group exists
    pub fn preflight(playbook: &Playbook, inventory: &Inventory) -> Result<(), FleetError> {
        for play in &playbook.plays {
            inventory.resolve(&play.hosts)?;
        }
        Ok(())
    }

    /// Execute a playbook against an inventory.
    ///
    /// An undefined host group aborts before any host is contacted. Per-host
    /// failures are part of the returned results, never an error.
    pub async fn execute_playbook(
        &self,
        playbook: &Playbook,
        inventory: &Inventory,
    ) -> Result<ResultSet, FleetError> {
        Self::preflight(playbook, inventory)?;

        let start = Instant::now();
        let mut results = ResultSet::new();

        for (play_index, play) in playbook.plays.iter().enumerate() {
            let group = inventory.resolve(&play.hosts)?;

            if group.is_empty() {
                warn!(
                    target: "fleet::scheduler",
                    play = play_index + 1,
                    group = %group.name,
                    "No hosts in group '{}', skipping play",
                    group.name
                );
                continue;
            }

            info!(
                target: "fleet::scheduler",
                play = play_index + 1,
                group = %group.name,
                hosts = group.hosts.len(),
                tasks = play.tasks.len(),
                "starting play"
            );

            for task in &play.tasks {
                if self.cancel.is_cancelled() {
                    return Err(FleetError::Interrupted {
                        completed: results.len(),
                    });
                }

                let task_start = Instant::now();
                let batch = match self
                    .fanout
                    .run_on_hosts(&group.hosts, task, &self.cancel)
                    .await
                {
                    Ok(batch) => batch,
                    Err(FleetError::Interrupted { completed }) => {
                        return Err(FleetError::Interrupted {
                            completed: results.len() + completed,
                        })
                    }
                    Err(e) => return Err(e),
                };

                let summary = RunSummary::from_results(&batch);
                info!(
                    target: "fleet::scheduler",
                    task = %task.name,
                    ok = summary.successful,
                    failed = summary.failed,
                    elapsed_ms = task_start.elapsed().as_millis() as u64,
                    "task finished"
                );

                results.extend(batch);
            }
        }

        if self.cancel.is_cancelled() {
            return Err(FleetError::Interrupted {
                completed: results.len(),
            });
        }

        info!(
            target: "fleet::scheduler",
            results = results.len(),
            elapsed = ?round_ms(start.elapsed()),
            "playbook finished"
        );

        Ok(results)
    }
}

fn round_ms(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}
