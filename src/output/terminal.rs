// Terminal output for fleet results

use std::time::Duration;

use colored::*;
use serde::Serialize;

const RULE_WIDTH: usize = 60;

/// Result of running one task on one host.
///
/// Produced exactly once per attempted (host, task) pair. Failures of any
/// kind are recorded here rather than raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub hostname: String,
    pub task_name: String,
    pub command: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Set when no remote exit status was ever produced
    pub connection_error: Option<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl ExecutionResult {
    /// A result that has not run yet: failed, exit code -1
    pub fn pending(
        hostname: impl Into<String>,
        task_name: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        ExecutionResult {
            hostname: hostname.into(),
            task_name: task_name.into(),
            command: command.into(),
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            connection_error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Ordered results of a whole run
pub type ResultSet = Vec<ExecutionResult>;

/// Success/failure tally over a result set
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        RunSummary {
            total: results.len(),
            successful,
            failed: results.len() - successful,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Human-readable result printer
pub struct TerminalOutput {
    verbose: bool,
}

impl TerminalOutput {
    pub fn new(color: bool, verbose: bool) -> Self {
        // Respect NO_COLOR (https://no-color.org/) and plain pipes
        if !color || std::env::var("NO_COLOR").is_ok() || !console::Term::stdout().is_term() {
            colored::control::set_override(false);
        }

        TerminalOutput { verbose }
    }

    /// Format a single task result
    pub fn format_result(&self, result: &ExecutionResult) -> String {
        let mut lines = Vec::new();

        let status = if result.success {
            "SUCCESS".green().bold()
        } else {
            "FAILED".red().bold()
        };
        lines.push(format!(
            "[{}] {} - {}",
            status,
            result.hostname.white().bold(),
            result.task_name
        ));

        lines.push(format!("{} {}", "Command:".dimmed(), result.command));

        let stdout = result.stdout.trim();
        if !stdout.is_empty() {
            lines.push(format!("{} {}", "Output:".dimmed(), stdout));
        }

        let stderr = result.stderr.trim();
        if !stderr.is_empty() {
            lines.push(format!("{} {}", "Error:".dimmed(), stderr.red()));
        }

        lines.push(format!("{} {}", "Exit Code:".dimmed(), result.exit_code));

        if self.verbose {
            lines.push(format!(
                "{} {:.2}s",
                "Duration:".dimmed(),
                result.duration.as_secs_f64()
            ));
        }

        lines.push(String::new());
        lines.join("\n")
    }

    /// Format all results with a banner and final tally
    pub fn format_results(&self, results: &[ExecutionResult]) -> String {
        if results.is_empty() {
            return "No results.".to_string();
        }

        let rule = "=".repeat(RULE_WIDTH);
        let mut output = vec![
            rule.clone(),
            "EXECUTION RESULTS".bold().to_string(),
            rule.clone(),
            String::new(),
        ];

        for result in results {
            output.push(self.format_result(result));
        }

        let summary = RunSummary::from_results(results);
        let failed = if summary.has_failures() {
            format!("Failed: {}", summary.failed).red().bold()
        } else {
            format!("Failed: {}", summary.failed).normal()
        };

        output.push(rule.clone());
        output.push(format!(
            "Total: {} | {} | {}",
            summary.total,
            format!("Successful: {}", summary.successful).green(),
            failed
        ));
        output.push(rule);

        output.join("\n")
    }

    pub fn print_results(&self, results: &[ExecutionResult]) {
        println!("{}", self.format_results(results));
    }
}
