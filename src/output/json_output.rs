// JSON output for machine consumption (NDJSON)

use serde::Serialize;
use tracing::error;

use super::terminal::{ExecutionResult, RunSummary};

#[derive(Serialize)]
struct ResultEvent<'a> {
    event: &'static str,
    #[serde(flatten)]
    result: &'a ExecutionResult,
    duration_ms: u64,
}

#[derive(Serialize)]
struct SummaryEvent {
    event: &'static str,
    #[serde(flatten)]
    summary: RunSummary,
}

/// Emits one JSON object per result followed by a summary object
pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        JsonOutput
    }

    pub fn result_event(&self, result: &ExecutionResult) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(ResultEvent {
            event: "task_result",
            result,
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
        })
    }

    pub fn summary_event(&self, results: &[ExecutionResult]) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(SummaryEvent {
            event: "summary",
            summary: RunSummary::from_results(results),
        })
    }

    /// NDJSON: one line per result, then the summary line
    pub fn format_results(&self, results: &[ExecutionResult]) -> serde_json::Result<String> {
        let mut lines = Vec::with_capacity(results.len() + 1);
        for result in results {
            lines.push(self.result_event(result)?.to_string());
        }
        lines.push(self.summary_event(results)?.to_string());
        Ok(lines.join("\n"))
    }

    pub fn print_results(&self, results: &[ExecutionResult]) {
        match self.format_results(results) {
            Ok(text) => println!("{}", text),
            Err(e) => error!(target: "fleet::output", error = %e, "failed to encode results as JSON"),
        }
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ndjson_lines() {
        let mut failed = ExecutionResult::pending("h2", "check", "echo ok");
        failed.connection_error = Some("timed out".to_string());
        let ok = ExecutionResult {
            success: true,
            exit_code: 0,
            stdout: "ok\n".to_string(),
            ..ExecutionResult::pending("h1", "check", "echo ok")
        };

        let text = JsonOutput::new().format_results(&[ok, failed]).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["hostname"], "h1");
        assert_eq!(lines[0]["exit_code"], 0);
        assert_eq!(lines[1]["connection_error"], "timed out");
        assert_eq!(lines[2]["event"], "summary");
        assert_eq!(lines[2]["failed"], 1);
    }

    #[test]
    fn test_result_event_carries_every_result_field() {
        let result = ExecutionResult {
            stderr: "boom\n".to_string(),
            exit_code: 2,
            ..ExecutionResult::pending("web1", "deploy", "make install")
        }
        .with_duration(Duration::from_millis(1500));

        let event = JsonOutput::new().result_event(&result).unwrap();
        let fields = event.as_object().unwrap();

        assert_eq!(event["event"], "task_result");
        assert_eq!(event["task_name"], "deploy");
        assert_eq!(event["command"], "make install");
        assert_eq!(event["success"], false);
        assert_eq!(event["stderr"], "boom\n");
        assert_eq!(event["exit_code"], 2);
        assert_eq!(event["connection_error"], serde_json::Value::Null);
        assert_eq!(event["duration_ms"], 1500);
        assert!(!fields.contains_key("duration"));
        assert_eq!(fields.len(), 10);
    }

    #[test]
    fn test_empty_results_still_summarised() {
        let text = JsonOutput::new().format_results(&[]).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(summary["total"], 0);
    }
}
