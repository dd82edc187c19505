// YAML playbook parser

use std::path::Path;

use serde_yaml::{Mapping, Value as YamlValue};

use super::ast::*;
use crate::output::errors::{FleetError, ParseError, ParseErrorKind};

/// Parse a playbook from a file
pub fn parse_playbook_file(path: &Path) -> Result<Playbook, FleetError> {
    if !path.exists() {
        return Err(FleetError::Io {
            message: format!("Playbook not found: {}", path.display()),
            path: Some(path.to_path_buf()),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| FleetError::Io {
        message: format!("Failed to read playbook file: {}", e),
        path: Some(path.to_path_buf()),
    })?;

    parse_playbook(&content, path.to_string_lossy().to_string())
}

/// Parse a playbook from a string.
///
/// The document must be a list of plays, each a mapping with `hosts` and
/// `tasks`, each task a mapping with `name` and `bash`. Validation errors
/// carry the 1-based play and task index.
pub fn parse_playbook(content: &str, source_file: String) -> Result<Playbook, FleetError> {
    let yaml: YamlValue = serde_yaml::from_str(content).map_err(|e| {
        let (line, column) = extract_yaml_error_location(&e);
        FleetError::Parse(Box::new(ParseError {
            kind: ParseErrorKind::InvalidYaml,
            message: format!("Invalid YAML in playbook: {}", e),
            file: Some(source_file.clone()),
            line,
            column,
            suggestion: Some(
                "Check YAML syntax - ensure proper indentation and valid YAML".to_string(),
            ),
        }))
    })?;

    let raw_plays = match yaml {
        YamlValue::Sequence(plays) => plays,
        _ => {
            return Err(structure_error(
                "Playbook must be a list of plays",
                &source_file,
                Some("Start each play with '- hosts: <group>'"),
            ))
        }
    };

    let mut plays = Vec::with_capacity(raw_plays.len());
    for (index, raw) in raw_plays.iter().enumerate() {
        plays.push(convert_play(raw, index + 1, &source_file)?);
    }

    Ok(Playbook { plays, source_file })
}

pub(crate) fn extract_yaml_error_location(e: &serde_yaml::Error) -> (Option<usize>, Option<usize>) {
    if let Some(loc) = e.location() {
        (Some(loc.line()), Some(loc.column()))
    } else {
        (None, None)
    }
}

fn convert_play(raw: &YamlValue, play_num: usize, source_file: &str) -> Result<Play, FleetError> {
    let map = raw.as_mapping().ok_or_else(|| {
        structure_error(
            format!("Play {} must be a dictionary", play_num),
            source_file,
            None,
        )
    })?;

    let hosts = map.get("hosts").ok_or_else(|| {
        missing_field(format!("Play {} missing 'hosts' field", play_num), source_file)
    })?;
    let hosts = scalar_string(hosts).ok_or_else(|| {
        structure_error(
            format!("Play {} 'hosts' must be a group name", play_num),
            source_file,
            None,
        )
    })?;

    let tasks = map.get("tasks").ok_or_else(|| {
        missing_field(format!("Play {} missing 'tasks' field", play_num), source_file)
    })?;
    let raw_tasks = tasks.as_sequence().ok_or_else(|| {
        structure_error(
            format!("Play {} 'tasks' must be a list", play_num),
            source_file,
            None,
        )
    })?;

    let mut tasks = Vec::with_capacity(raw_tasks.len());
    for (index, raw_task) in raw_tasks.iter().enumerate() {
        tasks.push(convert_task(raw_task, play_num, index + 1, source_file)?);
    }

    Ok(Play { hosts, tasks })
}

fn convert_task(
    raw: &YamlValue,
    play_num: usize,
    task_num: usize,
    source_file: &str,
) -> Result<Task, FleetError> {
    let map = raw.as_mapping().ok_or_else(|| {
        structure_error(
            format!("Play {}, task {} must be a dictionary", play_num, task_num),
            source_file,
            None,
        )
    })?;

    let name = task_field(map, "name", play_num, task_num, source_file)?;
    let command = task_field(map, "bash", play_num, task_num, source_file)?;

    Ok(Task { name, command })
}

fn task_field(
    map: &Mapping,
    field: &str,
    play_num: usize,
    task_num: usize,
    source_file: &str,
) -> Result<String, FleetError> {
    let value = map.get(field).ok_or_else(|| {
        missing_field(
            format!(
                "Play {}, task {} missing '{}' field",
                play_num, task_num, field
            ),
            source_file,
        )
    })?;

    scalar_string(value).ok_or_else(|| {
        structure_error(
            format!(
                "Play {}, task {} '{}' must be a string",
                play_num, task_num, field
            ),
            source_file,
            None,
        )
    })
}

/// Strings pass through; numbers and booleans are stringified
fn scalar_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Tagged(tagged) => scalar_string(&tagged.value),
        _ => None,
    }
}

fn missing_field(message: String, source_file: &str) -> FleetError {
    FleetError::parse(ParseErrorKind::MissingField, message, source_file)
}

fn structure_error(
    message: impl Into<String>,
    source_file: &str,
    suggestion: Option<&str>,
) -> FleetError {
    FleetError::Parse(Box::new(ParseError {
        kind: ParseErrorKind::InvalidStructure,
        message: message.into(),
        file: Some(source_file.to_string()),
        line: None,
        column: None,
        suggestion: suggestion.map(str::to_string),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_err(yaml: &str) -> (ParseErrorKind, String) {
        match parse_playbook(yaml, "test.yml".to_string()) {
            Err(FleetError::Parse(err)) => (err.kind, err.message),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_playbook() {
        let yaml = r#"
- hosts: web
  tasks:
    - name: check
      bash: echo ok
    - name: uptime
      bash: uptime
- hosts: db
  tasks:
    - name: disk
      bash: df -h
"#;

        let playbook = parse_playbook(yaml, "site.yml".to_string()).unwrap();
        assert_eq!(playbook.source_file, "site.yml");
        assert_eq!(playbook.plays.len(), 2);
        assert_eq!(playbook.plays[0].hosts, "web");
        assert_eq!(
            playbook.plays[0].tasks,
            vec![Task::new("check", "echo ok"), Task::new("uptime", "uptime")]
        );
        assert_eq!(playbook.plays[1].tasks[0].command, "df -h");
        assert_eq!(playbook.task_count(), 3);
    }

    #[test]
    fn test_scalar_values_are_stringified() {
        let yaml = r#"
- hosts: 42
  tasks:
    - name: 7
      bash: true
"#;

        let playbook = parse_playbook(yaml, "t.yml".to_string()).unwrap();
        assert_eq!(playbook.plays[0].hosts, "42");
        assert_eq!(playbook.plays[0].tasks[0], Task::new("7", "true"));
    }

    #[test]
    fn test_top_level_must_be_list() {
        let (kind, message) = parse_err("hosts: web\ntasks: []\n");
        assert_eq!(kind, ParseErrorKind::InvalidStructure);
        assert_eq!(message, "Playbook must be a list of plays");
    }

    #[test]
    fn test_play_must_be_mapping() {
        let (_, message) = parse_err("- hosts: web\n  tasks: []\n- just a string\n");
        assert_eq!(message, "Play 2 must be a dictionary");
    }

    #[test]
    fn test_missing_play_fields() {
        let (kind, message) = parse_err("- tasks: []\n");
        assert_eq!(kind, ParseErrorKind::MissingField);
        assert_eq!(message, "Play 1 missing 'hosts' field");

        let (_, message) = parse_err("- hosts: web\n");
        assert_eq!(message, "Play 1 missing 'tasks' field");

        let (_, message) = parse_err("- hosts: web\n  tasks: echo\n");
        assert_eq!(message, "Play 1 'tasks' must be a list");
    }

    #[test]
    fn test_task_validation_reports_indices() {
        let yaml = r#"
- hosts: web
  tasks:
    - name: ok
      bash: "true"
- hosts: db
  tasks:
    - name: first
      bash: "true"
    - name: second
"#;
        let (_, message) = parse_err(yaml);
        assert_eq!(message, "Play 2, task 2 missing 'bash' field");

        let (_, message) = parse_err("- hosts: web\n  tasks:\n    - bash: ls\n");
        assert_eq!(message, "Play 1, task 1 missing 'name' field");

        let (_, message) = parse_err("- hosts: web\n  tasks:\n    - ls\n");
        assert_eq!(message, "Play 1, task 1 must be a dictionary");
    }

    #[test]
    fn test_invalid_yaml_has_location() {
        match parse_playbook("- hosts: [web\n", "bad.yml".to_string()) {
            Err(FleetError::Parse(err)) => {
                assert_eq!(err.kind, ParseErrorKind::InvalidYaml);
                assert!(err.message.starts_with("Invalid YAML in playbook"));
                assert!(err.line.is_some());
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_playbook_file_missing() {
        let err = parse_playbook_file(Path::new("/nonexistent/site.yml")).unwrap_err();
        assert!(matches!(err, FleetError::Io { .. }));
    }

    #[test]
    fn test_parse_playbook_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.yml");
        std::fs::write(&path, "- hosts: web\n  tasks:\n    - name: a\n      bash: ls\n").unwrap();

        let playbook = parse_playbook_file(&path).unwrap();
        assert_eq!(playbook.plays.len(), 1);
        assert!(playbook.source_file.ends_with("site.yml"));
    }
}
