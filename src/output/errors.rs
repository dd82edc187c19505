// Human-readable error messages for fleet

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use colored::*;

/// Initialize color output based on TTY detection and NO_COLOR environment variable
fn should_use_colors() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    // Errors are written to stderr
    std::io::stderr().is_terminal()
}

/// Fatal errors that abort a run.
///
/// Per-host failures never appear here; they are recorded as data in
/// [`ExecutionResult`](crate::output::ExecutionResult).
#[derive(Debug)]
pub enum FleetError {
    /// Playbook parse and validation errors
    Parse(Box<ParseError>),

    /// I/O errors (missing or unreadable files)
    Io {
        message: String,
        path: Option<PathBuf>,
    },

    /// Inventory errors, including unresolved host groups
    Inventory {
        message: String,
        suggestion: Option<String>,
    },

    /// Invalid runner configuration
    Config {
        message: String,
        suggestion: Option<String>,
    },

    /// Operator interrupt stopped the run
    Interrupted {
        completed: usize,
    },
}

#[derive(Debug)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidYaml,
    InvalidStructure,
    MissingField,
}

impl FleetError {
    pub fn parse(kind: ParseErrorKind, message: impl Into<String>, file: &str) -> Self {
        FleetError::Parse(Box::new(ParseError {
            kind,
            message: message.into(),
            file: Some(file.to_string()),
            line: None,
            column: None,
            suggestion: None,
        }))
    }

    pub fn config(message: impl Into<String>) -> Self {
        FleetError::Config {
            message: message.into(),
            suggestion: None,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            FleetError::Interrupted { .. } => 130,
            _ => 1,
        }
    }
}

impl std::error::Error for FleetError {}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !should_use_colors() {
            colored::control::set_override(false);
        }

        match self {
            FleetError::Parse(err) => {
                writeln!(f, "{}: {}", "ERROR".red().bold(), err.message)?;

                if let Some(ref file) = err.file {
                    write!(f, "  {} ", "-->".blue())?;
                    write!(f, "{}", file.cyan())?;
                    if let Some(line) = err.line {
                        write!(f, ":{}", line)?;
                        if let Some(col) = err.column {
                            write!(f, ":{}", col)?;
                        }
                    }
                    writeln!(f)?;
                }

                if let Some(ref suggestion) = err.suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            FleetError::Io { message, path } => {
                writeln!(f, "{}: {}", "I/O ERROR".red().bold(), message)?;
                if let Some(path) = path {
                    writeln!(f, "  {} {}", "Path:".dimmed(), path.display())?;
                }
                Ok(())
            }

            FleetError::Inventory {
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", "INVENTORY ERROR".red().bold(), message)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            FleetError::Config {
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", "CONFIG ERROR".red().bold(), message)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            FleetError::Interrupted { completed } => {
                writeln!(
                    f,
                    "{}: Interrupted by user ({} results collected before abort)",
                    "ABORTED".red().bold(),
                    completed
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = FleetError::Parse(Box::new(ParseError {
            kind: ParseErrorKind::MissingField,
            message: "Play 2 missing 'hosts' field".to_string(),
            file: Some("site.yml".to_string()),
            line: Some(7),
            column: Some(3),
            suggestion: Some("Every play needs a 'hosts' group".to_string()),
        }));

        let output = format!("{}", err);
        let clean_output = console::strip_ansi_codes(&output);

        assert!(clean_output.contains("Play 2 missing 'hosts' field"));
        assert!(clean_output.contains("site.yml:7:3"));
        assert!(clean_output.contains("Every play needs"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(FleetError::Interrupted { completed: 3 }.exit_code(), 130);
        let missing = FleetError::Inventory {
            message: "missing".to_string(),
            suggestion: None,
        };
        assert_eq!(missing.exit_code(), 1);
        assert_eq!(FleetError::config("bad workers").exit_code(), 1);
    }
}
