// Playbook data model

/// A complete playbook: plays run strictly in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playbook {
    pub plays: Vec<Play>,
    /// File the playbook was loaded from (for messages)
    pub source_file: String,
}

impl Playbook {
    pub fn new(plays: Vec<Play>) -> Self {
        Playbook {
            plays,
            source_file: String::new(),
        }
    }

    /// Total number of tasks across all plays
    pub fn task_count(&self) -> usize {
        self.plays.iter().map(|p| p.tasks.len()).sum()
    }
}

/// One playbook entry binding a host group to an ordered list of tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Play {
    /// Name of the inventory group this play targets
    pub hosts: String,
    pub tasks: Vec<Task>,
}

impl Play {
    pub fn new(hosts: impl Into<String>, tasks: Vec<Task>) -> Self {
        Play {
            hosts: hosts.into(),
            tasks,
        }
    }
}

/// A named shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub command: String,
}

impl Task {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Task {
            name: name.into(),
            command: command.into(),
        }
    }
}
