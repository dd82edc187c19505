// Fleet - run playbooks of shell commands across host groups over SSH
//
// Plays run in order, tasks run in order, and each task fans out across its
// host group with a bounded number of concurrent SSH sessions.

pub mod executor;
pub mod inventory;
pub mod output;
pub mod parser;

pub use executor::{Scheduler, SchedulerConfig, SshConfig, SshTransport, Transport};
pub use inventory::{HostGroup, Inventory};
pub use output::{ExecutionResult, FleetError, ResultSet, RunSummary, TerminalOutput};
pub use parser::{parse_playbook, parse_playbook_file, Playbook};

/// Version of the fleet tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::executor::{HostKeyPolicy, ResultOrder, RetryPolicy, Scheduler, SchedulerConfig};
    pub use crate::inventory::{HostGroup, Inventory};
    pub use crate::output::{ExecutionResult, FleetError, OutputFormat, OutputWriter};
    pub use crate::parser::{parse_playbook, parse_playbook_file, Playbook};
}
