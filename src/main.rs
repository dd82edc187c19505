// Fleet CLI

use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use fleet::executor::{
    HostKeyPolicy, ResultOrder, RetryPolicy, Scheduler, SchedulerConfig, SshConfig, SshTransport,
};
use fleet::inventory::Inventory;
use fleet::output::{FleetError, OutputFormat, OutputWriter, RunSummary};
use fleet::parser::{parse_playbook_file, Playbook};

const DEFAULT_HOSTS_FILE: &str = "/etc/playbook/hosts";
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(
    name = "fleet",
    about = "Run playbooks of shell commands across host groups over SSH",
    version,
    disable_colored_help = true,
    term_width = 0
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
#[command(disable_colored_help = true)]
enum Commands {
    /// Run a playbook
    Run {
        /// Path to the playbook file
        playbook: PathBuf,

        /// Path to the hosts file
        #[arg(long, default_value = DEFAULT_HOSTS_FILE)]
        hosts: PathBuf,

        /// Maximum concurrent hosts per task
        #[arg(short, long, default_value = "10")]
        workers: usize,

        /// SSH connection timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Connection attempts per host
        #[arg(long, default_value = "3")]
        connect_retries: u32,

        /// Seconds to wait between connection attempts
        #[arg(long, default_value = "1")]
        retry_delay: u64,

        /// SSH user (defaults to $USER)
        #[arg(short, long)]
        user: Option<String>,

        /// Path to SSH private key
        #[arg(long)]
        private_key: Option<PathBuf>,

        /// Unknown host keys: accept-new (record on first contact) or strict
        #[arg(long, default_value = "accept-new")]
        host_key_policy: String,

        /// Path to the known_hosts file
        #[arg(long)]
        known_hosts: Option<PathBuf>,

        /// Report each task's results in hosts-file order
        #[arg(long)]
        ordered: bool,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        output_format: String,
    },

    /// Check a playbook and its host group references without connecting
    Validate {
        /// Path to the playbook file
        playbook: PathBuf,

        /// Path to the hosts file
        #[arg(long, default_value = DEFAULT_HOSTS_FILE)]
        hosts: PathBuf,
    },

    /// List the groups in a hosts file
    Inventory {
        /// Path to the hosts file
        #[arg(long, default_value = DEFAULT_HOSTS_FILE)]
        hosts: PathBuf,
    },
}

struct RunArgs {
    playbook: PathBuf,
    hosts: PathBuf,
    workers: usize,
    timeout: u64,
    connect_retries: u32,
    retry_delay: u64,
    user: Option<String>,
    private_key: Option<PathBuf>,
    host_key_policy: String,
    known_hosts: Option<PathBuf>,
    ordered: bool,
    output_format: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Run {
            playbook,
            hosts,
            workers,
            timeout,
            connect_retries,
            retry_delay,
            user,
            private_key,
            host_key_policy,
            known_hosts,
            ordered,
            output_format,
        } => {
            let args = RunArgs {
                playbook,
                hosts,
                workers,
                timeout,
                connect_retries,
                retry_delay,
                user,
                private_key,
                host_key_policy,
                known_hosts,
                ordered,
                output_format,
            };
            run_playbook(args, cli.verbose, cli.no_color).await
        }
        Commands::Validate { playbook, hosts } => validate_playbook(&playbook, &hosts),
        Commands::Inventory { hosts } => list_inventory(&hosts),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fleet={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

fn load_inventory(path: &Path) -> Result<Inventory, FleetError> {
    let inventory = Inventory::from_file(path)?;
    if inventory.is_empty() {
        return Err(FleetError::Inventory {
            message: "No host groups found in hosts file".to_string(),
            suggestion: Some(format!("Add a [group] section to {}", path.display())),
        });
    }
    debug!(target: "fleet::cli", groups = inventory.len(), path = %path.display(), "loaded hosts file");
    Ok(inventory)
}

fn load(playbook_path: &Path, hosts_path: &Path) -> Result<(Playbook, Inventory), FleetError> {
    let inventory = load_inventory(hosts_path)?;
    let playbook = parse_playbook_file(playbook_path)?;
    Ok((playbook, inventory))
}

async fn run_playbook(args: RunArgs, verbose: bool, no_color: bool) -> Result<(), FleetError> {
    let output_format = OutputFormat::from_str(&args.output_format).map_err(|_| FleetError::Config {
        message: format!("Invalid output format: {}", args.output_format),
        suggestion: Some("Use 'text' or 'json'".to_string()),
    })?;

    let host_key_policy = HostKeyPolicy::from_str(&args.host_key_policy).map_err(FleetError::config)?;

    let (playbook, inventory) = load(&args.playbook, &args.hosts)?;

    let ssh_config = SshConfig {
        user: args.user,
        private_key: args.private_key,
        connect_timeout: Duration::from_secs(args.timeout),
        host_key_policy,
        known_hosts_path: args.known_hosts,
    };

    let config = SchedulerConfig {
        max_parallel_hosts: args.workers,
        retry: RetryPolicy::new(args.connect_retries, Duration::from_secs(args.retry_delay)),
        result_order: if args.ordered {
            ResultOrder::Inventory
        } else {
            ResultOrder::Completion
        },
    };

    let transport = Arc::new(SshTransport::new(ssh_config));
    let scheduler = Scheduler::new(config, transport)?;

    let cancel = scheduler.cancellation_token();
    tokio::spawn(async move {
        if watch_interrupts(cancel, tokio::signal::ctrl_c).await {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    info!(
        target: "fleet::cli",
        playbook = %args.playbook.display(),
        plays = playbook.plays.len(),
        tasks = playbook.task_count(),
        "running playbook"
    );

    let results = scheduler.execute_playbook(&playbook, &inventory).await?;

    let writer = OutputWriter::new(output_format, !no_color, verbose);
    writer.print_results(&results);

    let summary = RunSummary::from_results(&results);
    debug!(
        target: "fleet::cli",
        total = summary.total,
        failed = summary.failed,
        "run complete"
    );

    Ok(())
}

/// First interrupt cancels the run gracefully; a second one asks for an
/// immediate exit. Returns true when the caller should exit now.
async fn watch_interrupts<S, F>(cancel: CancellationToken, mut signal: S) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal().await {
        warn!(target: "fleet::cli", error = %e, "cannot listen for Ctrl-C");
        return false;
    }
    eprintln!(
        "{}",
        "Interrupted, waiting for running hosts to finish (Ctrl-C again to abort)...".yellow()
    );
    cancel.cancel();

    if signal().await.is_err() {
        return false;
    }
    eprintln!("{}", "Aborted, in-flight hosts were not waited for".red());
    true
}

fn validate_playbook(playbook_path: &Path, hosts_path: &Path) -> Result<(), FleetError> {
    let (playbook, inventory) = load(playbook_path, hosts_path)?;
    Scheduler::preflight(&playbook, &inventory)?;

    println!(
        "{} {} ({} play(s), {} task(s))",
        "✓".green(),
        playbook_path.display(),
        playbook.plays.len(),
        playbook.task_count()
    );
    for (i, play) in playbook.plays.iter().enumerate() {
        let hosts = inventory
            .get_group(&play.hosts)
            .map(|g| g.hosts.len())
            .unwrap_or(0);
        println!(
            "  Play {}: {} ({} host(s), {} task(s))",
            i + 1,
            play.hosts.cyan(),
            hosts,
            play.tasks.len()
        );
    }
    Ok(())
}

fn list_inventory(hosts_path: &Path) -> Result<(), FleetError> {
    let inventory = load_inventory(hosts_path)?;

    for group in inventory.groups() {
        println!("{} ({})", format!("[{}]", group.name).cyan().bold(), group.hosts.len());
        for host in &group.hosts {
            println!("  {}", host);
        }
    }
    Ok(())
}
