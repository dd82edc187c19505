// Instrumented in-memory transport for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{CommandOutput, RemoteShell, Transport, TransportError};

/// Scripted behaviour for one host
#[derive(Debug, Clone)]
pub enum HostBehaviour {
    /// Connect fine and interpret the command
    Healthy,
    /// Refuse the first `times` connection attempts
    FailConnect { times: u32 },
    /// Refuse every connection attempt
    RefuseConnect,
    /// Connect fine but lose the channel while running
    DropDuringExec,
    /// Panic while running the command
    PanicDuringExec,
}

/// Lifecycle events, in the order the transport saw them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open { host: String },
    Exec { host: String, command: String },
    Close { host: String },
}

#[derive(Debug, Default)]
pub struct FakeStats {
    attempts: Mutex<HashMap<String, u32>>,
    events: Mutex<Vec<Event>>,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeStats {
    pub fn connect_attempts(&self, host: &str) -> u32 {
        self.attempts.lock().get(host).copied().unwrap_or(0)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Highest number of simultaneously open sessions observed
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn open_now(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// A transport whose hosts behave as scripted.
///
/// Commands understood: `echo <text>` prints text, `exit <n>` exits with n,
/// anything else succeeds silently.
pub struct FakeTransport {
    behaviours: HashMap<String, HostBehaviour>,
    exec_delay: Duration,
    stats: Arc<FakeStats>,
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport {
            behaviours: HashMap::new(),
            exec_delay: Duration::ZERO,
            stats: Arc::new(FakeStats::default()),
        }
    }

    pub fn with_host(mut self, host: &str, behaviour: HostBehaviour) -> Self {
        self.behaviours.insert(host.to_string(), behaviour);
        self
    }

    /// Make every command take this long, so overlap is observable
    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    pub fn stats(&self) -> Arc<FakeStats> {
        self.stats.clone()
    }

    fn behaviour(&self, host: &str) -> HostBehaviour {
        self.behaviours
            .get(host)
            .cloned()
            .unwrap_or(HostBehaviour::Healthy)
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for FakeTransport {
    fn connect(&self, host: &str) -> Result<Box<dyn RemoteShell>, TransportError> {
        let attempt = {
            let mut attempts = self.stats.attempts.lock();
            let count = attempts.entry(host.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let behaviour = self.behaviour(host);
        let refused = match behaviour {
            HostBehaviour::RefuseConnect => true,
            HostBehaviour::FailConnect { times } => attempt <= times,
            _ => false,
        };
        if refused {
            return Err(TransportError::Connect {
                host: host.to_string(),
                message: "connection refused".to_string(),
            });
        }

        let now = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_open.fetch_max(now, Ordering::SeqCst);
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.stats.record(Event::Open {
            host: host.to_string(),
        });

        Ok(Box::new(FakeShell {
            host: host.to_string(),
            behaviour,
            exec_delay: self.exec_delay,
            stats: self.stats.clone(),
        }))
    }
}

struct FakeShell {
    host: String,
    behaviour: HostBehaviour,
    exec_delay: Duration,
    stats: Arc<FakeStats>,
}

impl RemoteShell for FakeShell {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        self.stats.record(Event::Exec {
            host: self.host.clone(),
            command: command.to_string(),
        });

        if !self.exec_delay.is_zero() {
            std::thread::sleep(self.exec_delay);
        }

        match self.behaviour {
            HostBehaviour::DropDuringExec => {
                return Err(TransportError::Exec {
                    host: self.host.clone(),
                    message: "connection reset by peer".to_string(),
                })
            }
            HostBehaviour::PanicDuringExec => panic!("fake shell exploded on {}", self.host),
            _ => {}
        }

        if let Some(text) = command.strip_prefix("echo ") {
            return Ok(CommandOutput {
                stdout: format!("{}\n", text),
                stderr: String::new(),
                exit_code: 0,
            });
        }

        if let Some(code) = command.strip_prefix("exit ") {
            let exit_code = code.trim().parse().unwrap_or(1);
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("exited with {}\n", exit_code),
                exit_code,
            });
        }

        Ok(CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    fn disconnect(&mut self) {
        self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.stats.record(Event::Close {
            host: self.host.clone(),
        });
    }
}
