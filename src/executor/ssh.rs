// SSH transport built on libssh2

use std::fmt;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use parking_lot::Mutex;
use ssh2::{CheckResult, KnownHostFileKind, Session};
use tracing::{debug, info, warn};

use super::{CommandOutput, RemoteShell, Transport, TransportError};

const DEFAULT_PORT: u16 = 22;
const DEFAULT_KEY_FILES: &[&str] = &["id_rsa", "id_ed25519", "id_ecdsa", "id_dsa"];
const READ_CHUNK: usize = 8192;
const IDLE_POLL: Duration = Duration::from_millis(10);

/// What to do with a host key that is not in known_hosts.
///
/// A key that differs from a recorded one is rejected under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Refuse unknown hosts
    Strict,
    /// Trust on first use and record the key
    #[default]
    AcceptNew,
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(HostKeyPolicy::Strict),
            "accept-new" | "accept_new" | "tofu" => Ok(HostKeyPolicy::AcceptNew),
            other => Err(format!(
                "unknown host key policy '{}' (expected 'strict' or 'accept-new')",
                other
            )),
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyPolicy::Strict => write!(f, "strict"),
            HostKeyPolicy::AcceptNew => write!(f, "accept-new"),
        }
    }
}

/// Connection settings shared by every host
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Login user; falls back to $USER, then root
    pub user: Option<String>,
    /// Key tried before the defaults in ~/.ssh
    pub private_key: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
    /// Defaults to ~/.ssh/known_hosts
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            user: None,
            private_key: None,
            connect_timeout: Duration::from_secs(30),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
        }
    }
}

impl SshConfig {
    fn login_user(&self) -> String {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string())
    }

    fn known_hosts(&self) -> Option<PathBuf> {
        self.known_hosts_path
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".ssh/known_hosts")))
    }

    fn key_files(&self) -> Vec<PathBuf> {
        let defaults = dirs::home_dir()
            .map(|home| {
                DEFAULT_KEY_FILES
                    .iter()
                    .map(|name| home.join(".ssh").join(name))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        self.private_key.iter().cloned().chain(defaults).collect()
    }
}

/// Opens one SSH session per `connect` call
pub struct SshTransport {
    config: SshConfig,
    // known_hosts is read, checked and rewritten as one step
    known_hosts_lock: Mutex<()>,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        SshTransport {
            config,
            known_hosts_lock: Mutex::new(()),
        }
    }

    fn open_tcp(&self, host: &str, address: &str, port: u16) -> Result<TcpStream, TransportError> {
        let addrs = (address, port).to_socket_addrs().map_err(|e| TransportError::Connect {
            host: host.to_string(),
            message: format!("could not resolve address: {}", e),
        })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(target: "fleet::ssh", host = %host, addr = %addr, error = %e, "tcp connect failed");
                    last_error = Some(e);
                }
            }
        }

        Err(TransportError::Connect {
            host: host.to_string(),
            message: match last_error {
                Some(e) => match connection_suggestion(&e) {
                    Some(hint) => format!("{} ({})", e, hint),
                    None => e.to_string(),
                },
                None => "no addresses found".to_string(),
            },
        })
    }

    fn verify_host_key(
        &self,
        session: &Session,
        host: &str,
        address: &str,
        port: u16,
    ) -> Result<(), TransportError> {
        let host_key_error = |message: String| TransportError::HostKey {
            host: host.to_string(),
            message,
        };

        let (key, key_type) = session
            .host_key()
            .ok_or_else(|| host_key_error("server presented no host key".to_string()))?;

        let Some(path) = self.config.known_hosts() else {
            return Err(host_key_error("cannot locate known_hosts file".to_string()));
        };

        let _guard = self.known_hosts_lock.lock();

        let mut known_hosts = session
            .known_hosts()
            .map_err(|e| host_key_error(e.to_string()))?;
        if path.exists() {
            known_hosts
                .read_file(&path, KnownHostFileKind::OpenSSH)
                .map_err(|e| host_key_error(format!("cannot read {}: {}", path.display(), e)))?;
        }

        match known_hosts.check_port(address, port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::Mismatch => Err(host_key_error(format!(
                "key does not match the entry in {}; the host may have been replaced or intercepted",
                path.display()
            ))),
            CheckResult::Failure => Err(host_key_error("known_hosts lookup failed".to_string())),
            CheckResult::NotFound => match self.config.host_key_policy {
                HostKeyPolicy::Strict => Err(host_key_error(format!(
                    "host is not in {} and --host-key-policy is strict",
                    path.display()
                ))),
                HostKeyPolicy::AcceptNew => {
                    let entry = if port == DEFAULT_PORT {
                        address.to_string()
                    } else {
                        format!("[{}]:{}", address, port)
                    };
                    known_hosts
                        .add(&entry, key, "added by fleet", key_type.into())
                        .map_err(|e| host_key_error(e.to_string()))?;
                    write_known_hosts(&known_hosts, &path)
                        .map_err(|e| host_key_error(format!("cannot update {}: {}", path.display(), e)))?;
                    info!(target: "fleet::ssh", host = %host, file = %path.display(), "recorded new host key");
                    Ok(())
                }
            },
        }
    }

    fn authenticate(&self, session: &Session, host: &str) -> Result<(), TransportError> {
        let user = self.config.login_user();

        if let Ok(mut agent) = session.agent() {
            if agent.connect().is_ok() {
                agent.list_identities().ok();
                for identity in agent.identities().unwrap_or_default() {
                    if agent.userauth(&user, &identity).is_ok() {
                        debug!(target: "fleet::ssh", host = %host, user = %user, "authenticated via agent");
                        return Ok(());
                    }
                }
            }
        }

        for key_path in self.config.key_files() {
            if key_path.exists()
                && session
                    .userauth_pubkey_file(&user, None, &key_path, None)
                    .is_ok()
            {
                debug!(target: "fleet::ssh", host = %host, key = %key_path.display(), "authenticated via key file");
                return Ok(());
            }
        }

        Err(TransportError::Auth {
            host: host.to_string(),
            user,
        })
    }
}

impl Transport for SshTransport {
    fn connect(&self, host: &str) -> Result<Box<dyn RemoteShell>, TransportError> {
        let (address, port) = split_host_port(host);
        let tcp = self.open_tcp(host, &address, port)?;

        let handshake_error = |e: ssh2::Error| TransportError::Handshake {
            host: host.to_string(),
            message: e.to_string(),
        };

        let mut session = Session::new().map_err(handshake_error)?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout_ms(self.config.connect_timeout));
        session.handshake().map_err(handshake_error)?;

        self.verify_host_key(&session, host, &address, port)?;
        self.authenticate(&session, host)?;

        // Commands may legitimately run for a long time
        session.set_timeout(0);

        Ok(Box::new(SshShell {
            host: host.to_string(),
            session,
        }))
    }
}

/// An authenticated libssh2 session
struct SshShell {
    host: String,
    session: Session,
}

impl RemoteShell for SshShell {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        let exec_error = |e: &dyn fmt::Display| TransportError::Exec {
            host: self.host.clone(),
            message: e.to_string(),
        };

        let mut channel = self.session.channel_session().map_err(|e| exec_error(&e))?;
        channel.exec(command).map_err(|e| exec_error(&e))?;

        // Both streams share one channel window, so they are drained together
        let drained = {
            let mut out_stream = channel.stream(0);
            let mut err_stream = channel.stderr();
            self.session.set_blocking(false);
            let drained = drain_streams(&mut out_stream, &mut err_stream);
            self.session.set_blocking(true);
            drained
        };
        let (stdout, stderr) = drained.map_err(|e| exec_error(&e))?;

        channel.wait_close().map_err(|e| exec_error(&e))?;
        let exit_code = channel.exit_status().map_err(|e| exec_error(&e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.session.disconnect(None, "closing", None) {
            warn!(target: "fleet::ssh", host = %self.host, error = %e, "disconnect failed");
        }
    }
}

/// Read stdout and stderr to EOF, alternating between them.
///
/// The readers must be non-blocking: `WouldBlock` means "nothing yet". A
/// stream that is never read can stall the other one on the remote side.
pub(crate) fn drain_streams<O: Read, E: Read>(
    stdout: &mut O,
    stderr: &mut E,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut out_done = false;
    let mut err_done = false;
    let mut buf = [0u8; READ_CHUNK];

    while !(out_done && err_done) {
        let mut progressed = false;
        if !out_done {
            progressed |= poll_stream(stdout, &mut buf, &mut out, &mut out_done)?;
        }
        if !err_done {
            progressed |= poll_stream(stderr, &mut buf, &mut err, &mut err_done)?;
        }
        if !progressed {
            std::thread::sleep(IDLE_POLL);
        }
    }

    Ok((out, err))
}

fn poll_stream<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    sink: &mut Vec<u8>,
    done: &mut bool,
) -> io::Result<bool> {
    match reader.read(buf) {
        Ok(0) => {
            *done = true;
            Ok(true)
        }
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// libssh2 timeout in milliseconds, saturating instead of wrapping
fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

fn write_known_hosts(known_hosts: &ssh2::KnownHosts, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }
    known_hosts
        .write_file(path, KnownHostFileKind::OpenSSH)
        .map_err(|e| e.to_string())
}

/// Split `host[:port]`, leaving bare IPv6 addresses intact
pub(crate) fn split_host_port(host: &str) -> (String, u16) {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((addr, port)) = rest.split_once("]:") {
            if let Ok(port) = port.parse() {
                return (addr.to_string(), port);
            }
        }
        return (rest.trim_end_matches(']').to_string(), DEFAULT_PORT);
    }

    match host.rsplit_once(':') {
        Some((addr, port)) if !addr.contains(':') => match port.parse() {
            Ok(port) => (addr.to_string(), port),
            Err(_) => (host.to_string(), DEFAULT_PORT),
        },
        _ => (host.to_string(), DEFAULT_PORT),
    }
}

fn connection_suggestion(e: &std::io::Error) -> Option<&'static str> {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => Some("is sshd running on the target?"),
        std::io::ErrorKind::TimedOut => Some("check network connectivity and firewall rules"),
        _ => None,
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
