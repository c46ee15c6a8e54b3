//! Rendering and reconciliation of the akromanode service unit.
//!
//! The unit file is the single managed artifact: desired configuration is
//! rendered to text, compared byte-for-byte against the on-disk copy, and
//! rewritten only on inequality. The previous rendering doubles as the
//! durable source of configuration for flag-less re-runs.
use std::{
    fs,
    path::{Path, PathBuf},
};

use regex::Regex;
use tracing::info;

use crate::{
    constants::{DAEMON_BINARY, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT, INSTALL_DIR, UNIT_FILE_PATH},
    error::SetupError,
    install::ensure_owner_and_mode,
    platform::DistroFamily,
};

/// Desired node configuration for one setup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// User (and group) the daemon runs as; `None` runs as root.
    pub run_as_user: Option<String>,
    /// p2p listening port.
    pub port: u16,
    /// RPC port.
    pub rpc_port: u16,
    /// RPC user; present iff `rpc_password` is present.
    pub rpc_user: Option<String>,
    /// RPC password; present iff `rpc_user` is present.
    pub rpc_password: Option<String>,
    /// Preload jemalloc into the daemon.
    pub use_jemalloc: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            run_as_user: None,
            port: DEFAULT_P2P_PORT,
            rpc_port: DEFAULT_RPC_PORT,
            rpc_user: None,
            rpc_password: None,
            use_jemalloc: false,
        }
    }
}

impl NodeConfig {
    /// Checks the invariants the rendered unit relies on: credentials come
    /// in pairs and every identifier matches its pattern.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.rpc_user.is_some() != self.rpc_password.is_some() {
            return Err(SetupError::RpcCredentialsIncomplete);
        }
        for credential in [&self.rpc_user, &self.rpc_password].into_iter().flatten() {
            if !is_valid_rpc_credential(credential) {
                return Err(SetupError::InvalidRpcCredentials);
            }
        }
        if let Some(user) = &self.run_as_user
            && !is_valid_username(user)
        {
            return Err(SetupError::InvalidUsername { user: user.clone() });
        }
        Ok(())
    }
}

/// Whether a run-as username is acceptable.
pub fn is_valid_username(user: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_-]{2,15}$").unwrap().is_match(user)
}

/// Whether an RPC user or password value is acceptable.
pub fn is_valid_rpc_credential(value: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9]{3,15}$").unwrap().is_match(value)
}

/// Renders the service unit for a configuration.
///
/// Pure and deterministic: identical inputs produce byte-identical text, so
/// the reconcile comparison never sees formatting-only differences. The
/// default p2p port is left off the command line; the parser restores it as
/// a default on the next run.
pub fn render(config: &NodeConfig, family: Option<DistroFamily>) -> String {
    let mut unit = String::from(
        "[Unit]\nDescription=Akroma MasterNode\nAfter=network.target\n\n[Service]\nType=simple\n",
    );

    if let Some(user) = &config.run_as_user {
        unit.push_str(&format!("User={user}\nGroup={user}\n"));
    }

    if config.use_jemalloc
        && let Some(family) = family
    {
        unit.push_str(&format!(
            "Environment=\"LD_PRELOAD={}\"\n",
            family.allocator_preload_path()
        ));
    }

    let mut exec = format!("ExecStart={INSTALL_DIR}/{DAEMON_BINARY} --masternode");
    if config.port != DEFAULT_P2P_PORT {
        exec.push_str(&format!(" --port {}", config.port));
    }
    exec.push_str(&format!(" --rpcport {}", config.rpc_port));
    exec.push_str(" --rpcvhosts *");
    if let (Some(user), Some(password)) = (&config.rpc_user, &config.rpc_password) {
        exec.push_str(&format!(" --rpcuser {user} --rpcpassword {password}"));
    }
    unit.push_str(&exec);
    unit.push('\n');

    unit.push_str("Restart=always\nRestartSec=30s\n\n[Install]\nWantedBy=multi-user.target\n");
    unit
}

/// Configuration recovered from a previously rendered unit. Fields the text
/// does not mention stay `None` and fall back to fixed defaults.
#[derive(Debug, Clone, Default)]
pub struct RecoveredConfig {
    /// Value of the `User=` line.
    pub run_as_user: Option<String>,
    /// p2p port from the `--port` flag.
    pub port: Option<u16>,
    /// RPC port from the `--rpcport` flag.
    pub rpc_port: Option<u16>,
    /// RPC user from the `--rpcuser` flag.
    pub rpc_user: Option<String>,
    /// RPC password from the `--rpcpassword` flag.
    pub rpc_password: Option<String>,
    /// Whether an allocator preload line was present.
    pub use_jemalloc: bool,
}

/// Pattern-extracts configuration from previous unit text.
pub fn parse(content: &str) -> RecoveredConfig {
    fn capture(content: &str, pattern: &str) -> Option<String> {
        Regex::new(pattern)
            .unwrap()
            .captures(content)
            .and_then(|captures| captures.get(1))
            .map(|group| group.as_str().to_string())
    }

    RecoveredConfig {
        run_as_user: capture(content, r"(?m)^User=(.+)$"),
        port: capture(content, r"--port\s+(\d+)").and_then(|value| value.parse().ok()),
        rpc_port: capture(content, r"--rpcport\s+(\d+)").and_then(|value| value.parse().ok()),
        rpc_user: capture(content, r"--rpcuser\s+(\w+)"),
        rpc_password: capture(content, r"--rpcpassword\s+(\w+)"),
        use_jemalloc: content.contains("LD_PRELOAD="),
    }
}

/// Handle on the managed unit file.
#[derive(Debug, Clone)]
pub struct UnitFile {
    path: PathBuf,
}

impl UnitFile {
    /// Handle on an arbitrary path (tests point this at a tempdir).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Handle on the system unit path.
    pub fn at_default_path() -> Self {
        Self::new(UNIT_FILE_PATH)
    }

    /// The managed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a unit file exists on disk.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Current on-disk content, `None` when absent or unreadable.
    pub fn load(&self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }

    /// Configuration recovered from the on-disk content.
    pub fn recovered(&self) -> RecoveredConfig {
        self.load().map(|content| parse(&content)).unwrap_or_default()
    }

    /// Writes `rendered` iff it differs from the on-disk content.
    ///
    /// Returns whether the file changed, i.e. whether the init system needs
    /// a reload. Equal content performs no disk write at all.
    pub fn reconcile(&self, rendered: &str) -> Result<bool, SetupError> {
        if self.load().as_deref() == Some(rendered) {
            return Ok(false);
        }
        info!(path = %self.path.display(), "creating/updating service unit file");
        fs::write(&self.path, rendered)?;
        ensure_owner_and_mode(&self.path, 0o644)?;
        Ok(true)
    }

    /// Deletes the unit file when present.
    pub fn remove(&self) -> Result<(), SetupError> {
        if self.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
