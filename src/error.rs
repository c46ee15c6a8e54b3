//! Error handling for the masternode tools.
use std::time::Duration;

use thiserror::Error;

/// Defines all fatal conditions a setup or report run can hit.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Detected OS/version is not in the compatibility matrix. Maps to exit
    /// code 2; nothing has been mutated when this is raised.
    #[error(
        "Unsupported OS and/or version ({name} {version}). Please refer to the installation guide for supported platforms"
    )]
    UnsupportedPlatform {
        /// Detected distribution name.
        name: String,
        /// Detected major version.
        version: u32,
    },

    /// Another invocation holds the run lock (usually the auto-update cron).
    #[error("another akroma-mn-setup invocation is already running")]
    AlreadyRunning,

    /// The setup tool mutates system state and must run as root.
    #[error("this command must be run as root")]
    RootRequired,

    /// An external command failed after its retry budget.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Transport-level HTTP failure after connection retries.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A fetch completed but the server answered with a non-success status.
    #[error("'{url}' returned status {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The remote version manifest was not valid JSON.
    #[error("failed to parse version manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A downloaded release archive could not be read.
    #[error("downloaded archive is corrupt: {0}")]
    CorruptArchive(#[from] zip::result::ZipError),

    /// The release archive lacks the expected binary entry.
    #[error("release archive does not contain entry '{entry}'")]
    MissingArchiveEntry {
        /// Name of the missing archive entry.
        entry: String,
    },

    /// No release artifact exists for the detected CPU architecture.
    #[error("no release artifact for architecture '{arch}'")]
    UnsupportedArchitecture {
        /// Detected machine architecture.
        arch: String,
    },

    /// Username failed validation.
    #[error("invalid username '{user}' (expected 2-15 characters from [A-Za-z0-9_-])")]
    InvalidUsername {
        /// Rejected username.
        user: String,
    },

    /// RPC user or password failed validation.
    #[error("invalid rpc user/password (expected 3-15 characters from [A-Za-z0-9])")]
    InvalidRpcCredentials,

    /// Only one of the two RPC credential values was supplied.
    #[error("--rpcuser requires --rpcpassword (and vice versa)")]
    RpcCredentialsIncomplete,

    /// Creating the run-as user failed.
    #[error("failed to create user '{user}'")]
    UserCreateFailed {
        /// Username that could not be created.
        user: String,
    },

    /// An OS package could not be installed.
    #[error("failed to install package '{package}'")]
    PackageInstallFailed {
        /// Package the family-specific package manager rejected.
        package: String,
    },

    /// A firewall command failed; the rule set may be partially applied.
    #[error("failed to configure ufw: '{rule}' failed")]
    FirewallFailed {
        /// Command that failed.
        rule: String,
    },

    /// A systemctl action failed.
    #[error("failed to {action} service '{service}'")]
    ServiceControlFailed {
        /// Unit the action targeted.
        service: String,
        /// systemctl verb that failed.
        action: String,
    },

    /// The operator interrupted an interactive prompt.
    #[error("interrupted")]
    Interrupted,
}

/// Error type for external command execution.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The command could not be spawned at all.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        /// Command line that failed to start.
        command: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while feeding stdin or draining output.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The command exceeded its per-attempt wall-clock timeout and was killed.
    #[error("'{command}' timed out after {timeout:?}")]
    TimedOut {
        /// Command line that was killed.
        command: String,
        /// Timeout that expired.
        timeout: Duration,
    },

    /// The command completed with a non-zero exit status on every attempt.
    #[error("'{command}' returned {code:?}\nstdout={stdout}\nstderr={stderr}")]
    NonZeroExit {
        /// Command line that failed.
        command: String,
        /// Exit code of the final attempt, if the process was not signaled.
        code: Option<i32>,
        /// Captured stdout of the final attempt.
        stdout: String,
        /// Captured stderr of the final attempt.
        stderr: String,
    },
}
