//! Fixed paths, ports, and upstream source locations.

use std::time::Duration;

/// Name of the managed systemd unit.
pub const SERVICE_NAME: &str = "akromanode";

/// Unit name used by installations predating the akromanode rename.
pub const LEGACY_SERVICE_NAME: &str = "masternode";

/// On-disk path of the managed unit file.
pub const UNIT_FILE_PATH: &str = "/etc/systemd/system/akromanode.service";

/// On-disk path of the legacy unit file migrated on sight.
pub const LEGACY_UNIT_FILE_PATH: &str = "/etc/systemd/system/masternode.service";

/// Directory the daemon and management binaries are installed into.
pub const INSTALL_DIR: &str = "/usr/sbin";

/// Installed name of the masternode daemon binary.
pub const DAEMON_BINARY: &str = "geth-akroma";

/// Installed name of the setup binary.
pub const SETUP_BINARY: &str = "akroma-mn-setup";

/// Installed name of the health report binary.
pub const UTILS_BINARY: &str = "akroma-mn-utils";

/// Entry name inside upstream release archives.
pub const ARCHIVE_ENTRY: &str = "geth";

/// Data directory under the run-as user's home, queried for the enode id.
pub const DATA_DIR_NAME: &str = ".akroma";

/// Default p2p listening port; omitted from the rendered `ExecStart=` line.
pub const DEFAULT_P2P_PORT: u16 = 30303;

/// Default RPC port.
pub const DEFAULT_RPC_PORT: u16 = 8545;

/// User the daemon runs as on fresh installations.
pub const DEFAULT_RUN_AS_USER: &str = "akroma";

/// Marker comment identifying the auto-update crontab entry.
pub const CRON_MARKER: &str = "Akroma MasterNode Auto-Update";

/// Advisory lock taken for the duration of a setup run.
pub const RUN_LOCK_PATH: &str = "/run/akroma-mn-setup.lock";

/// IP-echo endpoint used to discover the node's public address.
pub const IP_ECHO_URL: &str = "https://icanhazip.com";

/// Request timeout for manifest and artifact fetches.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection-retry budget for a single HTTP request.
pub const HTTP_ATTEMPTS: usize = 10;

/// Fixed wait between HTTP connection retries.
pub const HTTP_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Timeout for the RPC port reachability probe.
pub const SOCKET_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of error-level journal lines included in the health report.
pub const JOURNAL_ERROR_LINES: usize = 20;

/// Upstream locations for release artifacts and version manifests.
///
/// Passed explicitly into the components that fetch from them so nothing
/// reads URL state out of module globals.
#[derive(Debug, Clone)]
pub struct Sources {
    /// Base URL of daemon release archives.
    pub daemon_releases: String,
    /// URL of the daemon version manifest.
    pub daemon_manifest: String,
    /// Base URL of management-script release binaries.
    pub scripts_releases: String,
    /// URL of the management-script version manifest.
    pub scripts_manifest: String,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            daemon_releases: "https://github.com/akroma-project/akroma/releases/download"
                .to_string(),
            daemon_manifest:
                "https://raw.githubusercontent.com/akroma-project/akroma/master/versions.json"
                    .to_string(),
            scripts_releases:
                "https://github.com/akroma-project/akroma-masternode-management/releases/download"
                    .to_string(),
            scripts_manifest:
                "https://raw.githubusercontent.com/akroma-project/akroma-masternode-management/master/versions.json"
                    .to_string(),
        }
    }
}
