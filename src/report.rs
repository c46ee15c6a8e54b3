//! Best-effort node health reporting.
//!
//! Every probe degrades to `Unknown`/`false` on failure; the report is
//! diagnostics, not control, and must never abort half way.
use std::{
    fmt::Write as _,
    net::{TcpStream, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

use chrono::Local;
use regex::Regex;
use tracing::debug;

use crate::{
    constants::{
        DAEMON_BINARY, DATA_DIR_NAME, DEFAULT_RPC_PORT, INSTALL_DIR, IP_ECHO_URL,
        JOURNAL_ERROR_LINES, SERVICE_NAME, SOCKET_PROBE_TIMEOUT, Sources,
    },
    http::HttpFetcher,
    runner::{RunRequest, run_quiet},
    service,
    unit::UnitFile,
    version::{self, VersionManifest},
};

/// Snapshot of node health, one probe per field.
#[derive(Debug)]
pub struct HealthReport {
    /// Local wall-clock time the report was taken.
    pub generated_at: String,
    /// Peer-network identity of the running daemon.
    pub enode_id: Option<String>,
    /// Public address as seen from the outside.
    pub public_ip: Option<String>,
    /// RPC port the unit file advertises.
    pub rpc_port: u16,
    /// RPC user, when the unit configures one.
    pub rpc_user: Option<String>,
    /// RPC password, when the unit configures one.
    pub rpc_password: Option<String>,
    /// Channel versions merged with the installed daemon version.
    pub versions: Option<VersionManifest>,
    /// Whether the init system reports the service active.
    pub service_active: bool,
    /// Whether the RPC port answers on the public address.
    pub rpc_port_open: bool,
    /// Recent error-level journal lines, when the service is active.
    pub journal_errors: Option<String>,
}

/// Collects the full report.
pub fn collect(fetcher: &HttpFetcher, sources: &Sources) -> HealthReport {
    let recovered = UnitFile::at_default_path().recovered();
    let run_as_user = recovered.run_as_user.unwrap_or_else(|| "root".to_string());
    let rpc_port = recovered.rpc_port.unwrap_or(DEFAULT_RPC_PORT);

    let service_active = service::is_active(SERVICE_NAME);
    let enode_id = enode_id(&run_as_user).or_else(enode_from_journal);
    let public_ip = public_ip(fetcher);
    let rpc_port_open = public_ip
        .as_deref()
        .map(|ip| probe_port(ip, rpc_port, SOCKET_PROBE_TIMEOUT))
        .unwrap_or(false);
    let versions = version::fetch_manifest(
        fetcher,
        &sources.daemon_manifest,
        &format!("{INSTALL_DIR}/{DAEMON_BINARY} version"),
    )
    .map_err(|err| debug!("version manifest unavailable: {err}"))
    .ok();
    let journal_errors = service_active.then(journal_errors).flatten();

    HealthReport {
        generated_at: Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        enode_id,
        public_ip,
        rpc_port,
        rpc_user: recovered.rpc_user,
        rpc_password: recovered.rpc_password,
        versions,
        service_active,
        rpc_port_open,
        journal_errors,
    }
}

/// Renders the report as the printable summary.
pub fn render(report: &HealthReport) -> String {
    let mut out = String::new();
    let unknown = || "Unknown".to_string();

    let _ = writeln!(out, "Report generated: {}", report.generated_at);
    let _ = writeln!(
        out,
        "Enode Id: {}",
        report.enode_id.clone().unwrap_or_else(unknown)
    );
    let _ = writeln!(
        out,
        "Node IP: {}",
        report.public_ip.clone().unwrap_or_else(unknown)
    );
    let _ = writeln!(out, "Node Port: {}", report.rpc_port);
    if let (Some(user), Some(password)) = (&report.rpc_user, &report.rpc_password) {
        let _ = writeln!(out, "RPC User: {user}");
        let _ = writeln!(out, "RPC Password: {password}");
    }
    match &report.versions {
        Some(versions) => {
            let _ = writeln!(out, "Geth Versions:");
            let _ = writeln!(out, "\tcurrent : {}", versions.current_label());
            let _ = writeln!(out, "\tlatest : {}", versions.latest);
            let _ = writeln!(out, "\tstable : {}", versions.stable);
        }
        None => {
            let _ = writeln!(out, "Geth Versions: Unknown");
        }
    }
    let _ = writeln!(out, "Service Is-Active: {}", report.service_active);
    let _ = writeln!(out, "Port is open locally: {}", report.rpc_port_open);
    if let Some(journal) = &report.journal_errors {
        let _ = writeln!(out, "Service Error(s):");
        let _ = writeln!(out, "{}", journal.trim_end());
    }
    out
}

/// Queries the running daemon for its node id through the admin console.
fn enode_id(run_as_user: &str) -> Option<String> {
    let data_dir = home_dir(run_as_user)?.join(DATA_DIR_NAME);
    let command = format!(
        "{INSTALL_DIR}/{DAEMON_BINARY} attach --datadir {}/ --exec \"admin.nodeInfo.id\"",
        data_dir.display()
    );
    let output = run_quiet(&RunRequest::new(command))?;
    let id = output.stdout_trimmed().replace('"', "");
    (!id.is_empty()).then_some(id)
}

/// Falls back to scraping an enode URI out of recent journal lines.
fn enode_from_journal() -> Option<String> {
    let output = run_quiet(&RunRequest::new(format!(
        "journalctl -u {SERVICE_NAME}.service -n 200 --no-pager"
    )))?;
    extract_enode(&output.stdout)
}

fn extract_enode(text: &str) -> Option<String> {
    Regex::new(r"enode://([0-9a-fA-F]+)@")
        .unwrap()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|group| group.as_str().to_string())
}

/// Asks an IP-echo endpoint for the node's public address.
fn public_ip(fetcher: &HttpFetcher) -> Option<String> {
    let body = fetcher.get_ok(IP_ECHO_URL).ok()?.text().ok()?;
    let ip = body.trim().to_string();
    (!ip.is_empty()).then_some(ip)
}

/// Whether a TCP connection to `host:port` succeeds within the timeout.
pub fn probe_port(host: &str, port: u16, timeout: Duration) -> bool {
    match format!("{host}:{port}").to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .map(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
            .unwrap_or(false),
        Err(_) => false,
    }
}

fn journal_errors() -> Option<String> {
    let output = run_quiet(&RunRequest::new(format!(
        "journalctl -u {SERVICE_NAME}.service -p 3 -n {JOURNAL_ERROR_LINES} --no-pager"
    )))?;
    Some(output.stdout_trimmed().to_string())
}

fn home_dir(user: &str) -> Option<PathBuf> {
    nix::unistd::User::from_name(user)
        .ok()
        .flatten()
        .map(|entry| entry.dir)
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn open_and_closed_ports_are_distinguished() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(probe_port("127.0.0.1", port, Duration::from_millis(500)));
        assert!(!probe_port("127.0.0.1", 1, Duration::from_millis(500)));
    }

    #[test]
    fn enode_uri_is_scraped_from_journal_text() {
        let text = "Jan 01 node geth[17]: self=\"enode://ab12CD@10.0.0.5:30303\"";
        assert_eq!(extract_enode(text), Some("ab12CD".to_string()));
        assert_eq!(extract_enode("nothing here"), None);
    }

    #[test]
    fn degraded_fields_render_as_unknown() {
        let report = HealthReport {
            generated_at: "2018-09-01 12:00:00 UTC".to_string(),
            enode_id: None,
            public_ip: None,
            rpc_port: 8545,
            rpc_user: None,
            rpc_password: None,
            versions: None,
            service_active: false,
            rpc_port_open: false,
            journal_errors: None,
        };

        let rendered = render(&report);

        assert!(rendered.contains("Enode Id: Unknown"));
        assert!(rendered.contains("Node IP: Unknown"));
        assert!(rendered.contains("Geth Versions: Unknown"));
        assert!(rendered.contains("Service Is-Active: false"));
        assert!(!rendered.contains("RPC User:"));
        assert!(!rendered.contains("Service Error(s):"));
    }

    #[test]
    fn credentials_render_only_as_a_pair() {
        let report = HealthReport {
            generated_at: String::new(),
            enode_id: Some("ab".to_string()),
            public_ip: Some("203.0.113.9".to_string()),
            rpc_port: 8546,
            rpc_user: Some("rpc".to_string()),
            rpc_password: None,
            versions: None,
            service_active: true,
            rpc_port_open: true,
            journal_errors: Some("boom".to_string()),
        };

        let rendered = render(&report);

        assert!(!rendered.contains("RPC User:"));
        assert!(rendered.contains("Node Port: 8546"));
        assert!(rendered.contains("Service Error(s):\nboom"));
    }
}
