//! Download and installation of the daemon binary and the management tools.
use std::{
    fs,
    io::{self, Cursor},
    os::unix::fs::PermissionsExt,
    path::Path,
};

use nix::unistd::{Gid, Uid, chown, geteuid};
use tracing::{info, warn};
use zip::ZipArchive;

use crate::{
    constants::{ARCHIVE_ENTRY, DAEMON_BINARY, INSTALL_DIR, SERVICE_NAME, SETUP_BINARY, Sources, UTILS_BINARY},
    error::SetupError,
    http::HttpFetcher,
    service,
    version::Version,
};

/// Maps a machine architecture onto the release artifact suffix.
pub fn artifact_suffix(arch: &str) -> Option<&'static str> {
    match arch {
        "x86_64" => Some("amd64"),
        "armv5l" => Some("arm-5"),
        "armv6l" => Some("arm-6"),
        "armv7l" => Some("arm-7"),
        "armv8l" => Some("arm-8"),
        "aarch64" => Some("arm-64"),
        "i686" => Some("386"),
        _ => None,
    }
}

/// Downloads and installs the daemon binary for an architecture.
///
/// The service is stopped first when active. The archive is extracted to a
/// staging file beside the target and renamed into place, so a corrupt
/// download never leaves a half-written binary.
pub fn install_daemon(
    fetcher: &HttpFetcher,
    arch: &str,
    version: &Version,
    sources: &Sources,
) -> Result<(), SetupError> {
    let suffix = artifact_suffix(arch).ok_or_else(|| SetupError::UnsupportedArchitecture {
        arch: arch.to_string(),
    })?;
    let url = format!(
        "{}/{version}/release.linux-{suffix}.{version}.zip",
        sources.daemon_releases
    );

    if service::is_active(SERVICE_NAME) && !service::systemctl_ok("stop", SERVICE_NAME) {
        warn!("failed to stop {SERVICE_NAME} before replacing its binary");
    }

    info!(url = %url, "downloading daemon release");
    let payload = fetcher.get_ok(&url)?.bytes()?;
    extract_daemon(&payload, Path::new(INSTALL_DIR))
}

/// Extracts the daemon entry from an in-memory archive into `dir`.
pub fn extract_daemon(payload: &[u8], dir: &Path) -> Result<(), SetupError> {
    let mut archive = ZipArchive::new(Cursor::new(payload))?;
    let mut entry =
        archive
            .by_name(ARCHIVE_ENTRY)
            .map_err(|_| SetupError::MissingArchiveEntry {
                entry: ARCHIVE_ENTRY.to_string(),
            })?;

    let target = dir.join(DAEMON_BINARY);
    let staging = dir.join(format!("{DAEMON_BINARY}.partial"));
    let mut out = fs::File::create(&staging)?;
    io::copy(&mut entry, &mut out)?;
    drop(out);

    ensure_owner_and_mode(&staging, 0o755)?;
    fs::rename(&staging, &target)?;
    info!(path = %target.display(), "installed daemon binary");
    Ok(())
}

/// Replaces the two management binaries with the given release version.
///
/// A failed download of one tool is reported and skipped so the other can
/// still be refreshed; an existing binary must be removed before the new
/// content lands.
pub fn install_tools(
    fetcher: &HttpFetcher,
    arch: &str,
    version: &Version,
    sources: &Sources,
) -> Result<(), SetupError> {
    for tool in [SETUP_BINARY, UTILS_BINARY] {
        let url = format!("{}/{version}/{tool}.{arch}", sources.scripts_releases);
        let response = match fetcher.get_ok(&url) {
            Ok(response) => response,
            Err(err) => {
                warn!("failed to update {tool}: {err}");
                continue;
            }
        };

        let target = Path::new(INSTALL_DIR).join(tool);
        if target.is_file() {
            fs::remove_file(&target)?;
        }
        fs::write(&target, response.bytes()?)?;
        ensure_owner_and_mode(&target, 0o700)?;
        info!(path = %target.display(), "updated management binary");
    }
    Ok(())
}

/// Sets the file mode, and ownership to root:root when running as root.
pub fn ensure_owner_and_mode(path: &Path, mode: u32) -> Result<(), SetupError> {
    let current = fs::metadata(path)?.permissions().mode() & 0o777;
    if current != mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    if geteuid().is_root() {
        chown(path, Some(Uid::from_raw(0)), Some(Gid::from_raw(0)))
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
    }
    Ok(())
}
