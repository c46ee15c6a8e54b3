//! OS family and architecture detection.
use std::fs;

use regex::Regex;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{info, warn};

use crate::{
    error::SetupError,
    runner::{RunRequest, run, run_quiet},
};

/// Path parsed for the distribution name and version.
const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Closed set of supported package-management families.
///
/// Each variant carries the capability record for its family: how packages
/// are installed, where the preloadable allocator lives, how the cron
/// service is named, and how system users are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum DistroFamily {
    /// apt-based distributions (Debian, Ubuntu, Raspbian, ...).
    Debian,
    /// yum-based distributions (CentOS, Fedora, Amazon, ...).
    RedHat,
}

impl DistroFamily {
    /// Non-interactive package installation command for this family.
    pub fn package_install_command(&self, package: &str) -> String {
        match self {
            Self::Debian => format!("/usr/bin/apt-get install {package} -y"),
            Self::RedHat => format!("/usr/bin/yum -d1 -y install {package}"),
        }
    }

    /// Path of the jemalloc shared library preloaded into the daemon.
    pub fn allocator_preload_path(&self) -> &'static str {
        match self {
            Self::Debian => "/usr/lib/x86_64-linux-gnu/libjemalloc.so.1",
            Self::RedHat => "/usr/lib64/libjemalloc.so.1",
        }
    }

    /// Package providing the cron daemon on this family.
    pub fn cron_package(&self) -> &'static str {
        match self {
            Self::Debian => "cron",
            Self::RedHat => "cronie",
        }
    }

    /// Unit name of the cron service on this family.
    pub fn cron_service(&self) -> &'static str {
        match self {
            Self::Debian => "cron",
            Self::RedHat => "crond",
        }
    }

    /// Command creating a no-login system user with a home directory.
    pub fn create_user_command(&self, user: &str) -> String {
        match self {
            Self::Debian => {
                format!("/usr/sbin/adduser {user} --gecos \"\" --disabled-password --system --group")
            }
            Self::RedHat => format!("/usr/sbin/adduser -r {user} -s /bin/false -b /home -m"),
        }
    }
}

/// Detected platform facts; immutable once probed for the run.
#[derive(Debug, Clone)]
pub struct PlatformInfo {
    /// Distribution name with any trailing "Linux"/"GNU/Linux" stripped.
    pub name: String,
    /// Package-management family, `None` for unrecognized distributions.
    pub family: Option<DistroFamily>,
    /// Major version component of `VERSION_ID`.
    pub major_version: u32,
    /// Machine architecture as reported by `uname -m`.
    pub architecture: String,
}

impl PlatformInfo {
    /// Whether this OS/version combination is supported for provisioning.
    pub fn is_supported(&self) -> bool {
        COMPAT_MATRIX.iter().any(|(name, versions)| {
            self.name.eq_ignore_ascii_case(name) && versions.contains(&self.major_version)
        })
    }
}

/// OS/major-version combinations the setup tool provisions.
const COMPAT_MATRIX: &[(&str, &[u32])] =
    &[("CentOS", &[7]), ("Debian", &[9]), ("Ubuntu", &[16, 18])];

/// Distribution short name to package-management family. Config data, matched
/// case-insensitively after suffix stripping.
const FAMILY_MAP: &[(&str, DistroFamily)] = &[
    ("Debian", DistroFamily::Debian),
    ("RedHat", DistroFamily::RedHat),
    ("Ubuntu", DistroFamily::Debian),
    ("Fedora", DistroFamily::RedHat),
    ("Chapeau", DistroFamily::RedHat),
    ("Korora", DistroFamily::RedHat),
    ("FedBerry", DistroFamily::RedHat),
    ("CentOS", DistroFamily::RedHat),
    ("GoOSe", DistroFamily::RedHat),
    ("Scientific", DistroFamily::RedHat),
    ("Amazon", DistroFamily::RedHat),
    ("CloudLinux", DistroFamily::RedHat),
    ("OVS", DistroFamily::RedHat),
    ("OEL", DistroFamily::RedHat),
    ("XCP", DistroFamily::RedHat),
    ("XenServer", DistroFamily::RedHat),
    ("RES", DistroFamily::RedHat),
    ("Sangoma", DistroFamily::RedHat),
    ("Mint", DistroFamily::Debian),
    ("ALT", DistroFamily::RedHat),
    ("Trisquel", DistroFamily::Debian),
    ("GCEL", DistroFamily::Debian),
    ("Linaro", DistroFamily::Debian),
    ("elementary OS", DistroFamily::Debian),
    ("ScientificLinux", DistroFamily::RedHat),
    ("Raspbian", DistroFamily::Debian),
    ("Devuan", DistroFamily::Debian),
    ("antiX", DistroFamily::Debian),
    ("Kali", DistroFamily::Debian),
    ("neon", DistroFamily::Debian),
    ("Cumulus", DistroFamily::Debian),
    ("Deepin", DistroFamily::Debian),
    ("KDE neon", DistroFamily::Debian),
    ("IDMS", DistroFamily::Debian),
];

/// Probes the running host.
///
/// Unknown distributions yield `family = None`; callers degrade (skip
/// package installs, warn) instead of failing.
pub fn detect() -> PlatformInfo {
    let os_release = fs::read_to_string(OS_RELEASE_PATH).unwrap_or_default();
    let (raw_name, major_version) = parse_os_release(&os_release);
    let name = strip_linux_suffix(&raw_name);
    let family = family_for(&name);
    if family.is_none() {
        warn!("unrecognized distribution '{name}'; package installation will be skipped");
    }

    let architecture = run_quiet(&RunRequest::new("uname -m"))
        .map(|output| output.stdout_trimmed().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let platform = PlatformInfo {
        name,
        family,
        major_version,
        architecture,
    };
    info!(
        name = %platform.name,
        family = ?platform.family,
        version = platform.major_version,
        arch = %platform.architecture,
        "detected platform"
    );
    platform
}

/// Installs an OS package through the family's package manager.
pub fn install_package(family: DistroFamily, package: &str) -> Result<(), SetupError> {
    run(&RunRequest::new(family.package_install_command(package))).map_err(|err| {
        warn!("package install failed: {err}");
        SetupError::PackageInstallFailed {
            package: package.to_string(),
        }
    })?;
    Ok(())
}

/// Maps a stripped distribution name onto its family.
pub fn family_for(name: &str) -> Option<DistroFamily> {
    FAMILY_MAP
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, family)| *family)
}

/// Strips a trailing " Linux" or " GNU/Linux" from a distribution name.
pub fn strip_linux_suffix(name: &str) -> String {
    let re = Regex::new(r"\s+(?:GNU/)?Linux$").unwrap();
    re.replace(name.trim(), "").to_string()
}

fn parse_os_release(content: &str) -> (String, u32) {
    let mut name = String::new();
    let mut major_version = 0;
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("NAME=") {
            name = unquote(value).to_string();
        } else if let Some(value) = line.strip_prefix("VERSION_ID=") {
            major_version = unquote(value)
                .split('.')
                .next()
                .and_then(|major| major.parse().ok())
                .unwrap_or(0);
        }
    }
    (name, major_version)
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_lookup_is_case_insensitive() {
        assert_eq!(family_for("ubuntu"), Some(DistroFamily::Debian));
        assert_eq!(family_for("CentOS"), Some(DistroFamily::RedHat));
        assert_eq!(family_for("elementary os"), Some(DistroFamily::Debian));
        assert_eq!(family_for("Slackware"), None);
    }

    #[test]
    fn linux_suffixes_are_stripped() {
        assert_eq!(strip_linux_suffix("Raspbian GNU/Linux"), "Raspbian");
        assert_eq!(strip_linux_suffix("Amazon Linux"), "Amazon");
        assert_eq!(strip_linux_suffix("Ubuntu"), "Ubuntu");
    }

    #[test]
    fn os_release_fields_are_parsed() {
        let content = "NAME=\"Ubuntu\"\nVERSION_ID=\"18.04\"\nPRETTY_NAME=\"Ubuntu 18.04 LTS\"\n";
        let (name, version) = parse_os_release(content);
        assert_eq!(name, "Ubuntu");
        assert_eq!(version, 18);
    }

    #[test]
    fn compat_matrix_gates_supported_versions() {
        let supported = PlatformInfo {
            name: "Ubuntu".to_string(),
            family: Some(DistroFamily::Debian),
            major_version: 18,
            architecture: "x86_64".to_string(),
        };
        assert!(supported.is_supported());

        let too_old = PlatformInfo {
            major_version: 14,
            ..supported.clone()
        };
        assert!(!too_old.is_supported());

        let unknown = PlatformInfo {
            name: "Slackware".to_string(),
            family: None,
            major_version: 15,
            architecture: "x86_64".to_string(),
        };
        assert!(!unknown.is_supported());
    }

    #[test]
    fn family_capabilities_differ() {
        assert!(
            DistroFamily::Debian
                .package_install_command("ufw")
                .starts_with("/usr/bin/apt-get")
        );
        assert!(
            DistroFamily::RedHat
                .package_install_command("ufw")
                .starts_with("/usr/bin/yum")
        );
        assert_ne!(
            DistroFamily::Debian.allocator_preload_path(),
            DistroFamily::RedHat.allocator_preload_path()
        );
        assert_eq!(DistroFamily::RedHat.cron_service(), "crond");
    }
}
