//! Version parsing, manifest fetching, and update-channel resolution.
use std::{cmp::Ordering, fmt, str::FromStr};

use regex::Regex;
use serde::{Deserialize, Deserializer, de};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{
    error::SetupError,
    http::HttpFetcher,
    runner::{RunRequest, run_quiet},
};

/// Update track selecting which manifest version to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    /// The version upstream marks as stable.
    Stable,
    /// The newest published version.
    Latest,
}

/// Dotted numeric version, compared component-wise (`1.10.0 > 1.9.0`).
/// Missing components count as zero, so `1.2` equals `1.2.0`.
#[derive(Debug, Clone)]
pub struct Version(Vec<u64>);

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("version string is empty".to_string());
        }
        let components = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| format!("invalid version component '{part}' in '{trimmed}'"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Version(components))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|component| component.to_string())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{rendered}")
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.0.len().max(other.0.len());
        for index in 0..width {
            let left = self.0.get(index).copied().unwrap_or(0);
            let right = other.0.get(index).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Shape of the upstream versions.json document.
#[derive(Debug, Deserialize)]
pub struct RemoteVersions {
    /// Version currently marked stable.
    pub stable: Version,
    /// Newest published version.
    pub latest: Version,
}

/// Remote channel versions merged with the locally installed one.
#[derive(Debug)]
pub struct VersionManifest {
    /// Locally installed version; `None` when the probe fails ("Unknown").
    pub current: Option<Version>,
    /// Version currently marked stable.
    pub stable: Version,
    /// Newest published version.
    pub latest: Version,
}

impl VersionManifest {
    /// The manifest version a channel points at.
    pub fn version_of(&self, channel: Channel) -> &Version {
        match channel {
            Channel::Stable => &self.stable,
            Channel::Latest => &self.latest,
        }
    }

    /// Display form of the installed version.
    pub fn current_label(&self) -> String {
        self.current
            .as_ref()
            .map(Version::to_string)
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Decides which channel to install, if any.
///
/// An explicitly requested channel wins when its manifest version differs
/// from the installed one. Otherwise: an unknown or older-than-stable
/// installation gets `stable`; an installation ahead of stable but not on
/// `latest` gets `latest`; anything else is already current.
pub fn resolve(manifest: &VersionManifest, requested: Option<Channel>) -> Option<Channel> {
    if let Some(channel) = requested
        && manifest.current.as_ref() != Some(manifest.version_of(channel))
    {
        return Some(channel);
    }

    match &manifest.current {
        None => Some(Channel::Stable),
        Some(current) if *current < manifest.stable => Some(Channel::Stable),
        Some(current) if *current > manifest.stable && *current != manifest.latest => {
            Some(Channel::Latest)
        }
        Some(_) => None,
    }
}

/// Fetches the remote manifest and merges in the locally probed version.
///
/// A non-success manifest status is fatal for the step; a failing local
/// probe degrades `current` to `None`.
pub fn fetch_manifest(
    fetcher: &HttpFetcher,
    url: &str,
    probe_command: &str,
) -> Result<VersionManifest, SetupError> {
    let payload = fetcher.get_ok(url)?.text()?;
    let remote: RemoteVersions = serde_json::from_str(&payload)?;
    Ok(VersionManifest {
        current: installed_version(probe_command),
        stable: remote.stable,
        latest: remote.latest,
    })
}

/// Probes the locally installed version by running the given command and
/// extracting its `Version:` token. Any failure yields `None`.
pub fn installed_version(probe_command: &str) -> Option<Version> {
    let output = run_quiet(&RunRequest::new(probe_command))?;
    extract_version(&output.stdout)
}

fn extract_version(text: &str) -> Option<Version> {
    let re = Regex::new(r"Version:\s*([0-9][0-9.]*)").unwrap();
    let captured = re.captures(text)?.get(1)?.as_str();
    captured.trim_end_matches('.').parse().ok()
}
