//! Optional ufw provisioning.
use tracing::{info, warn};

use crate::{
    error::SetupError,
    platform::{self, DistroFamily},
    runner::{RunRequest, run},
    service,
    unit::NodeConfig,
};

const UFW: &str = "/usr/sbin/ufw";

/// Installs ufw and applies the masternode rule set.
///
/// Only 64-bit or Debian-family hosts are eligible; anything else is skipped
/// with a warning. Rule failures are fatal and may leave the rule set
/// partially applied.
pub fn configure(
    family: Option<DistroFamily>,
    arch: &str,
    config: &NodeConfig,
) -> Result<(), SetupError> {
    if arch != "x86_64" && family != Some(DistroFamily::Debian) {
        warn!("ufw is only supported on 64-bit architectures or Debian-family hosts; skipping");
        return Ok(());
    }
    let Some(family) = family else {
        warn!("unknown distro family; cannot install ufw, skipping firewall configuration");
        return Ok(());
    };

    info!("installing and configuring ufw");
    platform::install_package(family, "ufw")?;

    for rule in rules(config.rpc_port, config.port) {
        run(&RunRequest::new(rule.clone())).map_err(|err| {
            warn!("firewall command failed: {err}");
            SetupError::FirewallFailed { rule }
        })?;
    }

    service::enable_and_start("ufw");
    Ok(())
}

/// The fixed rule sequence: reset, deny-by-default, open ssh plus the node
/// ports, then enable.
fn rules(rpc_port: u16, p2p_port: u16) -> Vec<String> {
    vec![
        format!("{UFW} --force reset"),
        format!("{UFW} --force disable"),
        format!("{UFW} default deny incoming"),
        format!("{UFW} default allow outgoing"),
        format!("{UFW} allow ssh"),
        format!("{UFW} allow {rpc_port}/tcp"),
        format!("{UFW} allow {p2p_port}/tcp"),
        format!("{UFW} allow {p2p_port}/udp"),
        format!("{UFW} --force enable"),
        format!("{UFW} status"),
    ]
}
