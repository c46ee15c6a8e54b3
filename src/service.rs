//! Thin systemctl wrappers.
//!
//! Service state is never cached; every question goes back to the init
//! system.
use tracing::warn;

use crate::{
    error::SetupError,
    runner::{RunRequest, run_quiet},
};

const SYSTEMCTL: &str = "/bin/systemctl";

/// Runs a systemctl verb against a unit, true on zero exit.
pub fn systemctl_ok(verb: &str, unit: &str) -> bool {
    run_quiet(&RunRequest::new(format!("{SYSTEMCTL} {verb} {unit}"))).is_some()
}

/// Whether the unit is currently active.
pub fn is_active(unit: &str) -> bool {
    systemctl_ok("is-active", unit)
}

/// Asks the init system to reload unit definitions. Fatal on failure.
pub fn daemon_reload() -> Result<(), SetupError> {
    if run_quiet(&RunRequest::new(format!("{SYSTEMCTL} daemon-reload"))).is_none() {
        return Err(SetupError::ServiceControlFailed {
            service: "systemd".to_string(),
            action: "daemon-reload".to_string(),
        });
    }
    Ok(())
}

/// Enables and restarts a unit. Fatal on failure: the daemon may be left
/// stopped, which the caller accepts as a fail-stop contract.
pub fn enable_and_restart(unit: &str) -> Result<(), SetupError> {
    for action in ["enable", "restart"] {
        if !systemctl_ok(action, unit) {
            return Err(SetupError::ServiceControlFailed {
                service: unit.to_string(),
                action: action.to_string(),
            });
        }
    }
    Ok(())
}

/// Best-effort enable + start for auxiliary services (cron, ufw).
pub fn enable_and_start(unit: &str) {
    for action in ["enable", "start"] {
        if !systemctl_ok(action, unit) {
            warn!("failed to {action} service '{unit}'");
        }
    }
}
