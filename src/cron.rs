//! Management of the daily auto-update crontab entry.
//!
//! The entry lives in root's crontab, tagged with a marker comment so it can
//! be found and removed without disturbing unrelated lines. The schedule is
//! randomized per install to spread update load across the network.
use rand::Rng;
use tracing::info;

use crate::{
    constants::{CRON_MARKER, INSTALL_DIR, SETUP_BINARY},
    error::SetupError,
    platform::{self, DistroFamily},
    runner::{RunRequest, run, run_quiet},
    service,
};

/// Whether the auto-update entry is present in the crontab.
pub fn entry_installed() -> bool {
    crontab_lines().iter().any(|line| line.contains(CRON_MARKER))
}

/// Installs the auto-update entry and makes sure a cron daemon is running.
///
/// No-op when the entry already exists, so the randomized schedule survives
/// re-runs.
pub fn ensure(family: Option<DistroFamily>) -> Result<(), SetupError> {
    if entry_installed() {
        return Ok(());
    }

    info!("enabling masternode auto-update");
    let mut rng = rand::thread_rng();
    let mut lines = crontab_lines();
    lines.push(schedule_line(rng.gen_range(0..60), rng.gen_range(0..24)));
    write_crontab(&lines)?;

    match family {
        Some(family) => {
            platform::install_package(family, family.cron_package())?;
            service::enable_and_start(family.cron_service());
        }
        None => info!("unknown distro family; assuming a cron daemon is already present"),
    }
    Ok(())
}

/// Removes every marked auto-update entry.
pub fn remove() -> Result<(), SetupError> {
    let lines = crontab_lines();
    let kept = without_marked(&lines);
    if kept.len() != lines.len() {
        info!("removing masternode auto-update entry");
        write_crontab(&kept)?;
    }
    Ok(())
}

fn schedule_line(minute: u8, hour: u8) -> String {
    format!("{minute} {hour} * * * {INSTALL_DIR}/{SETUP_BINARY} # {CRON_MARKER}")
}

fn without_marked(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| !line.contains(CRON_MARKER))
        .cloned()
        .collect()
}

fn crontab_lines() -> Vec<String> {
    // `crontab -l` exits non-zero when no crontab exists yet.
    run_quiet(&RunRequest::new("crontab -l"))
        .map(|output| output.stdout.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn write_crontab(lines: &[String]) -> Result<(), SetupError> {
    let mut payload = lines.join("\n");
    if !payload.is_empty() {
        payload.push('\n');
    }
    run(&RunRequest::new("crontab -").stdin(payload))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_line_runs_the_setup_tool_with_the_marker() {
        let line = schedule_line(17, 4);
        assert_eq!(
            line,
            "17 4 * * * /usr/sbin/akroma-mn-setup # Akroma MasterNode Auto-Update"
        );
        assert!(line.contains(CRON_MARKER));
    }

    #[test]
    fn removal_strips_only_marked_lines() {
        let lines = vec![
            "0 0 * * * /usr/bin/backup".to_string(),
            schedule_line(5, 3),
            "# unrelated comment".to_string(),
        ];

        let kept = without_marked(&lines);

        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|line| !line.contains(CRON_MARKER)));
    }
}
