//! Orchestration of one `akroma-mn-setup` run.
use std::{fs, io, path::Path};

use fs2::FileExt;
use nix::unistd::geteuid;
use tracing::{info, warn};

use crate::{
    cli::SetupCli,
    constants::{
        DAEMON_BINARY, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT, DEFAULT_RUN_AS_USER, HTTP_TIMEOUT,
        INSTALL_DIR, LEGACY_SERVICE_NAME, LEGACY_UNIT_FILE_PATH, RUN_LOCK_PATH, SERVICE_NAME,
        SETUP_BINARY, Sources, UNIT_FILE_PATH, UTILS_BINARY,
    },
    cron,
    error::SetupError,
    firewall,
    http::HttpFetcher,
    install,
    platform::{self, DistroFamily},
    prompt,
    runner::{RunRequest, run},
    service, unit,
    unit::{NodeConfig, RecoveredConfig, UnitFile},
    version::{self, Channel},
};

/// Runs the full setup flow for the parsed arguments.
pub fn run_setup(mut args: SetupCli) -> Result<(), SetupError> {
    if !geteuid().is_root() {
        return Err(SetupError::RootRequired);
    }
    let _lock = acquire_run_lock(RUN_LOCK_PATH)?;

    let platform = platform::detect();
    if !platform.is_supported() {
        return Err(SetupError::UnsupportedPlatform {
            name: platform.name,
            version: platform.major_version,
        });
    }

    let mut restart_needed = migrate_legacy_unit()?;

    if args.interactive {
        args.remove = prompt::confirm("Remove masternode installation [y|N]", false)?;
    }
    if args.remove {
        return remove_installation();
    }

    let sources = Sources::default();
    let fetcher = HttpFetcher::new(HTTP_TIMEOUT)?;
    let daemon_versions = version::fetch_manifest(
        &fetcher,
        &sources.daemon_manifest,
        &format!("{INSTALL_DIR}/{DAEMON_BINARY} version"),
    )?;

    let unit_file = UnitFile::at_default_path();
    let unit_exists = unit_file.exists();
    let mut config = resolve_config(&args, &unit_file.recovered(), unit_exists);
    if args.interactive {
        interactive_overrides(&mut config)?;
    }
    config.validate()?;

    if let Some(user) = &config.run_as_user
        && !args.update_only
    {
        ensure_user(user, platform.family)?;
    }

    if args.interactive {
        args.ufw = prompt::confirm("Install and configure ufw [y|N]", false)?;
    }
    if args.ufw {
        firewall::configure(platform.family, &platform.architecture, &config)?;
    }

    let mut daemon_channel = version::resolve(&daemon_versions, args.geth);
    if args.interactive {
        daemon_channel = prompt_channel(daemon_channel)?;
    }
    if let Some(channel) = daemon_channel {
        let target = daemon_versions.version_of(channel);
        info!("installing/upgrading geth {target}");
        install::install_daemon(&fetcher, &platform.architecture, target, &sources)?;
        restart_needed = true;
    }

    if !args.update_only {
        let rendered = unit::render(&config, platform.family);
        if unit_file.reconcile(&rendered)? {
            service::daemon_reload()?;
            restart_needed = true;
        }
    }

    if restart_needed || !service::is_active(SERVICE_NAME) {
        info!("enabling and (re)starting {SERVICE_NAME} service");
        service::enable_and_restart(SERVICE_NAME)?;
    }

    if args.update_only {
        cron::remove()?;
    } else if !cron::entry_installed() {
        let wanted = if args.interactive {
            prompt::confirm("Auto-update Akroma MasterNode? [Y/n]", true)?
        } else {
            true
        };
        if wanted {
            cron::ensure(platform.family)?;
        }
    }

    let script_versions = version::fetch_manifest(
        &fetcher,
        &sources.scripts_manifest,
        &format!("{INSTALL_DIR}/{SETUP_BINARY} -v"),
    )?;
    if let Some(channel) = version::resolve(&script_versions, args.scripts) {
        let target = script_versions.version_of(channel);
        info!("updating management scripts to {target}");
        install::install_tools(&fetcher, &platform.architecture, target, &sources)?;
    }

    info!("Akroma MasterNode up-to-date");
    Ok(())
}

/// Merges CLI flags with configuration recovered from the previous unit
/// rendering and the fixed defaults.
///
/// The default run-as user applies only to fresh installations; an existing
/// unit without a `User=` line keeps running as root. Asking for user
/// `root` explicitly is the same as asking for no `User=` line.
fn resolve_config(args: &SetupCli, recovered: &RecoveredConfig, unit_exists: bool) -> NodeConfig {
    let mut run_as_user = args.user.clone().or_else(|| recovered.run_as_user.clone());
    if run_as_user.is_none() && !unit_exists {
        run_as_user = Some(DEFAULT_RUN_AS_USER.to_string());
    }
    if run_as_user.as_deref() == Some("root") {
        run_as_user = None;
    }

    let (rpc_user, rpc_password) = if args.no_rpcuser {
        (None, None)
    } else {
        (
            args.rpcuser.clone().or_else(|| recovered.rpc_user.clone()),
            args.rpcpassword
                .clone()
                .or_else(|| recovered.rpc_password.clone()),
        )
    };

    NodeConfig {
        run_as_user,
        port: args.port.or(recovered.port).unwrap_or(DEFAULT_P2P_PORT),
        rpc_port: args
            .rpcport
            .or(recovered.rpc_port)
            .unwrap_or(DEFAULT_RPC_PORT),
        rpc_user,
        rpc_password,
        use_jemalloc: args.jemalloc || recovered.use_jemalloc,
    }
}

fn interactive_overrides(config: &mut NodeConfig) -> Result<(), SetupError> {
    loop {
        let default = config.run_as_user.clone().unwrap_or_else(|| "root".to_string());
        let answer = prompt::read_line("Run akromanode as non-root user:", &default)?;
        if answer.is_empty() || answer == "root" {
            config.run_as_user = None;
            break;
        }
        if unit::is_valid_username(&answer) {
            config.run_as_user = Some(answer);
            break;
        }
        println!("Please provide a valid username.");
    }

    config.port = prompt_port("Network listening port:", config.port)?;
    config.rpc_port = prompt_port("RPC Port:", config.rpc_port)?;

    if config.rpc_user.is_some()
        && prompt::confirm("Remove RPC User/Password [y|N]", false)?
    {
        config.rpc_user = None;
        config.rpc_password = None;
        return Ok(());
    }

    loop {
        let default = config.rpc_user.clone().unwrap_or_default();
        let answer = prompt::read_line("RPC User (Optional):", &default)?;
        if answer.is_empty() {
            config.rpc_user = None;
            config.rpc_password = None;
            return Ok(());
        }
        if unit::is_valid_rpc_credential(&answer) {
            config.rpc_user = Some(answer);
            break;
        }
        println!("Invalid RPC User.");
    }
    loop {
        let default = config.rpc_password.clone().unwrap_or_default();
        let answer = prompt::read_line("RPC Password:", &default)?;
        if unit::is_valid_rpc_credential(&answer) {
            config.rpc_password = Some(answer);
            break;
        }
        println!("Invalid RPC Password.");
    }
    Ok(())
}

fn prompt_port(question: &str, current: u16) -> Result<u16, SetupError> {
    loop {
        let answer = prompt::read_line(question, &current.to_string())?;
        match answer.parse::<u16>() {
            Ok(port) => return Ok(port),
            Err(_) => println!("Invalid port."),
        }
    }
}

fn prompt_channel(current: Option<Channel>) -> Result<Option<Channel>, SetupError> {
    loop {
        let default = current.map(|channel| channel.to_string()).unwrap_or_default();
        let answer = prompt::read_line("Geth version to use (stable or latest):", &default)?;
        if answer.is_empty() {
            return Ok(None);
        }
        match answer.parse::<Channel>() {
            Ok(channel) => return Ok(Some(channel)),
            Err(_) => println!("Geth version must be stable or latest."),
        }
    }
}

/// Stops an active pre-rename `masternode` service and adopts its unit file
/// under the current name. Returns whether a restart is now required.
fn migrate_legacy_unit() -> Result<bool, SetupError> {
    if !service::is_active(LEGACY_SERVICE_NAME) {
        return Ok(false);
    }
    info!("migrating {LEGACY_SERVICE_NAME} service to {SERVICE_NAME}");
    if !service::systemctl_ok("stop", LEGACY_SERVICE_NAME) {
        return Err(SetupError::ServiceControlFailed {
            service: LEGACY_SERVICE_NAME.to_string(),
            action: "stop".to_string(),
        });
    }
    fs::rename(LEGACY_UNIT_FILE_PATH, UNIT_FILE_PATH)?;
    service::daemon_reload()?;
    Ok(true)
}

/// Uninstalls the service unit, the cron entry, and the three installed
/// binaries.
fn remove_installation() -> Result<(), SetupError> {
    info!("removing masternode installation");
    let unit_file = UnitFile::at_default_path();
    if unit_file.exists() {
        for action in ["stop", "disable"] {
            if !service::systemctl_ok(action, SERVICE_NAME) {
                return Err(SetupError::ServiceControlFailed {
                    service: SERVICE_NAME.to_string(),
                    action: action.to_string(),
                });
            }
        }
        // `systemctl disable` removes symlinked units itself.
        unit_file.remove()?;
    }
    cron::remove()?;
    for binary in [DAEMON_BINARY, SETUP_BINARY, UTILS_BINARY] {
        let path = Path::new(INSTALL_DIR).join(binary);
        if path.is_file() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn ensure_user(user: &str, family: Option<DistroFamily>) -> Result<(), SetupError> {
    info!("user configuration");
    if let Ok(Some(_)) = nix::unistd::User::from_name(user) {
        info!("user {user} found");
        return Ok(());
    }

    let Some(family) = family else {
        warn!("unknown distro family; cannot create user '{user}'");
        return Err(SetupError::UserCreateFailed {
            user: user.to_string(),
        });
    };
    info!("creating user {user}");
    run(&RunRequest::new(family.create_user_command(user))).map_err(|err| {
        warn!("user creation failed: {err}");
        SetupError::UserCreateFailed {
            user: user.to_string(),
        }
    })?;
    Ok(())
}

struct RunLock {
    _file: fs::File,
}

/// Takes the advisory run lock guarding against an operator invocation
/// racing the self-update cron invocation.
fn acquire_run_lock(path: &str) -> Result<RunLock, SetupError> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(RunLock { _file: file }),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(SetupError::AlreadyRunning),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn args() -> SetupCli {
        SetupCli {
            interactive: false,
            geth: None,
            scripts: None,
            remove: false,
            rpcport: None,
            port: None,
            user: None,
            rpcuser: None,
            rpcpassword: None,
            no_rpcuser: false,
            jemalloc: false,
            ufw: false,
            update_only: false,
            version: false,
        }
    }

    #[test]
    fn fresh_install_defaults_to_the_akroma_user() {
        let config = resolve_config(&args(), &RecoveredConfig::default(), false);
        assert_eq!(config.run_as_user.as_deref(), Some("akroma"));
        assert_eq!(config.port, DEFAULT_P2P_PORT);
        assert_eq!(config.rpc_port, DEFAULT_RPC_PORT);
    }

    #[test]
    fn existing_unit_without_user_line_keeps_running_as_root() {
        let config = resolve_config(&args(), &RecoveredConfig::default(), true);
        assert_eq!(config.run_as_user, None);
    }

    #[test]
    fn explicit_root_user_means_no_user_line() {
        let mut cli = args();
        cli.user = Some("root".to_string());
        let config = resolve_config(&cli, &RecoveredConfig::default(), false);
        assert_eq!(config.run_as_user, None);
    }

    #[test]
    fn recovered_values_fill_in_for_missing_flags() {
        let recovered = RecoveredConfig {
            run_as_user: Some("akroma".to_string()),
            port: Some(30304),
            rpc_port: Some(8546),
            rpc_user: Some("rpc".to_string()),
            rpc_password: Some("secret99".to_string()),
            use_jemalloc: true,
        };

        let config = resolve_config(&args(), &recovered, true);

        assert_eq!(config.run_as_user.as_deref(), Some("akroma"));
        assert_eq!(config.port, 30304);
        assert_eq!(config.rpc_port, 8546);
        assert_eq!(config.rpc_user.as_deref(), Some("rpc"));
        assert!(config.use_jemalloc);
    }

    #[test]
    fn explicit_flags_override_recovered_values() {
        let recovered = RecoveredConfig {
            port: Some(30304),
            rpc_port: Some(8546),
            ..RecoveredConfig::default()
        };
        let mut cli = args();
        cli.port = Some(30400);

        let config = resolve_config(&cli, &recovered, true);

        assert_eq!(config.port, 30400);
        assert_eq!(config.rpc_port, 8546);
    }

    #[test]
    fn no_rpcuser_clears_recovered_credentials() {
        let recovered = RecoveredConfig {
            rpc_user: Some("rpc".to_string()),
            rpc_password: Some("secret99".to_string()),
            ..RecoveredConfig::default()
        };
        let mut cli = args();
        cli.no_rpcuser = true;

        let config = resolve_config(&cli, &recovered, true);

        assert_eq!(config.rpc_user, None);
        assert_eq!(config.rpc_password, None);
    }

    #[test]
    fn run_lock_refuses_a_second_holder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("setup.lock");
        let path = path.to_str().unwrap();

        let _held = acquire_run_lock(path).unwrap();
        assert!(matches!(
            acquire_run_lock(path),
            Err(SetupError::AlreadyRunning)
        ));
    }
}
