//! Command-line interfaces for the setup and utils binaries.
use clap::Parser;

use crate::version::Channel;

/// Command-line interface for `akroma-mn-setup`.
#[derive(Parser, Debug)]
#[command(name = "akroma-mn-setup")]
#[command(about = "Akroma MasterNode setup and auto-update", long_about = None)]
pub struct SetupCli {
    /// Interactively install/upgrade the masternode.
    #[arg(short, long)]
    pub interactive: bool,

    /// Geth release channel to install (stable or latest).
    #[arg(short, long, value_name = "CHANNEL")]
    pub geth: Option<Channel>,

    /// Management-script release channel to install (stable or latest).
    #[arg(short, long, value_name = "CHANNEL")]
    pub scripts: Option<Channel>,

    /// Uninstall the masternode.
    #[arg(short, long)]
    pub remove: bool,

    /// RPC port (default: 8545).
    #[arg(short = 'p', long, value_name = "PORT")]
    pub rpcport: Option<u16>,

    /// Network listening port (default: 30303).
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Run the masternode as a non-root user (default when given bare: akroma).
    #[arg(
        short,
        long,
        value_name = "NAME",
        num_args = 0..=1,
        default_missing_value = "akroma"
    )]
    pub user: Option<String>,

    /// RPC user.
    #[arg(long, value_name = "NAME")]
    pub rpcuser: Option<String>,

    /// RPC password.
    #[arg(long, value_name = "SECRET")]
    pub rpcpassword: Option<String>,

    /// Remove any configured RPC user/password.
    #[arg(long = "no-rpcuser", alias = "no-rpcpassword")]
    pub no_rpcuser: bool,

    /// Preload the jemalloc allocator in the service unit.
    #[arg(long)]
    pub jemalloc: bool,

    /// Install and configure ufw.
    #[arg(long)]
    pub ufw: bool,

    /// Update geth and the management scripts only; disables the auto-update cron entry.
    #[arg(long = "update-only")]
    pub update_only: bool,

    /// Print the script version.
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

/// Command-line interface for `akroma-mn-utils`.
#[derive(Parser, Debug)]
#[command(name = "akroma-mn-utils")]
#[command(about = "Akroma MasterNode health report", long_about = None)]
pub struct UtilsCli {
    /// Print the script version.
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_user_flag_defaults_to_akroma() {
        let cli = SetupCli::try_parse_from(["akroma-mn-setup", "--user"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("akroma"));

        let cli = SetupCli::try_parse_from(["akroma-mn-setup", "--user", "node-1"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("node-1"));
    }

    #[test]
    fn channel_values_parse() {
        let cli = SetupCli::try_parse_from(["akroma-mn-setup", "--geth", "latest"]).unwrap();
        assert_eq!(cli.geth, Some(Channel::Latest));

        assert!(SetupCli::try_parse_from(["akroma-mn-setup", "--geth", "nightly"]).is_err());
    }

    #[test]
    fn no_rpcpassword_aliases_no_rpcuser() {
        let cli = SetupCli::try_parse_from(["akroma-mn-setup", "--no-rpcpassword"]).unwrap();
        assert!(cli.no_rpcuser);
    }

    #[test]
    fn ports_reject_non_numeric_values() {
        assert!(SetupCli::try_parse_from(["akroma-mn-setup", "--port", "p2p"]).is_err());
        assert!(SetupCli::try_parse_from(["akroma-mn-setup", "-p", "70000"]).is_err());
    }

    #[test]
    fn utils_cli_accepts_only_the_version_flag() {
        let cli = UtilsCli::try_parse_from(["akroma-mn-utils", "-v"]).unwrap();
        assert!(cli.version);
        assert!(UtilsCli::try_parse_from(["akroma-mn-utils", "--remove"]).is_err());
    }
}
