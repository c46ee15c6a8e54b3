use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use akroma_mn::{cli::SetupCli, error::SetupError, setup};

fn main() -> ExitCode {
    let args = SetupCli::parse();
    init_logging();

    if args.version {
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match setup::run_setup(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ SetupError::UnsupportedPlatform { .. }) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
