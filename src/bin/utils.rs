use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use akroma_mn::{
    cli::UtilsCli,
    constants::{HTTP_TIMEOUT, Sources},
    http::HttpFetcher,
    report,
};

fn main() -> ExitCode {
    let args = UtilsCli::parse();
    init_logging();

    if args.version {
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let fetcher = match HttpFetcher::new(HTTP_TIMEOUT) {
        Ok(fetcher) => fetcher,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return ExitCode::FAILURE;
        }
    };

    let report = report::collect(&fetcher, &Sources::default());
    print!("{}", report::render(&report));
    ExitCode::SUCCESS
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
