//! dcc CLI - dependency-driven C/C++ compiler front end

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod build;
mod cli;

use cli::Cli;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // DCC_LOG overrides the --debug switch
    let filter = EnvFilter::try_from_env("DCC_LOG").unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("dcc=debug")
        } else {
            EnvFilter::new("dcc=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    build::execute(cli)
}
