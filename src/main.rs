//! Catalog Fusion - search several music catalogs as one.
//!
//! Without a subcommand the help text is printed.

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use catalog_fusion::cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging (stderr so JSON output stays clean)
    let default_directive: Directive = "catalog_fusion=info".parse()?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(default_directive))
        .init();

    if !cli::run_command(&args)? {
        cli::Cli::command().print_help()?;
        println!();
    }
    Ok(())
}
