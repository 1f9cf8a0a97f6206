//! Resolves the `pg0` engine binary, installing it when the host has none,
//! and prints its path.
//!
//! Overrides are read from the `PG0_*` environment variables parsed by
//! [`OrthoConfig`](https://github.com/leynos/ortho-config). The binary exits
//! with status code `0` on success and `1` on error.

use std::io::Write;

use clap::Parser;
use color_eyre::eyre::Context;
use pg0_client::{Pg0Error, Resolver, ResolverConfig};
use tracing_subscriber::EnvFilter;

/// Locate or install the pg0 engine binary.
#[derive(Debug, Parser)]
#[command(name = "pg0-install", version)]
struct Cli {
    /// Release tag to install, e.g. `v0.9.0` (defaults to the latest release).
    #[arg(long = "engine-version", value_name = "TAG")]
    engine_version: Option<String>,

    /// Reinstall even when the install directory already holds the engine.
    #[arg(short, long)]
    force: bool,

    /// Log resolution steps to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "pg0=debug" } else { "pg0=warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = ResolverConfig::from_env().map_err(Pg0Error::into_report)?;
    let resolver = Resolver::new(config);
    let binary = if cli.force || cli.engine_version.is_some() {
        resolver.install(cli.engine_version.as_deref(), cli.force)
    } else {
        resolver.resolve()
    }
    .map_err(Pg0Error::into_report)?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", binary.path()).context("write engine path")?;
    Ok(())
}
