//! warpforge - putting things together, consistently.
//!
//! A hermetic, content-addressed build tool: declare a plot (a graph of build
//! steps) or a formula (one sandboxed execution), and warpforge resolves
//! symbolic inputs through layered catalogs, executes inside an isolated
//! container filesystem, captures outputs as content-addressed wares, and
//! memoizes runs by input fingerprint.
//!
//! ```bash
//! # Scaffold a module and run its hello-world plot
//! warpforge quickstart example.org/hello
//! warpforge run
//!
//! # Add a tarball to the root workspace catalog, then release
//! warpforge add tar example.com/lib:v1.0:x86_64 https://example.com/lib.tgz
//! warpforge release v1.0
//!
//! # JSON output for scripting
//! warpforge --json status | jq .
//! ```

mod cli;
mod commands;
mod context;
mod files;
mod gitops;
mod output;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Cli;
use crate::context::CliContext;

/// Initialize tracing: compact human output on stderr filtered by the
/// verbosity flags, plus an optional JSON span-event layer writing to the
/// `--trace` file.
fn init_tracing(quiet: bool, verbose: bool, trace_file: Option<&std::path::Path>) -> anyhow::Result<()> {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let trace_layer = match trace_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(trace_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.global.quiet, cli.global.verbose, cli.global.trace.as_deref()) {
        eprintln!("error: failed to set up tracing: {err}");
        std::process::exit(1);
    }

    let is_json = cli.global.json;
    let context = match CliContext::gather(&cli.global).await {
        Ok(context) => context,
        Err(err) => {
            output::render_error(&err, is_json);
            std::process::exit(1);
        }
    };

    if let Err(err) = cli.run(&context).await {
        output::render_error(&err, is_json);
        std::process::exit(1);
    }
}
