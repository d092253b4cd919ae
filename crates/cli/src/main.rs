//! upsync - Mirror a local directory tree into an object storage bucket

mod commands;
mod exit_code;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::deploy::{self, DeployArgs};
use crate::output::OutputConfig;

/// Mirror a local directory tree into an object storage bucket
#[derive(Parser, Debug)]
#[command(name = "upsync", version, about)]
struct Cli {
    #[command(flatten)]
    deploy: DeployArgs,

    /// Output strict JSON
    #[arg(long)]
    json: bool,

    /// Suppress progress and summary output
    #[arg(short, long)]
    quiet: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            quiet: self.quiet,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "upsync=debug,upsync_core=debug,upsync_s3=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let output_config = cli.output_config();
    deploy::execute(cli.deploy, output_config).await.into()
}
