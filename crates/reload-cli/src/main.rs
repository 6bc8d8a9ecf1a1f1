use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod completion;
mod config;
mod dispatch;
mod logging;
mod render;

use completion::CliCompletionShell;
use logging::Logging;

#[derive(Parser, Debug)]
#[command(name = "studio-reload")]
#[command(about = "Hot reload of the studio snapshot package", long_about = None)]
struct Cli {
    /// Reload root holding bundles, download cache and state.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Catalog directory or URL; overrides `[catalog] location`.
    #[arg(long, global = true)]
    catalog: Option<String>,
    #[arg(long, global = true)]
    target_platform: Option<String>,
    /// Install live instead of queueing for the next restart.
    #[arg(long, global = true)]
    dev_mode: bool,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reload the current studio snapshot.
    Reload {
        #[arg(long)]
        validate: bool,
        #[arg(long)]
        user: Option<String>,
    },
    /// Run an automation operation by id.
    Invoke {
        operation: String,
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// List remote studio packages.
    Remote,
    /// Show local package records and queued installs.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show or clear installs queued for the next restart.
    Queue {
        #[arg(long)]
        clear: bool,
    },
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    Logging::try_init(cli.verbose)?;
    dispatch::run_cli(cli)
}
