use clap::{Parser, Subcommand};
use evalkit_core::AppResult;
use evalkit_runner::{load_runner, Registry};
use std::path::PathBuf;
use std::process;
use tracing::debug;

mod logging;

use logging::LogFormat;

#[derive(Parser)]
#[command(name = "evalkit")]
#[command(about = "Lazy, cached evaluation pipelines: ingest predictions, compute metrics, plot and report.")]
struct Cli {
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the runner a config file describes and run it.
    Run {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
    },
    /// Build every component of a config file without running anything.
    Validate {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
    },
    /// List the registered component targets.
    Targets,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{}", err.message());
        process::exit(err.exit_code());
    }
}

fn run(cli: Cli) -> AppResult<()> {
    let format = LogFormat::parse(&cli.log_format)?;
    logging::init(&cli.log_level, format)?;
    let registry = Registry::with_builtins()?;
    debug!(targets = registry.len(), "registry ready");

    match cli.command {
        Commands::Run { config } => {
            let summary = load_runner(&config, &registry)?.run()?;
            for path in &summary.written {
                println!("{}", path.display());
            }
        }
        Commands::Validate { config } => {
            load_runner(&config, &registry)?;
            println!("{}: ok", config.display());
        }
        Commands::Targets => {
            for (target, capability) in registry.targets() {
                println!("{target}\t{capability}");
            }
        }
    }
    Ok(())
}
