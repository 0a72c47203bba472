mod commands;
mod config;
mod problem;

use clap::{Parser, Subcommand};
use config::RunConfig;
use curvetrack_core::error::exit_code_for;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "curvetrack", about = "Homotopy path tracking and curve sampling")]
struct Cli {
    /// Run configuration (TOML); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track critical points of one projection to those of another
    Track {
        /// Problem file (JSON)
        problem: PathBuf,

        /// Where to write the resulting witness set
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Sample the edges of a decomposed curve
    Sample {
        /// Problem file (JSON)
        problem: PathBuf,

        /// Directory receiving the results directory and Dir_Name
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = RunConfig::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::Track { problem, output } => commands::cmd_track(problem, &config, output),
        Commands::Sample { problem, output_dir } => commands::cmd_sample(problem, &config, output_dir),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(&cli) {
        eprintln!("error: {:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}
