//! Feedlens launcher.
//!
//! Thin clap front end over the library: a full engine demo against the
//! simulated feed, plus standalone utilities for the classifier and the
//! price-history store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use feedlens::cli::{run_classify, run_demo, run_history, ClassifyArgs, DemoArgs, HistoryArgs};
use feedlens_logging::{init_logging, LogConfig};

#[derive(Debug, Parser)]
#[command(name = "feedlens", about = "Identity tracking & search/filter engine for virtualized feeds")]
struct Cli {
    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Also write logs to ~/.feedlens/logs.
    #[arg(long, global = true)]
    log_file: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drive a full session against the simulated feed.
    Demo(DemoArgs),
    /// Classify a text snippet the way the visibility engine would.
    Classify(ClassifyArgs),
    /// Query a price-history database.
    History(HistoryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(LogConfig {
        app_name: "feedlens",
        verbose: cli.verbose,
        log_to_file: cli.log_file,
    })?;

    match cli.command {
        Command::Demo(args) => run_demo(args).await,
        Command::Classify(args) => run_classify(args),
        Command::History(args) => run_history(args),
    }
}
