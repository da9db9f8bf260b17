//! Sepsis CLI - train and query length-stratified bagging ensembles
//!
//! This CLI provides a `sepsis` command for training ensembles of sequence
//! classifiers on patient event data and running soft-vote predictions.

mod commands;
mod config;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{buckets, list, predict, train, BucketsArgs, ListArgs, PredictArgs, TrainArgs};

/// Sepsis CLI - bagging ensembles over variable-length event sequences
#[derive(Parser, Debug)]
#[command(
    name = "sepsis",
    author,
    version,
    about = "Train and query bagging ensembles for sepsis prediction",
    long_about = "Trains class-balanced bagging ensembles over length-bucketed patient event sequences.\nRuns resume from whatever estimators were already persisted in the output directory."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train (or resume) an ensemble
    ///
    /// Draws a class-balanced sample per estimator, batches it by sequence
    /// length and persists each trained estimator under the output directory.
    Train(TrainArgs),

    /// Predict with a trained ensemble using soft voting
    Predict(PredictArgs),

    /// List the estimators of a trained ensemble
    List(ListArgs),

    /// Show the sequence-length histogram and batch counts of a dataset
    Buckets(BucketsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Train(args) => train::execute(args).await?,
        Command::Predict(args) => predict::execute(args).await?,
        Command::List(args) => list::execute(args).await?,
        Command::Buckets(args) => buckets::execute(args).await?,
    }

    Ok(())
}
