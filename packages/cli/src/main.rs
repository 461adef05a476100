mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, evaluate, inspect, prompt, CheckArgs, EvaluateArgs, InspectArgs, PromptArgs};
use config::Config;
use std::path::PathBuf;

/// Cardboard CLI - copyable cards, fields and the rules that follow them
#[derive(Parser, Debug)]
#[command(name = "cardboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every rule in a document and report what they did
    Evaluate(EvaluateArgs),

    /// Parse every rule source in a document
    Check(CheckArgs),

    /// Print the synthesis prompt for a field
    Prompt(PromptArgs),

    /// Print the object tree with values after rules
    Inspect(InspectArgs),
}

fn main() {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let result = Config::load(&cwd).and_then(|config| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
            )
            .with_writer(std::io::stderr)
            .init();

        match cli.command {
            Command::Evaluate(args) => evaluate(args, &config),
            Command::Check(args) => check(args, &config),
            Command::Prompt(args) => prompt(args, &config),
            Command::Inspect(args) => inspect(args, &config),
        }
    });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
