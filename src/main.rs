#![recursion_limit = "256"]

use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

#[derive(Parser)]
#[command(
    name = "rlc-learn",
    version,
    about = "Observation encoders and action-log tools for RLC programs"
)]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a binary action log as text, one action per line
    Disassemble(cli::disassemble::DisassembleArgs),
    /// Compile an action schema into a binary program artifact
    CompileProgram(cli::compile::CompileArgs),
    /// Build an encoder from a config or checkpoint and report its shapes
    Inspect(cli::inspect::InspectArgs),
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match cli.command {
        Command::Disassemble(args) => cli::disassemble::cmd_disassemble(args),
        Command::CompileProgram(args) => cli::compile::cmd_compile(args),
        Command::Inspect(args) => cli::inspect::cmd_inspect(args),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
