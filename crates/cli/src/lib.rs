pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tokenbot",
    about = "Tokenbot operator CLI",
    long_about = "Operate the tokenbot grant store: migrations, config inspection, readiness checks, and grant import/export.",
    after_help = "Examples:\n  tokenbot doctor --json\n  tokenbot export --output grants.json\n  tokenbot import grants.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack credentials, sinks, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the recognition tokens that can be granted")]
    Tokens,
    #[command(about = "Write every stored grant as a JSON array")]
    Export {
        #[arg(long, short, help = "Write to this file instead of stdout")]
        output: Option<PathBuf>,
    },
    #[command(about = "Load grants from a JSON array produced by `export`")]
    Import {
        #[arg(help = "Path to the JSON file")]
        file: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Tokens => {
            commands::CommandResult { exit_code: 0, output: commands::tokens::run() }
        }
        Command::Export { output } => commands::export::run(output.as_deref()),
        Command::Import { file } => commands::import::run(&file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
