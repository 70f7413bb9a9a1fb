pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::{GenerateOptions, ValidateOptions};

#[derive(Debug, Parser)]
#[command(
    name = "deckyard",
    about = "Deckyard proposal assembly CLI",
    long_about = "Generate and validate multi-location sales proposals, inspect configuration, and check runtime readiness.",
    after_help = "Examples:\n  deckyard generate --request request.json\n  deckyard validate --request request.json\n  deckyard doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a deckyard.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Render a proposal document from a JSON request and print the response")]
    Generate {
        #[arg(long, help = "Path to the proposal request JSON")]
        request: PathBuf,
        #[arg(long, help = "Directory that receives the generated document")]
        output_dir: Option<PathBuf>,
    },
    #[command(about = "Validate a JSON request against the catalog without rendering")]
    Validate {
        #[arg(long, help = "Path to the proposal request JSON")]
        request: PathBuf,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Check converter, template storage, catalog and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config;

    let result = match cli.command {
        Command::Generate { request, output_dir } => {
            commands::generate::run(&GenerateOptions { config_path, request, output_dir })
        }
        Command::Validate { request } => commands::validate::run(&ValidateOptions { config_path, request }),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config_path.as_deref()) }
        }
        Command::Doctor { json } => commands::doctor::run(config_path.as_deref(), json),
        Command::Migrate => commands::migrate::run(config_path.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
