mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::resources::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive conversation with the insurance assistant
    Chat,

    /// Ask a single question and print the answer
    Ask {
        /// The question, e.g. "does my policy cover towing?"
        message: String,
    },

    /// Print the external resources the deployed agent depends on
    Resources {
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Chat => commands::chat::execute(commands::build_agent()?).await,
        Command::Ask { message } => commands::ask::execute(commands::build_agent()?, message).await,
        Command::Resources { format } => commands::resources::execute(format),
    }
}
