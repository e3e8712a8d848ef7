use clap::{Parser, Subcommand};
use travelpilot_server::commands;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat API server
    Serve,

    /// Ask a single question and print the answer
    Ask {
        /// The question to send to the agent
        prompt: String,
    },

    /// Check the credential and the extension commands
    Diagnose,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::serve::run().await?,
        Commands::Ask { prompt } => commands::ask::run(&prompt).await?,
        Commands::Diagnose => commands::diagnose::run()?,
    }

    Ok(())
}
