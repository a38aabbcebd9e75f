use anyhow::Result;
use clap::{Parser, Subcommand};
use schoolbase_assistant::config::AssistantConfig;
use schoolbase_assistant::DataAssistant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schoolbase-assistant")]
#[command(about = "Ask questions about the school database in plain language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question and print the JSON result
    Ask {
        /// The question, e.g. "How many students are registered in each belt rank?"
        question: String,
    },
    /// Print the schema description the generator is grounded on
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AssistantConfig::from_env()?;
    let assistant = DataAssistant::connect(&config).await?;

    match cli.command {
        Commands::Ask { question } => {
            let outcome = assistant.answer(&question).await;
            info!(success = outcome.is_success(), "Question answered");
            println!("{}", serde_json::to_string_pretty(&outcome.to_response())?);
        }
        Commands::Schema => {
            let description = assistant.schema_description().await?;
            println!("{}", description);
        }
    }

    Ok(())
}
