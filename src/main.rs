use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use internship_sync::internship::{
    self, SyncOptions, DEFAULT_DOCUMENT, DEFAULT_REPOSITORY, DEFAULT_SUMMARY_FILE,
};
use internship_sync::mcp::McpConnector;
use internship_sync::providers::OpenAIProvider;
use internship_sync::Config;

#[derive(Parser)]
#[command(name = "internship-sync")]
#[command(about = "Reconcile a GitHub internship listing into a Google Doc", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the README and update the Google Doc
    Run {
        #[arg(long, default_value = DEFAULT_REPOSITORY, help = "Repository as owner/name")]
        repository: String,
        #[arg(long, default_value = DEFAULT_DOCUMENT, help = "Title of the Google Doc to update")]
        document: String,
        #[arg(
            long,
            default_value = DEFAULT_SUMMARY_FILE,
            help = "Where to write the change summary"
        )]
        output: PathBuf,
        #[arg(long, default_value_t = 20, help = "Model turns allowed per task")]
        max_iterations: usize,
    },
    /// Connect to both endpoints and list the tools they offer
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Run {
            repository,
            document,
            output,
            max_iterations,
        } => {
            let options = SyncOptions {
                repository,
                document_title: document,
                output_file: output,
                max_iterations,
            };
            run_sync(&options).await
        }
        Commands::Tools => list_tools().await,
    };

    if let Err(e) = outcome {
        internship::report_failure(&e, &mut std::io::stdout())?;
        std::process::exit(1);
    }

    Ok(())
}

async fn run_sync(options: &SyncOptions) -> Result<()> {
    let config = Config::from_env()?;
    let llm = Arc::new(OpenAIProvider::from_config(&config)?);

    let output = internship::run(&config, options, &McpConnector, llm).await?;

    println!("\n{}", output.raw);
    println!("\nSummary written to {}", options.output_file.display());
    Ok(())
}

async fn list_tools() -> Result<()> {
    let config = Config::from_env()?;
    let (github, google) = internship::discover(&config, &McpConnector).await?;
    println!("{} GitHub tools, {} Google tools", github.len(), google.len());
    Ok(())
}
