mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "judge-cli")]
#[command(about = "Judge CLI - Load questions, submit code and inspect verdicts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a question (test cases and limits) from a JSON file
    AddQuestion {
        /// Path to the question JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Submit source code for judging
    Submit {
        /// Question to judge against
        #[arg(short, long)]
        question_id: u64,

        /// Language tag (java, c, cpp, python, rust)
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        source: PathBuf,

        /// Submitting user
        #[arg(short, long, default_value = "1")]
        user_id: u64,
    },

    /// Show a submission's status and verdict
    Status {
        /// Submission id
        #[arg(short, long)]
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::AddQuestion { file } => {
            commands::add_question(&file).await?;
        }
        Commands::Submit {
            question_id,
            language,
            source,
            user_id,
        } => {
            commands::submit(question_id, &language, &source, user_id).await?;
        }
        Commands::Status { id } => {
            commands::show_status(id).await?;
        }
    }

    Ok(())
}
