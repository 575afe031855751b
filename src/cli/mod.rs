pub mod commands;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::auth::UserIdentity;
use crate::config;
use crate::progress::{FileStore, KeyValueStore};

#[derive(Parser)]
#[command(name = "challenge")]
#[command(about = "Security challenge CLI - inspect puzzles, submit answers, manage progress")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, conflicts_with = "json", help = "Output in human-readable text format (default)")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "Progress directory (defaults to STORAGE_DATA_DIR)")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who the command acts for, as the auth provider would supply it
#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    #[arg(long, help = "User id")]
    pub user: String,

    #[arg(long, help = "Display name (used by the step 5 signature)")]
    pub name: Option<String>,

    #[arg(long, help = "Email address")]
    pub email: Option<String>,

    #[arg(long, help = "Challenge id (defaults to CHALLENGE_DEFAULT_ID)")]
    pub challenge: Option<String>,
}

impl UserArgs {
    pub fn identity(&self) -> UserIdentity {
        let mut identity = UserIdentity::new(self.user.trim());
        identity.display_name = self.name.clone();
        identity.email = self.email.clone();
        identity
    }

    pub fn challenge_id(&self) -> String {
        self.challenge
            .clone()
            .unwrap_or_else(|| config::config().challenge.default_challenge_id.clone())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show the derived puzzle values for a user")]
    Bundle(commands::bundle::BundleArgs),

    #[command(about = "Show challenge progress and step statuses")]
    Status(commands::status::StatusArgs),

    #[command(about = "Submit answers for a step")]
    Submit(commands::submit::SubmitArgs),

    #[command(about = "Inject a step's clues into a headless page and show what appears")]
    Clues(commands::clues::CluesArgs),

    #[command(about = "Forget all progress for a user")]
    Reset(commands::reset::ResetArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        match (cli.text, cli.json) {
            (false, true) => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config::config().storage.data_dir.clone());
    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(data_dir));

    match cli.command {
        Commands::Bundle(args) => commands::bundle::handle(args, output_format).await,
        Commands::Status(args) => commands::status::handle(args, storage, output_format).await,
        Commands::Submit(args) => commands::submit::handle(args, storage, output_format).await,
        Commands::Clues(args) => commands::clues::handle(args, storage, output_format).await,
        Commands::Reset(args) => commands::reset::handle(args, storage, output_format).await,
    }
}
