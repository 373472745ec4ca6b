//! Command line entry point for issuing and inspecting user API keys

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures::FutureExt;
use uuid::Uuid;
use vault_session::{
    ApiKeyVaultRepository, HttpSecretsEngine, VaultResult, VaultSessionFactory, VaultSettings,
    logging,
};

#[derive(Debug, Parser)]
#[command(name = "vault-session", version, about = "Manage user API keys stored in Vault")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Issue a new API key for a user and store it
    Issue {
        #[arg(long)]
        user: Uuid,
    },
    /// Print a user's stored API keys
    Show {
        #[arg(long)]
        user: Uuid,
        /// Only resolve these key ids (repeatable)
        #[arg(long = "key-id")]
        key_ids: Vec<String>,
    },
}

async fn run(cli: Cli) -> VaultResult<()> {
    let settings = VaultSettings::from_env()?;
    let repository = ApiKeyVaultRepository::new(&settings);
    let factory = VaultSessionFactory::new(HttpSecretsEngine::new(settings)?);

    let output = match cli.command {
        Command::Issue { user } => {
            let issued = factory
                .scope(move |session| {
                    async move { repository.issue_api_key(session, user).await }.boxed()
                })
                .await?;
            serde_json::to_string_pretty(&issued)?
        }
        Command::Show { user, key_ids } if key_ids.is_empty() => {
            let keys = factory
                .scope(move |session| {
                    async move { repository.get_user_api_keys(session, user).await }.boxed()
                })
                .await?;
            serde_json::to_string_pretty(&keys)?
        }
        Command::Show { user, key_ids } => {
            let keys = factory
                .scope(move |session| {
                    async move { repository.resolve_api_keys(session, user, &key_ids).await }
                        .boxed()
                })
                .await?;
            serde_json::to_string_pretty(&keys)?
        }
    };

    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
