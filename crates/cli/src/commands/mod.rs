//! Subcommand implementations.

pub mod migrate;
pub mod purge;
pub mod seed;

use secrecy::SecretString;

/// Errors shared by every command that talks to the database.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),
}

/// Read the storefront database URL, falling back to `DATABASE_URL`.
///
/// Loads `.env` first so the CLI sees the same settings as the server.
pub fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}
