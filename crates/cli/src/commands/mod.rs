//! CLI command implementations.

pub mod migrate;
pub mod payments;
pub mod users;

use std::sync::Arc;

use titi_storefront::config::{ConfigError, database_url_from_env};
use titi_storefront::db::{PgStore, Stores, create_pool};

/// Errors shared by every command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] titi_storefront::db::RepositoryError),

    #[error("{0}")]
    Invalid(String),

    #[error("Pi API error: {0}")]
    Pi(#[from] titi_storefront::pi::PiError),

    #[error("Pi refused the request ({status}): {body}")]
    Upstream { status: u16, body: String },
}

/// Connect to the storefront database and wrap it in the store traits.
async fn connect() -> Result<Stores, CommandError> {
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to storefront database...");
    let pool = create_pool(&database_url).await?;
    Ok(Stores::from_backend(Arc::new(PgStore::new(pool))))
}
