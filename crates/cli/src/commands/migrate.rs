//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! titi-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! `crates/storefront/migrations/`, applied in file name order. The
//! storefront binary never runs them itself.

use titi_storefront::config::database_url_from_env;
use titi_storefront::db::create_pool;

use super::CommandError;

/// Run storefront database migrations.
pub async fn storefront() -> Result<(), CommandError> {
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to storefront database...");
    let pool = create_pool(&database_url).await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations")
        .run(&pool)
        .await
        .map_err(sqlx::Error::from)?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
