use postgresql_embedded::PostgreSQL;
use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::QueryEngine;

/// A running embedded `PostgreSQL` instance plus an engine config pointing at it.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
    pub config: EngineConfig,
}

/// Start an embedded `PostgreSQL` server and create `db_name` on it.
///
/// Binaries are bundled, so nothing is downloaded at test time. The returned
/// config has the embedded superuser's credentials and has already been used
/// for a `SELECT 1` round trip.
///
/// # Errors
/// Returns an error if the server cannot be set up or started, the database
/// cannot be created, or the connectivity check fails.
pub async fn setup_postgres_embedded(
    db_name: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let mut postgresql = PostgreSQL::default();
    postgresql.setup().await?;
    postgresql.start().await?;
    postgresql.create_database(db_name).await?;

    let settings = postgresql.settings();
    let port = settings.port;
    let database_url = format!(
        "postgres://{}:{}@{}:{port}/{db_name}",
        settings.username, settings.password, settings.host
    );
    debug!(port, db_name, "embedded postgres started");

    let config = EngineConfig::new(database_url.clone()).with_max_pool_size(4);
    let engine = QueryEngine::connect(config.clone()).await?;
    engine.execute_batch("SELECT 1").await?;

    Ok(EmbeddedPostgres {
        postgresql,
        port,
        database_url,
        config,
    })
}

/// Stop a server started by [`setup_postgres_embedded`].
pub async fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    if let Err(e) = postgresql.stop().await {
        debug!(error = %e, "embedded postgres did not stop cleanly");
    }
}
