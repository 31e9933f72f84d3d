use async_trait::async_trait;
use bb8::Pool;
use tracing::{debug, trace};

use super::connection::PgDedicatedConnection;
use super::manager::PgManager;
use crate::config::EngineConfig;
use crate::error::{DriverError, PgMiddlewareError};
use crate::pool::{ConnectionHandle, Driver};

/// [`Driver`] backed by a bb8 pool of `tokio_postgres` clients.
#[derive(Clone)]
pub struct PgDriver {
    pool: Pool<PgManager>,
}

impl std::fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDriver")
            .field("state", &self.pool.state())
            .finish()
    }
}

impl PgDriver {
    /// Build the pool described by `config`.
    ///
    /// With `min_pool_size == 0` no connection is opened until the first checkout.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::Config` for an invalid config, or
    /// `PgMiddlewareError::Connection` if the pool cannot open its idle connections.
    pub async fn new(config: &EngineConfig) -> Result<Self, PgMiddlewareError> {
        config.validate()?;
        let pg_config = config.pg_config()?;
        let min_idle = (config.min_pool_size > 0).then_some(config.min_pool_size);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(min_idle)
            .test_on_check_out(false)
            .build(PgManager::new(pg_config))
            .await
            .map_err(|e| PgMiddlewareError::connection("postgres pool error", e.into()))?;

        debug!(
            max_size = config.max_pool_size,
            min_idle = config.min_pool_size,
            "postgres pool built"
        );
        Ok(Self { pool })
    }

    /// The underlying bb8 pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<PgManager> {
        &self.pool
    }
}

#[async_trait]
impl Driver for PgDriver {
    async fn acquire(&self) -> Result<ConnectionHandle, DriverError> {
        let conn = self.pool.get_owned().await?;
        trace!(state = ?self.pool.state(), "postgres checkout");
        Ok(ConnectionHandle::dropping(Box::new(conn)))
    }

    async fn connect(&self, data_source_name: &str) -> Result<ConnectionHandle, DriverError> {
        let config: tokio_postgres::Config = data_source_name.parse()?;
        let conn = PgDedicatedConnection::connect(&config).await?;
        debug!("dedicated postgres connection opened");
        Ok(ConnectionHandle::dropping(Box::new(conn)))
    }
}
