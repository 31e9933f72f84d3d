use std::sync::Arc;

use async_trait::async_trait;
use bb8::PooledConnection;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, Client, NoTls};
use tracing::{debug, trace, warn};

use super::manager::PgManager;
use super::params::Params;
use super::query::{build_result_set_from_rows, build_row, column_names};
use crate::error::DriverError;
use crate::pool::{DriverConnection, RowStream};
use crate::results::ResultSet;
use crate::types::{Notification, RowValues};

/// Connection checked out of the bb8 pool; dropping it returns it.
pub type PooledClient = PooledConnection<'static, PgManager>;

async fn query_on_client(
    client: &Client,
    sql: &str,
    params: &[RowValues],
) -> Result<ResultSet, DriverError> {
    let converted = Params::convert(params);
    let rows = client.query(sql, converted.as_refs()).await?;
    build_result_set_from_rows(&rows)
}

async fn execute_on_client(
    client: &Client,
    sql: &str,
    params: &[RowValues],
) -> Result<u64, DriverError> {
    let converted = Params::convert(params);
    Ok(client.execute(sql, converted.as_refs()).await?)
}

fn stream_on_client<'a>(client: &'a Client, sql: &'a str, params: &'a [RowValues]) -> RowStream<'a> {
    let mut shared_names: Option<Arc<Vec<String>>> = None;
    stream::once(client.query_raw(sql, params.iter()))
        .try_flatten()
        .map(move |row| {
            let row = row?;
            let names = shared_names
                .get_or_insert_with(|| Arc::new(column_names(&row)))
                .clone();
            build_row(&row, names)
        })
        .boxed()
}

#[async_trait]
impl DriverConnection for PooledClient {
    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        query_on_client(self, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError> {
        execute_on_client(self, sql, params).await
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        let client: &Client = self;
        Ok(client.batch_execute(sql).await?)
    }

    fn query_stream<'a>(&'a mut self, sql: &'a str, params: &'a [RowValues]) -> RowStream<'a> {
        stream_on_client(self, sql, params)
    }
}

/// A connection opened outside the pool, typically for `LISTEN`.
///
/// A background task drives the socket and forwards notifications; dropping
/// the connection stops that task and closes the session.
pub struct PgDedicatedConnection {
    client: Client,
    notifications: mpsc::UnboundedReceiver<Notification>,
    driver: JoinHandle<()>,
}

impl PgDedicatedConnection {
    /// Open a new session using `config`.
    ///
    /// # Errors
    /// Returns `DriverError` if the server cannot be reached or rejects the login.
    pub async fn connect(config: &tokio_postgres::Config) -> Result<Self, DriverError> {
        let (client, mut connection) = config.connect(NoTls).await?;
        let (sender, notifications) = mpsc::unbounded_channel();

        let driver = tokio::spawn(async move {
            loop {
                match std::future::poll_fn(|cx| connection.poll_message(cx)).await {
                    Some(Ok(AsyncMessage::Notification(n))) => {
                        let notification = Notification {
                            process_id: n.process_id(),
                            channel: n.channel().to_string(),
                            payload: n.payload().to_string(),
                        };
                        if sender.send(notification).is_err() {
                            break;
                        }
                    }
                    Some(Ok(AsyncMessage::Notice(notice))) => {
                        debug!(notice = %notice, "postgres notice on dedicated connection");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "dedicated postgres connection failed");
                        break;
                    }
                    None => break,
                }
            }
            trace!("dedicated postgres connection driver finished");
        });

        Ok(Self {
            client,
            notifications,
            driver,
        })
    }
}

impl Drop for PgDedicatedConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl DriverConnection for PgDedicatedConnection {
    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        query_on_client(&self.client, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError> {
        execute_on_client(&self.client, sql, params).await
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        Ok(self.client.batch_execute(sql).await?)
    }

    fn query_stream<'a>(&'a mut self, sql: &'a str, params: &'a [RowValues]) -> RowStream<'a> {
        stream_on_client(&self.client, sql, params)
    }

    async fn next_notification(&mut self) -> Result<Option<Notification>, DriverError> {
        Ok(self.notifications.recv().await)
    }
}
