/// Embedded `PostgreSQL` for integration tests that need a real server
pub mod embedded;

pub use embedded::{EmbeddedPostgres, setup_postgres_embedded, stop_postgres_embedded};
