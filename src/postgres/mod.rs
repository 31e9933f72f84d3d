//! PostgreSQL driver: the production implementation of the `pool::Driver` seam.
//!
//! - manager: bb8 connection manager for tokio-postgres clients
//! - driver: pool-backed `Driver` plus dedicated connections
//! - connection: `DriverConnection` for pooled and dedicated clients
//! - params / query: value conversion in both directions

pub mod connection;
pub mod driver;
pub mod manager;
pub mod params;
pub mod query;

pub use connection::{PgDedicatedConnection, PooledClient};
pub use driver::PgDriver;
pub use manager::PgManager;
pub use params::{ParamError, Params};
pub use query::{build_result_set_from_rows, decode_value, postgres_extract_value};
