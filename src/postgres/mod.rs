// ABOUTME: PostgreSQL utilities module
// ABOUTME: Exports connection management and the executor abstraction

pub mod connection;
pub mod executor;

pub use connection::{connect, PgConnector};
pub use executor::{ConnectionProvider, SqlExecutor, TextRow};
