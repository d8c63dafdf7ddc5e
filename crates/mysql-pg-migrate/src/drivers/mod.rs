//! Database drivers.
//!
//! - [`mysql`]: the source, over sqlx
//! - [`postgres`]: the target, over deadpool-postgres
//! - [`common`]: TLS modes for both

pub mod common;
pub mod mysql;
pub mod postgres;

pub use common::{MysqlSslMode, SslMode};
pub use mysql::MysqlSource;
pub use postgres::PostgresTarget;
