//! Connection settings shared by both drivers.

pub mod tls;

pub use tls::{MysqlSslMode, SslMode};
