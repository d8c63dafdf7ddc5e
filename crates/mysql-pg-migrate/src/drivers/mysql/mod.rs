//! MySQL/MariaDB source driver (MySQL 5.7+, 8.0+, MariaDB 10.2+).
//!
//! Connections go through a sqlx pool; all metadata comes from
//! `information_schema` and rows are exported as text.

mod reader;

pub use reader::{classify_default, export_expression, MysqlSource};
