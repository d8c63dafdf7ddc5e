//! Configuration validation.

use regex::RegexBuilder;

use super::Config;
use crate::drivers::common::{MysqlSslMode, SslMode};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    MysqlSslMode::parse(&config.source.ssl_mode)?;
    if config.source.max_connections == 0 {
        return Err(MigrateError::Config(
            "source.max_connections must be at least 1".into(),
        ));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }
    SslMode::parse(&config.target.ssl_mode)?;
    if config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    // Cannot migrate to the same database
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let migration = &config.migration;
    if migration.query_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "migration.query_timeout_secs must be at least 1".into(),
        ));
    }
    if migration.bulk_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "migration.bulk_timeout_secs must be at least 1".into(),
        ));
    }
    if migration.max_lines_per_row == 0 {
        return Err(MigrateError::Config(
            "migration.max_lines_per_row must be at least 1".into(),
        ));
    }
    if migration.null_sentinel.is_empty() {
        return Err(MigrateError::Config(
            "migration.null_sentinel cannot be empty".into(),
        ));
    }
    if migration
        .null_sentinel
        .contains(|c| matches!(c, '"' | ',' | '\n' | '\r'))
    {
        return Err(MigrateError::Config(format!(
            "migration.null_sentinel '{}' cannot contain quotes, commas or newlines",
            migration.null_sentinel.escape_debug()
        )));
    }

    for (i, rule) in migration.type_mappings.iter().enumerate() {
        RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                MigrateError::Config(format!(
                    "migration.type_mappings[{}] pattern '{}' is invalid: {}",
                    i, rule.pattern, e
                ))
            })?;
        if rule.replacement.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "migration.type_mappings[{}] replacement cannot be empty",
                i
            )));
        }
    }

    Ok(())
}
