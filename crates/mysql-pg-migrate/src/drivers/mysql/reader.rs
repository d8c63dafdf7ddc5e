//! MySQL/MariaDB schema introspection and row export over sqlx.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::core::identifier::{quote_mysql, validate_identifier};
use crate::core::{
    ColumnDefault, ColumnFacts, ColumnSpec, ExportRow, ExportStats, ForeignKeySpec, IdStats,
    IndexSpec, ReferentialAction, RowSink, SourceSchema, TableSpec,
};
use crate::drivers::common::MysqlSslMode;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL source backed by a small sqlx pool.
pub struct MysqlSource {
    pool: MySqlPool,
    database: String,
    query_timeout: Duration,
    bulk_timeout: Duration,
}

impl MysqlSource {
    pub async fn connect(
        config: &SourceConfig,
        query_timeout: Duration,
        bulk_timeout: Duration,
    ) -> Result<Self> {
        let ssl_mode = MysqlSslMode::parse(&config.ssl_mode)?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode.to_sqlx());

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL source pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL source connection"))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
            query_timeout,
            bulk_timeout,
        })
    }

    /// Run a metadata query under the query timeout.
    async fn timed<T, F>(&self, context: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        self.timed_for(context, self.query_timeout, fut).await
    }

    async fn timed_for<T, F>(&self, context: &str, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(|e| MigrateError::pool(e, context)),
            Err(_) => Err(MigrateError::timeout(context, limit.as_secs())),
        }
    }

    fn table_ref(&self, table: &str) -> Result<String> {
        Ok(format!("{}.{}", quote_mysql(&self.database)?, quote_mysql(table)?))
    }

    async fn load_columns(&self, table: &str) -> Result<Vec<MySqlRow>> {
        // CAST to CHAR: information_schema may hand back VARBINARY under some collations
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(1024)) AS COLUMN_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                CAST(COLUMN_DEFAULT AS CHAR(4096)) AS COLUMN_DEFAULT,
                CAST(EXTRA AS CHAR(255)) AS EXTRA
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;
        self.timed(
            "loading MySQL columns",
            sqlx::query(query)
                .bind(&self.database)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn load_primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;
        let rows = self
            .timed(
                "loading MySQL primary key",
                sqlx::query(query)
                    .bind(&self.database)
                    .bind(table)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.iter().map(|r| r.get("COLUMN_NAME")).collect())
    }

    async fn load_indexes(&self, table: &str) -> Result<Vec<IndexSpec>> {
        // GROUP_CONCAT with a tab separator; column names never contain tabs
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX SEPARATOR '\t') AS CHAR(4096)) AS columns,
                IF(MAX(NON_UNIQUE) = 0, 1, 0) AS is_unique,
                CAST(MAX(INDEX_TYPE) AS CHAR(32)) AS INDEX_TYPE
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
              AND INDEX_NAME != 'PRIMARY'
            GROUP BY INDEX_NAME
            ORDER BY INDEX_NAME
        "#;
        let rows = self
            .timed(
                "loading MySQL indexes",
                sqlx::query(query)
                    .bind(&self.database)
                    .bind(table)
                    .fetch_all(&self.pool),
            )
            .await?;

        let mut indexes = Vec::new();
        for row in rows {
            let name: String = row.get("INDEX_NAME");
            let index_type: String = row.get("INDEX_TYPE");
            if index_type.eq_ignore_ascii_case("FULLTEXT") || index_type.eq_ignore_ascii_case("SPATIAL") {
                warn!("{}: skipping {} index '{}'", table, index_type, name);
                continue;
            }
            let columns: String = row.get("columns");
            indexes.push(IndexSpec {
                name,
                columns: columns.split('\t').map(str::to_string).collect(),
                unique: row.get::<i32, _>("is_unique") == 1,
            });
        }
        Ok(indexes)
    }

    async fn load_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeySpec>> {
        let query = r#"
            SELECT
                CAST(rc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
                CAST(rc.DELETE_RULE AS CHAR(32)) AS DELETE_RULE,
                CAST(rc.UPDATE_RULE AS CHAR(32)) AS UPDATE_RULE
            FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE rc.CONSTRAINT_SCHEMA = ? AND rc.TABLE_NAME = ?
            ORDER BY rc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;
        let rows = self
            .timed(
                "loading MySQL foreign keys",
                sqlx::query(query)
                    .bind(&self.database)
                    .bind(table)
                    .fetch_all(&self.pool),
            )
            .await?;

        // BTreeMap keeps constraint order stable
        let mut by_name: BTreeMap<String, ForeignKeySpec> = BTreeMap::new();
        for row in rows {
            let name: String = row.get("CONSTRAINT_NAME");
            let fk = by_name.entry(name.clone()).or_insert_with(|| ForeignKeySpec {
                name,
                columns: Vec::new(),
                ref_table: row.get("REFERENCED_TABLE_NAME"),
                ref_columns: Vec::new(),
                on_delete: ReferentialAction::parse(&row.get::<String, _>("DELETE_RULE")),
                on_update: ReferentialAction::parse(&row.get::<String, _>("UPDATE_RULE")),
            });
            fk.columns.push(row.get("COLUMN_NAME"));
            fk.ref_columns.push(row.get("REFERENCED_COLUMN_NAME"));
        }
        Ok(by_name.into_values().collect())
    }
}

#[async_trait]
impl SourceSchema for MysqlSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;
        let rows = self
            .timed(
                "listing MySQL tables",
                sqlx::query(query).bind(&self.database).fetch_all(&self.pool),
            )
            .await?;
        let tables: Vec<String> = rows.iter().map(|r| r.get("TABLE_NAME")).collect();
        info!("Found {} tables in MySQL database '{}'", tables.len(), self.database);
        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<TableSpec> {
        validate_identifier(table)?;
        let column_rows = self.load_columns(table).await?;
        if column_rows.is_empty() {
            return Err(MigrateError::SchemaExtraction(format!(
                "Table '{}' not found in MySQL database '{}'",
                table, self.database
            )));
        }

        let mut spec = TableSpec::new(table);
        for row in &column_rows {
            let extra: String = row.get("EXTRA");
            let nullable = row.get::<i32, _>("is_nullable") == 1;
            let raw_default: Option<String> = row.get("COLUMN_DEFAULT");
            let mut col = ColumnSpec::new(
                row.get::<String, _>("COLUMN_NAME"),
                row.get::<String, _>("COLUMN_TYPE").to_lowercase(),
            );
            col.nullable = nullable;
            col.auto_increment = extra.to_lowercase().contains("auto_increment");
            col.default = classify_default(raw_default.as_deref(), &extra);
            spec.columns.push(col);
        }
        spec.primary_key = self.load_primary_key(table).await?;
        spec.indexes = self.load_indexes(table).await?;
        spec.foreign_keys = self.load_foreign_keys(table).await?;

        debug!(
            "Described {}: {} columns, {} indexes, {} foreign keys",
            table,
            spec.columns.len(),
            spec.indexes.len(),
            spec.foreign_keys.len()
        );
        Ok(spec)
    }

    async fn show_create_table(&self, table: &str) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {}", self.table_ref(table)?);
        let row = self
            .timed("SHOW CREATE TABLE", sqlx::query(&sql).fetch_one(&self.pool))
            .await?;
        // second column holds the DDL; its type varies between servers
        let ddl: Vec<u8> = row
            .try_get(1)
            .map_err(|e| MigrateError::SchemaExtraction(format!("{}: {}", table, e)))?;
        Ok(String::from_utf8_lossy(&ddl).into_owned())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS cnt FROM {}", self.table_ref(table)?);
        let row = self
            .timed("counting MySQL rows", sqlx::query(&sql).fetch_one(&self.pool))
            .await?;
        Ok(row.get::<i64, _>("cnt"))
    }

    async fn column_facts(&self, table: &str) -> Result<Vec<ColumnFacts>> {
        validate_identifier(table)?;
        let rows = self.load_columns(table).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let extra: String = row.get("EXTRA");
                ColumnFacts {
                    name: row.get("COLUMN_NAME"),
                    data_type: row.get::<String, _>("COLUMN_TYPE").to_lowercase(),
                    nullable: row.get::<i32, _>("is_nullable") == 1,
                    default: row.get("COLUMN_DEFAULT"),
                    auto_increment: extra.to_lowercase().contains("auto_increment"),
                }
            })
            .collect())
    }

    async fn id_stats(&self, table: &str, column: &str) -> Result<IdStats> {
        let sql = format!(
            "SELECT COUNT({c}) AS cnt, CAST(MIN({c}) AS SIGNED) AS lo, CAST(MAX({c}) AS SIGNED) AS hi FROM {}",
            self.table_ref(table)?,
            c = quote_mysql(column)?
        );
        let row = self
            .timed_for(
                "reading MySQL id statistics",
                self.bulk_timeout,
                sqlx::query(&sql).fetch_one(&self.pool),
            )
            .await?;
        Ok(IdStats {
            count: row.get::<i64, _>("cnt"),
            min: row.get::<Option<i64>, _>("lo"),
            max: row.get::<Option<i64>, _>("hi"),
        })
    }

    async fn id_page(
        &self,
        table: &str,
        column: &str,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<i64>> {
        let c = quote_mysql(column)?;
        let sql = format!(
            "SELECT CAST({c} AS SIGNED) AS id FROM {} \
             WHERE {c} IS NOT NULL AND (? IS NULL OR {c} > ?) \
             ORDER BY {c} LIMIT ?",
            self.table_ref(table)?
        );
        let rows = self
            .timed(
                "reading MySQL id page",
                sqlx::query(&sql)
                    .bind(after)
                    .bind(after)
                    .bind(limit as u64)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
    }

    async fn export_rows(
        &self,
        spec: &TableSpec,
        sink: &mut (dyn RowSink + Send),
    ) -> Result<ExportStats> {
        let exprs = spec
            .columns
            .iter()
            .map(export_expression)
            .collect::<Result<Vec<_>>>()?;
        let sql = format!("SELECT {} FROM {}", exprs.join(", "), self.table_ref(&spec.name)?);
        debug!("{}: {}", spec.name, sql);

        let width = spec.columns.len();
        let export = async {
            let mut stats = ExportStats::default();
            let mut rows = sqlx::query(&sql).fetch(&self.pool);
            while let Some(row) = rows.try_next().await? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    let raw: Option<Vec<u8>> = row.try_get(i)?;
                    values.push(raw.map(|b| String::from_utf8_lossy(&b).into_owned()));
                }
                if sink.write_row(ExportRow::new(values))? {
                    stats.rows += 1;
                } else {
                    stats.dropped += 1;
                }
            }
            Ok::<_, MigrateError>(stats)
        };

        let stats = tokio::time::timeout(self.bulk_timeout, export)
            .await
            .map_err(|_| {
                MigrateError::timeout(format!("exporting {}", spec.name), self.bulk_timeout.as_secs())
            })??;

        info!("{}: exported {} rows ({} dropped)", spec.name, stats.rows, stats.dropped);
        Ok(stats)
    }

    async fn ping(&self) -> Result<()> {
        self.timed("pinging MySQL source", sqlx::query("SELECT 1").fetch_one(&self.pool))
            .await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Interpret `information_schema.COLUMNS.COLUMN_DEFAULT`.
///
/// MySQL 8 flags expression defaults with `DEFAULT_GENERATED` in EXTRA;
/// MariaDB quotes string literals and spells a NULL default as `NULL`.
pub fn classify_default(raw: Option<&str>, extra: &str) -> Option<ColumnDefault> {
    let raw = raw?;
    if extra.to_ascii_uppercase().contains("DEFAULT_GENERATED") {
        return Some(ColumnDefault::Expression(raw.to_string()));
    }
    if raw.eq_ignore_ascii_case("NULL") {
        return Some(ColumnDefault::Null);
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Some(ColumnDefault::Literal(raw[1..raw.len() - 1].replace("''", "'")));
    }
    if let Some(bits) = raw
        .strip_prefix("b'")
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Some(ColumnDefault::Expression(crate::ddl::parse::bits_to_decimal(bits)));
    }
    let upper = raw.to_ascii_uppercase();
    let is_function = ["CURRENT_TIMESTAMP", "NOW(", "LOCALTIMESTAMP", "LOCALTIME", "CURRENT_DATE", "CURDATE("]
        .iter()
        .any(|p| upper.starts_with(p));
    if is_function {
        return Some(ColumnDefault::Expression(raw.to_string()));
    }
    Some(ColumnDefault::Literal(raw.to_string()))
}

/// SELECT expression exporting one column as text.
///
/// Binary data becomes `\x`-prefixed hex (bytea input), zero dates become
/// NULL, BIT becomes its number and spatial values become WKT.
pub fn export_expression(col: &ColumnSpec) -> Result<String> {
    let c = quote_mysql(&col.name)?;
    let base = base_type(&col.source_type);
    let expr = match base.as_str() {
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => format!(
            "CASE WHEN {c} IS NULL THEN NULL ELSE CONCAT(CHAR(92 USING utf8mb4), 'x', HEX({c})) END"
        ),
        "date" | "datetime" | "timestamp" => format!(
            "CASE WHEN CAST({c} AS CHAR) LIKE '0000-00-00%' THEN NULL ELSE CAST({c} AS CHAR) END"
        ),
        "bit" => format!("CAST({c} + 0 AS CHAR)"),
        "geometry" | "point" | "linestring" | "polygon" | "multipoint" | "multilinestring"
        | "multipolygon" | "geometrycollection" => format!("ST_AsText({c})"),
        _ => format!("CAST({c} AS CHAR)"),
    };
    Ok(expr)
}

fn base_type(source_type: &str) -> String {
    source_type
        .trim()
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_default_mysql8() {
        assert_eq!(classify_default(None, ""), None);
        assert_eq!(
            classify_default(Some("CURRENT_TIMESTAMP(3)"), "DEFAULT_GENERATED"),
            Some(ColumnDefault::Expression("CURRENT_TIMESTAMP(3)".into()))
        );
        assert_eq!(
            classify_default(Some("queued"), ""),
            Some(ColumnDefault::Literal("queued".into()))
        );
        assert_eq!(
            classify_default(Some("1"), ""),
            Some(ColumnDefault::Literal("1".into()))
        );
    }

    #[test]
    fn test_classify_default_mariadb() {
        assert_eq!(classify_default(Some("NULL"), ""), Some(ColumnDefault::Null));
        assert_eq!(
            classify_default(Some("'it''s'"), ""),
            Some(ColumnDefault::Literal("it's".into()))
        );
        assert_eq!(
            classify_default(Some("current_timestamp()"), "on update current_timestamp()"),
            Some(ColumnDefault::Expression("current_timestamp()".into()))
        );
    }

    #[test]
    fn test_classify_default_bits() {
        assert_eq!(
            classify_default(Some("b'101'"), ""),
            Some(ColumnDefault::Expression("5".into()))
        );
    }

    #[test]
    fn test_export_expression() {
        let col = |name: &str, ty: &str| ColumnSpec::new(name, ty);
        assert_eq!(
            export_expression(&col("name", "varchar(50)")).unwrap(),
            "CAST(`name` AS CHAR)"
        );
        assert!(export_expression(&col("data", "longblob"))
            .unwrap()
            .contains("HEX(`data`)"));
        assert!(export_expression(&col("at", "datetime(3)"))
            .unwrap()
            .contains("LIKE '0000-00-00%'"));
        assert_eq!(
            export_expression(&col("flags", "bit(8)")).unwrap(),
            "CAST(`flags` + 0 AS CHAR)"
        );
        assert_eq!(
            export_expression(&col("pos", "point")).unwrap(),
            "ST_AsText(`pos`)"
        );
        assert!(export_expression(&col("", "int")).is_err());
        assert_eq!(
            export_expression(&col("we`ird", "int")).unwrap(),
            "CAST(`we``ird` AS CHAR)"
        );
    }

    #[test]
    fn test_base_type() {
        assert_eq!(base_type("int(11) unsigned"), "int");
        assert_eq!(base_type("ENUM('a','b')"), "enum");
        assert_eq!(base_type("longblob"), "longblob");
    }
}
