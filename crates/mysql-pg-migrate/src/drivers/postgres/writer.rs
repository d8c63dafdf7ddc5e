//! PostgreSQL target: DDL, CSV COPY, sequences and read-back queries.
//!
//! Uses deadpool-postgres for pooling. Data arrives as spooled CSV files and
//! is streamed through `COPY ... FROM STDIN`.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio::io::AsyncReadExt;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::{qualify_pg, quote_literal, quote_pg, quote_pg_list};
use crate::core::{ColumnFacts, ForeignKeySpec, IdStats, IndexSpec, TargetSchema};
use crate::ddl::{add_foreign_key_sql, add_primary_key_sql, create_index_sql, sequence_name};
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Read size for streaming spool files into COPY.
const COPY_CHUNK_SIZE: usize = 256 * 1024;

pub struct PostgresTarget {
    pool: Pool,
    schema: String,
    query_timeout: Duration,
    bulk_timeout: Duration,
}

impl PostgresTarget {
    pub async fn connect(
        config: &TargetConfig,
        query_timeout: Duration,
        bulk_timeout: Duration,
    ) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("mysql-pg-migrate");
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        let mgr = match ssl_mode.connector()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        };
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
            query_timeout,
            bulk_timeout,
        })
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }

    async fn timed<T, F>(&self, operation: &str, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| MigrateError::timeout(operation, limit.as_secs()))?
    }

    async fn execute(&self, operation: &str, limit: Duration, sql: &str) -> Result<()> {
        debug!("{}", sql);
        self.timed(operation, limit, async {
            let client = self.client().await?;
            client.batch_execute(sql).await?;
            Ok(())
        })
        .await
    }

    fn table_ref(&self, table: &str) -> Result<String> {
        qualify_pg(&self.schema, table)
    }

    /// Name of the sequence owned by `table.column`, if any.
    async fn owned_sequence(&self, table: &str, column: &str) -> Result<Option<String>> {
        let table_ref = self.table_ref(table)?;
        let column_ref = quote_pg(column)?;
        self.timed("looking up sequence", self.query_timeout, async {
            let client = self.client().await?;
            let row = client
                .query_one(
                    "SELECT pg_get_serial_sequence($1, $2)",
                    &[&table_ref, &column_ref],
                )
                .await?;
            Ok(row.get::<_, Option<String>>(0))
        })
        .await
    }
}

#[async_trait]
impl TargetSchema for PostgresTarget {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        self.execute("executing DDL", self.query_timeout, sql).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {} CASCADE", self.table_ref(table)?);
        self.execute("dropping table", self.query_timeout, &sql).await
    }

    async fn create_table(&self, table: &str, ddl: &str) -> Result<()> {
        self.execute("creating table", self.query_timeout, ddl).await?;
        info!("Created table {}.{}", self.schema, table);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.timed("checking table", self.query_timeout, async {
            let client = self.client().await?;
            let row = client
                .query_one(
                    "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                     WHERE table_schema = $1 AND table_name = $2)",
                    &[&self.schema, &table],
                )
                .await?;
            Ok(row.get::<_, bool>(0))
        })
        .await
    }

    async fn index_exists(&self, index_name: &str) -> Result<bool> {
        self.timed("checking index", self.query_timeout, async {
            let client = self.client().await?;
            let row = client
                .query_one(
                    "SELECT EXISTS (SELECT 1 FROM pg_indexes \
                     WHERE schemaname = $1 AND indexname = $2)",
                    &[&self.schema, &index_name],
                )
                .await?;
            Ok(row.get::<_, bool>(0))
        })
        .await
    }

    async fn create_index(&self, table: &str, index_name: &str, index: &IndexSpec) -> Result<()> {
        let sql = create_index_sql(&self.schema, table, index_name, index)?;
        self.execute("creating index", self.bulk_timeout, &sql).await
    }

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool> {
        self.timed("checking constraint", self.query_timeout, async {
            let client = self.client().await?;
            let row = client
                .query_one(
                    "SELECT EXISTS (SELECT 1 FROM information_schema.table_constraints \
                     WHERE table_schema = $1 AND table_name = $2 AND constraint_name = $3)",
                    &[&self.schema, &table, &constraint],
                )
                .await?;
            Ok(row.get::<_, bool>(0))
        })
        .await
    }

    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()> {
        let sql = add_primary_key_sql(&self.schema, table, columns)?;
        self.execute("adding primary key", self.bulk_timeout, &sql).await
    }

    async fn add_foreign_key(&self, table: &str, fk: &ForeignKeySpec) -> Result<()> {
        let sql = add_foreign_key_sql(&self.schema, table, fk)?;
        self.execute("adding foreign key", self.bulk_timeout, &sql).await
    }

    async fn copy_csv(
        &self,
        table: &str,
        columns: &[String],
        path: &Path,
        null_sentinel: &str,
    ) -> Result<u64> {
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv, NULL {})",
            self.table_ref(table)?,
            quote_pg_list(columns)?,
            quote_literal(null_sentinel)
        );
        debug!("{}", copy_sql);

        let operation = format!("COPY into {}", table);
        let rows = self
            .timed(&operation, self.bulk_timeout, async {
                let mut file = tokio::fs::File::open(path).await?;
                let client = self.client().await?;
                let sink = client
                    .copy_in(&copy_sql)
                    .await
                    .map_err(|e| MigrateError::transfer(table, format!("COPY init: {}", e)))?;
                tokio::pin!(sink);

                let mut buf = BytesMut::with_capacity(COPY_CHUNK_SIZE);
                loop {
                    buf.reserve(COPY_CHUNK_SIZE);
                    if file.read_buf(&mut buf).await? == 0 {
                        break;
                    }
                    sink.send(buf.split().freeze())
                        .await
                        .map_err(|e| MigrateError::transfer(table, format!("COPY send: {}", e)))?;
                }
                sink.as_mut()
                    .finish()
                    .await
                    .map_err(|e| MigrateError::transfer(table, format!("COPY finish: {}", e)))
            })
            .await?;

        info!("{}: copied {} rows", table, rows);
        Ok(rows)
    }

    async fn prepare_sequence(&self, table: &str, column: &str) -> Result<String> {
        let seq = sequence_name(table, column);
        let seq_ref = qualify_pg(&self.schema, &seq)?;
        let table_ref = self.table_ref(table)?;
        let column_ref = quote_pg(column)?;
        let sql = format!(
            "CREATE SEQUENCE IF NOT EXISTS {seq_ref};\n\
             ALTER TABLE {table_ref} ALTER COLUMN {column_ref} SET DEFAULT nextval({});\n\
             ALTER SEQUENCE {seq_ref} OWNED BY {table_ref}.{column_ref}",
            quote_literal(&seq_ref)
        );
        self.execute("preparing sequence", self.query_timeout, &sql).await?;
        Ok(seq)
    }

    async fn reseed_sequence(&self, table: &str, column: &str) -> Result<i64> {
        let seq_ref = match self.owned_sequence(table, column).await? {
            Some(seq) => seq,
            None => qualify_pg(&self.schema, &sequence_name(table, column))?,
        };
        let sql = format!(
            "SELECT setval({}, COALESCE((SELECT MAX({})::int8 FROM {}), 0) + 1, false)",
            quote_literal(&seq_ref),
            quote_pg(column)?,
            self.table_ref(table)?
        );
        debug!("{}", sql);
        let next = self
            .timed("reseeding sequence", self.bulk_timeout, async {
                let client = self.client().await?;
                let row = client.query_one(&sql, &[]).await?;
                Ok(row.get::<_, i64>(0))
            })
            .await?;
        info!("{}: sequence {} next value {}", table, seq_ref, next);
        Ok(next)
    }

    async fn analyze(&self, table: &str) -> Result<()> {
        let sql = format!("ANALYZE {}", self.table_ref(table)?);
        self.execute("analyzing table", self.bulk_timeout, &sql).await
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnFacts>> {
        self.timed("loading PostgreSQL columns", self.query_timeout, async {
            let client = self.client().await?;
            let rows = client
                .query(
                    "SELECT column_name::text, data_type::text, is_nullable::text, column_default::text \
                     FROM information_schema.columns \
                     WHERE table_schema = $1 AND table_name = $2 \
                     ORDER BY ordinal_position",
                    &[&self.schema, &table],
                )
                .await?;
            Ok(rows
                .iter()
                .map(|row| ColumnFacts {
                    name: row.get(0),
                    data_type: row.get(1),
                    nullable: row.get::<_, String>(2) == "YES",
                    default: row.get(3),
                    auto_increment: false,
                })
                .collect())
        })
        .await
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*)::int8 FROM {}", self.table_ref(table)?);
        self.timed("counting PostgreSQL rows", self.bulk_timeout, async {
            let client = self.client().await?;
            let row = client.query_one(&sql, &[]).await?;
            Ok(row.get::<_, i64>(0))
        })
        .await
    }

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT MAX({})::int8 FROM {}",
            quote_pg(column)?,
            self.table_ref(table)?
        );
        self.timed("reading column maximum", self.bulk_timeout, async {
            let client = self.client().await?;
            let row = client.query_one(&sql, &[]).await?;
            Ok(row.get::<_, Option<i64>>(0))
        })
        .await
    }

    async fn sequence_next_value(&self, table: &str, column: &str) -> Result<Option<i64>> {
        let Some(seq) = self.owned_sequence(table, column).await? else {
            return Ok(None);
        };
        // reading the relation does not advance the sequence
        let sql = format!(
            "SELECT CASE WHEN is_called THEN last_value + 1 ELSE last_value END FROM {}",
            seq
        );
        self.timed("reading sequence", self.query_timeout, async {
            let client = self.client().await?;
            let row = client.query_one(&sql, &[]).await?;
            Ok(Some(row.get::<_, i64>(0)))
        })
        .await
    }

    async fn id_stats(&self, table: &str, column: &str) -> Result<IdStats> {
        let column_ref = quote_pg(column)?;
        let sql = format!(
            "SELECT COUNT({c})::int8, MIN({c})::int8, MAX({c})::int8 FROM {}",
            self.table_ref(table)?,
            c = column_ref
        );
        self.timed("reading id statistics", self.bulk_timeout, async {
            let client = self.client().await?;
            let row = client.query_one(&sql, &[]).await?;
            Ok(IdStats {
                count: row.get(0),
                min: row.get(1),
                max: row.get(2),
            })
        })
        .await
    }

    async fn id_page(
        &self,
        table: &str,
        column: &str,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<i64>> {
        let column_ref = quote_pg(column)?;
        let sql = format!(
            "SELECT {c}::int8 FROM {} \
             WHERE {c} IS NOT NULL AND ($1::int8 IS NULL OR {c} > $1) \
             ORDER BY {c} LIMIT $2",
            self.table_ref(table)?,
            c = column_ref
        );
        let limit = limit as i64;
        self.timed("reading id page", self.query_timeout, async {
            let client = self.client().await?;
            let rows = client.query(&sql, &[&after, &limit]).await?;
            Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.timed("pinging PostgreSQL target", self.query_timeout, async {
            let client = self.client().await?;
            client.simple_query("SELECT 1").await?;
            Ok(())
        })
        .await
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}
