//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult, classify_write_error};
use crate::models::*;
use crate::repos::{FileRepo, UploadRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use ferry_core::config::PgSslMode;
use ferry_core::{File, Upload, UploadId};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

const UPSERT_FILE_SQL: &str = r#"
    INSERT INTO files (upload_id, file_id, name, content_type, size, digest, upload_date, status, backend_details)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (upload_id, file_id) DO UPDATE SET
        name = EXCLUDED.name,
        content_type = EXCLUDED.content_type,
        size = EXCLUDED.size,
        digest = EXCLUDED.digest,
        upload_date = EXCLUDED.upload_date,
        status = EXCLUDED.status,
        backend_details = EXCLUDED.backend_details
"#;

fn bind_file<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    row: &'q FileRow,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    query
        .bind(&row.upload_id)
        .bind(&row.file_id)
        .bind(&row.name)
        .bind(&row.content_type)
        .bind(row.size)
        .bind(&row.digest)
        .bind(row.upload_date)
        .bind(&row.status)
        .bind(&row.backend_details)
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// This allows credentials to be passed separately, e.g. the password
    /// through an environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UploadRepo for PostgresStore {
    async fn create_upload(&self, upload: &Upload) -> MetadataResult<()> {
        let row = UploadRow::from_upload(upload);
        let files = upload
            .files
            .values()
            .map(|file| FileRow::from_file(&upload.id, file))
            .collect::<MetadataResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO uploads (upload_id, creation, ttl, one_shot, removable, upload_token,
                remote_ip, short_url, comments, protected_by_password, login, password,
                protected_by_token, token_prefix)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&row.upload_id)
        .bind(row.creation)
        .bind(row.ttl)
        .bind(row.one_shot)
        .bind(row.removable)
        .bind(&row.upload_token)
        .bind(&row.remote_ip)
        .bind(&row.short_url)
        .bind(&row.comments)
        .bind(row.protected_by_password)
        .bind(&row.login)
        .bind(&row.password)
        .bind(row.protected_by_token)
        .bind(&row.token_prefix)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_write_error(e, || format!("upload {}", upload.id)))?;

        for file in &files {
            bind_file(sqlx::query(UPSERT_FILE_SQL), file)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_upload(&self, upload_id: &UploadId) -> MetadataResult<Upload> {
        let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = $1")
            .bind(upload_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("upload {upload_id}")))?;

        let files = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files WHERE upload_id = $1 ORDER BY file_id",
        )
        .bind(upload_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        row.into_upload(files)
    }

    async fn delete_upload(&self, upload_id: &UploadId) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM uploads WHERE upload_id = $1")
            .bind(upload_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("upload {upload_id}")));
        }
        Ok(())
    }

    async fn list_expired_upload_ids(&self, now: i64) -> MetadataResult<Vec<UploadId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT upload_id FROM uploads WHERE ttl != 0 AND creation + ttl < $1 ORDER BY creation",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        ids.iter()
            .map(|id| UploadId::parse(id).map_err(MetadataError::from))
            .collect()
    }
}

#[async_trait]
impl FileRepo for PostgresStore {
    async fn upsert_file(&self, upload_id: &UploadId, file: &File) -> MetadataResult<()> {
        let row = FileRow::from_file(upload_id, file)?;
        bind_file(sqlx::query(UPSERT_FILE_SQL), &row)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, || format!("upload {upload_id}")))?;
        Ok(())
    }
}
