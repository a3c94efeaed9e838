//! Metadata store trait and implementations.

use crate::error::MetadataResult;
use crate::repos::{FileRepo, UploadRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UploadRepo + FileRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store.
    ///
    /// `query_timeout_secs` bounds how long a statement waits on a locked
    /// database before failing.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let busy_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(5));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            // SQLite serializes writers anyway; one connection avoids "database is locked".
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(
            path = %path.display(),
            busy_timeout_secs = busy_timeout.as_secs(),
            "SQLite metadata store ready"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::error::{MetadataError, classify_write_error};
    use crate::models::*;
    use ferry_core::{File, Upload, UploadId};

    const UPSERT_FILE_SQL: &str = r#"
        INSERT INTO files (upload_id, file_id, name, content_type, size, digest, upload_date, status, backend_details)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(upload_id, file_id) DO UPDATE SET
            name = excluded.name,
            content_type = excluded.content_type,
            size = excluded.size,
            digest = excluded.digest,
            upload_date = excluded.upload_date,
            status = excluded.status,
            backend_details = excluded.backend_details
    "#;

    fn bind_file<'q>(
        query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        row: &'q FileRow,
    ) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
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

    #[async_trait]
    impl UploadRepo for SqliteStore {
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
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
            let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = ?")
                .bind(upload_id.as_str())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("upload {upload_id}")))?;

            let files = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE upload_id = ? ORDER BY file_id",
            )
            .bind(upload_id.as_str())
            .fetch_all(&self.pool)
            .await?;

            row.into_upload(files)
        }

        async fn delete_upload(&self, upload_id: &UploadId) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM uploads WHERE upload_id = ?")
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
                "SELECT upload_id FROM uploads WHERE ttl != 0 AND creation + ttl < ? ORDER BY creation",
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
    impl FileRepo for SqliteStore {
        async fn upsert_file(&self, upload_id: &UploadId, file: &File) -> MetadataResult<()> {
            let row = FileRow::from_file(upload_id, file)?;
            bind_file(sqlx::query(UPSERT_FILE_SQL), &row)
                .execute(&self.pool)
                .await
                .map_err(|e| classify_write_error(e, || format!("upload {upload_id}")))?;
            Ok(())
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS uploads (
    upload_id TEXT PRIMARY KEY,
    creation INTEGER NOT NULL,
    ttl INTEGER NOT NULL DEFAULT 0,
    one_shot INTEGER NOT NULL DEFAULT 0,
    removable INTEGER NOT NULL DEFAULT 0,
    upload_token TEXT,
    remote_ip TEXT NOT NULL DEFAULT '',
    short_url TEXT,
    comments TEXT NOT NULL DEFAULT '',
    protected_by_password INTEGER NOT NULL DEFAULT 0,
    login TEXT NOT NULL DEFAULT '',
    password TEXT NOT NULL DEFAULT '',
    protected_by_token INTEGER NOT NULL DEFAULT 0,
    token_prefix TEXT NOT NULL DEFAULT ''
);
-- Only uploads that can expire are interesting to the sweeper.
CREATE INDEX IF NOT EXISTS idx_uploads_expiry ON uploads(creation + ttl) WHERE ttl != 0;

CREATE TABLE IF NOT EXISTS files (
    upload_id TEXT NOT NULL REFERENCES uploads(upload_id) ON DELETE CASCADE,
    file_id TEXT NOT NULL,
    name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    digest TEXT NOT NULL,
    upload_date INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'uploaded',
    backend_details TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (upload_id, file_id)
);
"#;
