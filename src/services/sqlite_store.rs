use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::services::store::{
    apply_pipeline, merge_document, sort_documents, Document, Filter, Sort, Stage, Store, StoreError, UpsertOutcome,
};

/// SQLite-backed document store: one `documents` table keyed by collection + key
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    database_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database
    pub async fn open(database_path: &Path) -> Result<Self, StoreError> {
        info!("Opening document store at: {:?}", database_path);

        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;

        let store = Self {
            pool,
            database_path: database_path.to_path_buf(),
        };
        store.initialize().await?;
        Ok(store)
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every document of a collection paired with its row key
    async fn load(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let rows = sqlx::query("SELECT key, data FROM documents WHERE collection = ? ORDER BY key")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<(String, Document), StoreError> {
                let key: String = row.try_get("key")?;
                let data: String = row.try_get("data")?;
                Ok((key, parse_document(&data)?))
            })
            .collect()
    }

    /// Locate the row addressed by `filter`. When the collection is keyed by
    /// the filter's fields, a key miss means the document is absent; other
    /// filters fall back to a scan.
    async fn locate(&self, collection: &str, filter: &Filter) -> Result<Option<(String, Document)>, StoreError> {
        if let Some(key) = filter.key() {
            let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND key = ?")
                .bind(collection)
                .bind(&key)
                .fetch_optional(&self.pool)
                .await?;

            if let Some(row) = row {
                let data: String = row.try_get("data")?;
                let doc = parse_document(&data)?;
                if filter.matches(&doc) {
                    return Ok(Some((key, doc)));
                }
            }

            if self.keyed_by(collection, filter).await? {
                return Ok(None);
            }
        }

        Ok(self
            .load(collection)
            .await?
            .into_iter()
            .find(|(_, doc)| filter.matches(doc)))
    }

    /// True when some row of `collection` is keyed by the same fields as `filter`
    async fn keyed_by(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        let Some(pattern) = filter.key_pattern() else {
            return Ok(false);
        };
        let keyed: i64 = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM documents WHERE collection = ? AND key LIKE ? ESCAPE '\')"#,
        )
        .bind(collection)
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;
        Ok(keyed != 0)
    }

    async fn write(&self, collection: &str, key: &str, doc: &Document) -> Result<(), StoreError> {
        let data = serde_json::to_string(doc)?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, key, data, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_document(data: &str) -> Result<Document, StoreError> {
    match serde_json::from_str(data)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!("expected object, found {}", other))),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        Ok(self.locate(collection, filter).await?.map(|(_, doc)| doc))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self
            .load(collection)
            .await?
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| filter.matches(doc))
            .collect();
        if let Some(sort) = sort {
            sort_documents(&mut docs, sort);
        }
        Ok(docs)
    }

    async fn upsert(&self, collection: &str, filter: &Filter, data: Document) -> Result<UpsertOutcome, StoreError> {
        let Some(new_key) = filter.key() else {
            return Err(StoreError::InvalidDocument("upsert requires a non-empty filter".to_string()));
        };

        match self.locate(collection, filter).await? {
            Some((key, mut existing)) => {
                merge_document(&mut existing, filter, data);
                self.write(collection, &key, &existing).await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let mut doc = Document::new();
                merge_document(&mut doc, filter, data);
                self.write(collection, &new_key, &doc).await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        if let Some(key) = filter.key() {
            if self.keyed_by(collection, filter).await? {
                let removed = sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
                    .bind(collection)
                    .bind(&key)
                    .execute(&self.pool)
                    .await?
                    .rows_affected();
                return Ok(removed);
            }
        }

        let keys: Vec<String> = self
            .load(collection)
            .await?
            .into_iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in keys {
            removed += sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
                .bind(collection)
                .bind(&key)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        Ok(removed)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        if filter.is_empty() {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
            return Ok(count as u64);
        }

        Ok(self
            .load(collection)
            .await?
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .count() as u64)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError> {
        let docs = self.load(collection).await?.into_iter().map(|(_, doc)| doc).collect();
        Ok(apply_pipeline(docs, pipeline))
    }
}
