//! # ab-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `ab-core` domain models.
//!
//! A single `entries` table with a self-referencing `parent_id` foreign key.
//! Foreign keys are switched on for every connection, so the database itself
//! refuses replies under a missing parent and deletes that would orphan a reply.

use std::str::FromStr;

use ab_core::error::{AppError, Result};
use ab_core::models::{Entry, EntryId, EntryPatch, NewEntry, Order, Reaction};
use ab_core::traits::EntryStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS entries (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        name          TEXT    NOT NULL DEFAULT 'anonymous',
        title         TEXT,
        content       TEXT    NOT NULL DEFAULT 'nothing...',
        created_at    TEXT    NOT NULL,
        like_count    INTEGER NOT NULL DEFAULT 0 CHECK (like_count >= 0),
        dislike_count INTEGER NOT NULL DEFAULT 0 CHECK (dislike_count >= 0),
        parent_id     INTEGER REFERENCES entries (id)
    )",
    "CREATE INDEX IF NOT EXISTS entries_parent_idx ON entries (parent_id, created_at)",
    "CREATE INDEX IF NOT EXISTS entries_root_title_idx ON entries (title) WHERE parent_id IS NULL",
];

const COLUMNS: &str = "id, name, title, content, created_at, like_count, dislike_count, parent_id";

pub struct SqliteEntryStore {
    pool: SqlitePool,
}

fn storage(err: sqlx::Error) -> AppError {
    AppError::Storage(err.into())
}

fn is_fk_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn order_sql(order: Order) -> &'static str {
    match order {
        Order::Ascending => "created_at ASC, id ASC",
        Order::Descending => "created_at DESC, id ASC",
    }
}

fn counter(row: &SqliteRow, column: &str) -> std::result::Result<u64, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    Ok(u64::try_from(value).unwrap_or_default())
}

fn map_entry(row: &SqliteRow) -> Result<Entry> {
    let entry = (|| {
        Ok::<_, sqlx::Error>(Entry {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            like_count: counter(row, "like_count")?,
            dislike_count: counter(row, "dislike_count")?,
            parent_id: row.try_get("parent_id")?,
        })
    })();
    entry.map_err(storage)
}

impl SqliteEntryStore {
    /// Opens (creating if needed) the database at `url` and ensures the schema.
    pub async fn new(url: &str) -> Result<Self> {
        Self::connect(url, 5).await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Each in-memory connection is its own database: keep exactly one alive.
        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = pool_options.connect_with(options).await.map_err(storage)?;
        let store = Self { pool };
        store.init_schema().await?;
        info!(url, "sqlite entry store ready");
        Ok(store)
    }

    /// Idempotent schema creation.
    pub async fn init_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await.map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn fetch_list(&self, sql: &str, bind: Option<EntryId>) -> Result<Vec<Entry>> {
        let mut query = sqlx::query(sql);
        if let Some(id) = bind {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage)?;
        rows.iter().map(map_entry).collect()
    }
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    /// The foreign key makes the parent check and the insert one atomic step.
    async fn create(&self, new: NewEntry) -> Result<EntryId> {
        new.validate()?;
        let result = sqlx::query(
            "INSERT INTO entries (name, title, content, created_at, parent_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new.name_or_default())
        .bind(new.title.as_deref())
        .bind(new.content_or_default())
        .bind(Utc::now())
        .bind(new.parent_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                debug!(id, parent_id = ?new.parent_id, "entry inserted");
                Ok(id)
            }
            Err(err) if is_fk_violation(&err) => {
                Err(AppError::NotFound(new.parent_id.unwrap_or_default()))
            }
            Err(err) => Err(storage(err)),
        }
    }

    async fn get(&self, id: EntryId) -> Result<Entry> {
        let sql = format!("SELECT {COLUMNS} FROM entries WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match row {
            Some(row) => map_entry(&row),
            None => Err(AppError::NotFound(id)),
        }
    }

    async fn find_root_by_title(&self, title: &str) -> Result<Option<Entry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entries WHERE parent_id IS NULL AND title = ? ORDER BY id LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(title)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(map_entry).transpose()
    }

    async fn list_roots(&self, order: Order) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entries WHERE parent_id IS NULL ORDER BY {}",
            order_sql(order)
        );
        self.fetch_list(&sql, None).await
    }

    async fn list_replies(&self, parent_id: EntryId, order: Order) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entries WHERE parent_id = ? ORDER BY {}",
            order_sql(order)
        );
        self.fetch_list(&sql, Some(parent_id)).await
    }

    async fn list_all_replies(&self) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entries WHERE parent_id IS NOT NULL ORDER BY {}",
            order_sql(Order::Ascending)
        );
        self.fetch_list(&sql, None).await
    }

    async fn update(&self, id: EntryId, patch: EntryPatch) -> Result<Entry> {
        patch.validate()?;
        let result = sqlx::query(
            "UPDATE entries SET
                content   = COALESCE(?, content),
                title     = COALESCE(?, title),
                name      = COALESCE(?, name),
                parent_id = COALESCE(?, parent_id)
             WHERE id = ?",
        )
        .bind(patch.content.as_deref())
        .bind(patch.title.as_deref())
        .bind(patch.name.as_deref())
        .bind(patch.parent_id)
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(AppError::NotFound(id)),
            Ok(_) => self.get(id).await,
            Err(err) if is_fk_violation(&err) => Err(AppError::validation(format!(
                "parent {} does not exist",
                patch.parent_id.unwrap_or_default()
            ))),
            Err(err) => Err(storage(err)),
        }
    }

    /// Single-statement `+1`, so concurrent bumps cannot lose updates.
    async fn increment(&self, id: EntryId, reaction: Reaction) -> Result<u64> {
        let sql = match reaction {
            Reaction::Like => {
                "UPDATE entries SET like_count = like_count + 1 WHERE id = ? RETURNING like_count AS n"
            }
            Reaction::Dislike => {
                "UPDATE entries SET dislike_count = dislike_count + 1 WHERE id = ? RETURNING dislike_count AS n"
            }
        };
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match row {
            Some(row) => counter(&row, "n").map_err(storage),
            None => Err(AppError::NotFound(id)),
        }
    }

    async fn delete(&self, id: EntryId) -> Result<()> {
        self.delete_all(&[id]).await
    }

    /// One transaction: any failure rolls the whole batch back.
    async fn delete_all(&self, ids: &[EntryId]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for &id in ids {
            let result = sqlx::query("DELETE FROM entries WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await;
            match result {
                Ok(done) if done.rows_affected() == 0 => return Err(AppError::NotFound(id)),
                Ok(_) => {}
                Err(err) if is_fk_violation(&err) => {
                    return Err(AppError::validation(format!("entry {id} still has replies")))
                }
                Err(err) => return Err(storage(err)),
            }
        }
        tx.commit().await.map_err(storage)?;
        debug!(count = ids.len(), "entries deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::tree::EntryTree;
    use std::sync::Arc;
    use std::time::Duration;

    async fn store() -> SqliteEntryStore {
        SqliteEntryStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_entry() {
        let repo = store().await;
        let root = repo.create(NewEntry::root("hello").with_content("world").with_name("anon")).await.unwrap();
        let reply = repo.create(NewEntry::reply(root)).await.unwrap();

        let fetched = repo.get(root).await.unwrap();
        assert_eq!(fetched.title.as_deref(), Some("hello"));
        assert_eq!(fetched.content, "world");
        assert_eq!(fetched.name, "anon");

        let fetched = repo.get(reply).await.unwrap();
        assert_eq!(fetched.name, "anonymous");
        assert_eq!(fetched.content, "nothing...");
        assert_eq!(fetched.parent_id, Some(root));
        assert!(matches!(repo.get(99).await, Err(AppError::NotFound(99))));
    }

    #[tokio::test]
    async fn test_reply_to_missing_parent() {
        let repo = store().await;
        let err = repo.create(NewEntry::reply(7)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(7)));
    }

    #[tokio::test]
    async fn test_listing_order_and_root_lookup() {
        let repo = store().await;
        let first = repo.create(NewEntry::root("first")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = repo.create(NewEntry::root("second")).await.unwrap();
        let reply = repo
            .create(NewEntry::reply(first).with_title(Some("second".into())))
            .await
            .unwrap();

        let asc: Vec<_> = repo.list_roots(Order::Ascending).await.unwrap().into_iter().map(|e| e.id).collect();
        let desc: Vec<_> = repo.list_roots(Order::Descending).await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(asc, vec![first, second]);
        assert_eq!(desc, vec![second, first]);

        assert_eq!(repo.find_root_by_title("second").await.unwrap().unwrap().id, second);
        assert!(repo.find_root_by_title("nope").await.unwrap().is_none());

        let replies = repo.list_replies(first, Order::Ascending).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, reply);
        assert_eq!(repo.list_all_replies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_patch() {
        let repo = store().await;
        let a = repo.create(NewEntry::root("a")).await.unwrap();
        let b = repo.create(NewEntry::root("b")).await.unwrap();
        let c = repo.create(NewEntry::reply(a).with_content("old")).await.unwrap();

        let patch = EntryPatch { name: Some("op".into()), parent_id: Some(b), ..Default::default() };
        let updated = repo.update(c, patch).await.unwrap();
        assert_eq!(updated.name, "op");
        assert_eq!(updated.content, "old");
        assert_eq!(updated.parent_id, Some(b));

        let dangling = EntryPatch { parent_id: Some(500), ..Default::default() };
        assert!(matches!(repo.update(c, dangling).await, Err(AppError::ValidationError(_))));
        assert!(matches!(repo.update(500, EntryPatch::default()).await, Err(AppError::NotFound(500))));
    }

    #[tokio::test]
    async fn test_delete_respects_foreign_key() {
        let repo = store().await;
        let a = repo.create(NewEntry::root("a")).await.unwrap();
        let b = repo.create(NewEntry::reply(a)).await.unwrap();
        let c = repo.create(NewEntry::reply(b)).await.unwrap();

        assert!(matches!(repo.delete(a).await, Err(AppError::ValidationError(_))));
        // Partial batch fails and rolls back.
        assert!(repo.delete_all(&[c, a]).await.is_err());
        assert!(repo.get(c).await.is_ok());

        repo.delete_all(&[c, b, a]).await.unwrap();
        for id in [a, b, c] {
            assert!(matches!(repo.get(id).await, Err(AppError::NotFound(_))));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subtree_delete_racing_reply_inserts() {
        let repo: Arc<dyn EntryStore> = Arc::new(store().await);
        let tree = Arc::new(EntryTree::new(Arc::clone(&repo)));
        let root = tree.resolve_or_create_root("doomed", None, None).await.unwrap().entry.id;
        let mut deepest = root;
        for _ in 0..3 {
            deepest = tree.create_reply(NewEntry::reply(deepest)).await.unwrap();
        }
        let kept = tree.resolve_or_create_root("kept", None, None).await.unwrap().entry.id;

        let inserts: Vec<_> = (0..24)
            .map(|_| {
                let tree = Arc::clone(&tree);
                tokio::spawn(async move { tree.create_reply(NewEntry::reply(deepest)).await })
            })
            .collect();
        let delete = {
            let tree = Arc::clone(&tree);
            tokio::spawn(async move { tree.delete_subtree(root).await })
        };

        let mut inserted = 0;
        for task in inserts {
            match task.await.unwrap() {
                Ok(_) => inserted += 1,
                Err(AppError::NotFound(id)) => assert_eq!(id, deepest),
                Err(err) => panic!("unexpected insert error: {err}"),
            }
        }
        let removed = delete.await.unwrap().unwrap();
        assert_eq!(removed.len(), 4 + inserted);

        for reply in repo.list_all_replies().await.unwrap() {
            let parent = reply.parent_id.unwrap();
            assert!(repo.get(parent).await.is_ok(), "reply {} lost parent {parent}", reply.id);
        }
        assert!(repo.list_all_replies().await.unwrap().is_empty());
        assert!(repo.get(kept).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments() {
        let repo = Arc::new(store().await);
        let id = repo.create(NewEntry::root("hot")).await.unwrap();

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.increment_like(id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(repo.increment_dislike(id).await.unwrap(), 1);
        assert_eq!(repo.get(id).await.unwrap().like_count, 25);
        assert!(matches!(repo.increment_like(404).await, Err(AppError::NotFound(404))));
    }
}
