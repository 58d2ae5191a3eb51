//! SQLite conversation store implementation.
//!
//! Implements `ConversationStore` from `volpina-core` using sqlx with split
//! read/write pools: raw queries, a private Row struct, reads on `reader`,
//! writes on `writer`.

use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Row, Sqlite};

use volpina_core::repository::conversation::ConversationStore;
use volpina_core::retention::{RetentionCandidate, RetentionPolicy};
use volpina_types::error::RepositoryError;
use volpina_types::message::{MessageId, MessageRecord, NewMessage};

use super::pool::DatabasePool;

/// Upper bound on ids bound into a single DELETE statement.
const DELETE_BATCH: usize = 500;

/// SQLite-backed implementation of `ConversationStore`.
pub struct SqliteConversationStore {
    pool: DatabasePool,
}

impl SqliteConversationStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct MessageRow {
    id: i64,
    conversation_id: String,
    text: String,
    timestamp: i64,
    sender: Option<String>,
    is_saved: bool,
    metadata: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            text: row.try_get("text")?,
            timestamp: row.try_get("timestamp")?,
            sender: row.try_get("sender")?,
            is_saved: row.try_get("is_saved")?,
            metadata: row.try_get("metadata")?,
        })
    }

    fn into_record(self) -> Result<MessageRecord, RepositoryError> {
        let metadata = match serde_json::from_str::<Value>(&self.metadata) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(_) => {
                return Err(RepositoryError::Query(format!(
                    "metadata of message {} is not a JSON object",
                    self.id
                )));
            }
            Err(e) => {
                return Err(RepositoryError::Query(format!("invalid metadata JSON: {e}")));
            }
        };

        Ok(MessageRecord {
            id: MessageId(self.id),
            conversation_id: self.conversation_id,
            text: self.text,
            timestamp: self.timestamp,
            sender: self.sender,
            is_saved: self.is_saved,
            metadata,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a sqlx error onto the repository taxonomy.
fn store_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        sqlx::Error::Database(ref db_err) if db_err.kind() != sqlx::error::ErrorKind::Other => {
            RepositoryError::Conflict(db_err.message().to_string())
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

fn rows_to_records(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<MessageRecord>, RepositoryError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let message_row = MessageRow::from_row(row).map_err(store_error)?;
        records.push(message_row.into_record()?);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// ConversationStore implementation
// ---------------------------------------------------------------------------

impl ConversationStore for SqliteConversationStore {
    async fn append(&self, message: &NewMessage) -> Result<MessageId, RepositoryError> {
        let metadata = serde_json::to_string(&message.metadata)
            .map_err(|e| RepositoryError::Query(format!("unserializable metadata: {e}")))?;

        let result = sqlx::query(
            r#"INSERT INTO messages (conversation_id, text, timestamp, sender, is_saved, metadata)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&message.conversation_id)
        .bind(&message.text)
        .bind(message.timestamp)
        .bind(&message.sender)
        .bind(message.is_saved)
        .bind(metadata)
        .execute(&self.pool.writer)
        .await
        .map_err(store_error)?;

        Ok(MessageId(result.last_insert_rowid()))
    }

    async fn get(&self, id: MessageId) -> Result<Option<MessageRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(store_error)?;

        match row {
            Some(row) => {
                let message_row = MessageRow::from_row(&row).map_err(store_error)?;
                Ok(Some(message_row.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE conversation_id = ? ORDER BY id ASC")
            .bind(conversation_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(store_error)?;

        rows_to_records(&rows)
    }

    async fn list_all(&self) -> Result<Vec<MessageRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM messages ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(store_error)?;

        rows_to_records(&rows)
    }

    async fn set_saved(&self, id: MessageId, saved: bool) -> Result<(), RepositoryError> {
        // SQLite counts matched rows, so re-applying the same value still
        // reports one affected row.
        let result = sqlx::query("UPDATE messages SET is_saved = ? WHERE id = ?")
            .bind(saved)
            .bind(id.0)
            .execute(&self.pool.writer)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool.writer)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool.writer)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected())
    }

    async fn last_activity(&self, conversation_id: &str) -> Result<Option<i64>, RepositoryError> {
        let row = sqlx::query(
            "SELECT MAX(timestamp) AS last_time FROM messages WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(store_error)?;

        row.try_get::<Option<i64>, _>("last_time")
            .map_err(store_error)
    }

    async fn prune_unsaved(
        &self,
        conversation_id: &str,
        policy: &RetentionPolicy,
    ) -> Result<Vec<MessageId>, RepositoryError> {
        // Snapshot and delete share one transaction on the writer connection,
        // so appends that committed before it began are always counted.
        // IMMEDIATE takes the write lock up front: a deferred transaction
        // cannot upgrade once another process has committed since its read,
        // and that failure skips the busy timeout.
        let mut tx = self
            .pool
            .writer
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(store_error)?;

        let rows = sqlx::query(
            "SELECT id, timestamp FROM messages WHERE conversation_id = ? AND is_saved = 0",
        )
        .bind(conversation_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_error)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id").map_err(store_error)?;
            let timestamp: i64 = row.try_get("timestamp").map_err(store_error)?;
            candidates.push(RetentionCandidate::new(MessageId(id), timestamp));
        }

        let prunable = policy.select_prunable(&candidates);
        if prunable.is_empty() {
            tx.commit().await.map_err(store_error)?;
            return Ok(prunable);
        }

        for batch in prunable.chunks(DELETE_BATCH) {
            let mut builder =
                QueryBuilder::<Sqlite>::new("DELETE FROM messages WHERE is_saved = 0 AND id IN (");
            let mut ids = builder.separated(", ");
            for id in batch {
                ids.push_bind(id.0);
            }
            ids.push_unseparated(")");

            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;

        tracing::debug!(
            conversation_id,
            unsaved = candidates.len(),
            pruned = prunable.len(),
            "Retention prune committed"
        );

        Ok(prunable)
    }

    async fn count_unsaved(&self, conversation_id: &str) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM messages WHERE conversation_id = ? AND is_saved = 0",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(store_error)?;

        let count: i64 = row.try_get("cnt").map_err(store_error)?;
        Ok(count as u64)
    }

    async fn count_messages(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM messages")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(store_error)?;

        let count: i64 = row.try_get("cnt").map_err(store_error)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use volpina_core::service::message::MessageService;
    use volpina_types::message::AppendMessageRequest;

    use super::*;
    use crate::sqlite::pool::DatabasePool;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    async fn test_service(cap: usize) -> MessageService<SqliteConversationStore> {
        let store = SqliteConversationStore::new(test_pool().await);
        MessageService::new(store, RetentionPolicy::new(cap))
    }

    fn new_message(conversation_id: &str, timestamp: i64) -> NewMessage {
        AppendMessageRequest::new(conversation_id, format!("message {timestamp}"), timestamp)
            .validate()
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_and_get() {
        let store = SqliteConversationStore::new(test_pool().await);

        let message = AppendMessageRequest::new("c1", "Bonjour", 1_700_000_000_000)
            .with_sender("alice")
            .with_metadata(json!({"lang": "fr", "tags": ["greeting"]}))
            .validate()
            .unwrap();
        let id = store.append(&message).await.unwrap();

        let found = store.get(id).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.conversation_id, "c1");
        assert_eq!(found.text, "Bonjour");
        assert_eq!(found.timestamp, 1_700_000_000_000);
        assert_eq!(found.sender.as_deref(), Some("alice"));
        assert!(!found.is_saved);
        assert_eq!(found.metadata.get("lang"), Some(&json!("fr")));

        assert!(store.get(MessageId(id.0 + 100)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_absent_sender_and_metadata_defaults() {
        let store = SqliteConversationStore::new(test_pool().await);
        let id = store.append(&new_message("c1", 1)).await.unwrap();

        let found = store.get(id).await.unwrap().unwrap();
        assert_eq!(found.sender, None);
        assert!(found.metadata.is_empty());

        let (raw,): (String,) = sqlx::query_as("SELECT metadata FROM messages WHERE id = ?")
            .bind(id.0)
            .fetch_one(&store.pool.reader)
            .await
            .unwrap();
        assert_eq!(raw, "{}");
    }

    #[tokio::test]
    async fn test_list_orders_by_id_not_timestamp() {
        let store = SqliteConversationStore::new(test_pool().await);
        let a = store.append(&new_message("c1", 300)).await.unwrap();
        let b = store.append(&new_message("c1", 100)).await.unwrap();
        store.append(&new_message("other", 200)).await.unwrap();
        let c = store.append(&new_message("c1", 200)).await.unwrap();

        let ids: Vec<MessageId> = store
            .list("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![a, b, c]);

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let store = SqliteConversationStore::new(test_pool().await);
        let first = store.append(&new_message("c1", 1)).await.unwrap();
        let second = store.append(&new_message("c1", 2)).await.unwrap();
        store.delete_message(second).await.unwrap();

        let third = store.append(&new_message("c1", 3)).await.unwrap();
        assert!(third > second);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_set_saved_idempotent_and_not_found() {
        let store = SqliteConversationStore::new(test_pool().await);
        let id = store.append(&new_message("c1", 1)).await.unwrap();

        store.set_saved(id, true).await.unwrap();
        store.set_saved(id, true).await.unwrap();
        assert!(store.get(id).await.unwrap().unwrap().is_saved);

        let err = store.set_saved(MessageId(9_999), true).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_missing_message_is_ok() {
        let store = SqliteConversationStore::new(test_pool().await);
        assert!(!store.delete_message(MessageId(42)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let store = SqliteConversationStore::new(test_pool().await);
        let saved = store.append(&new_message("c1", 1)).await.unwrap();
        store.set_saved(saved, true).await.unwrap();
        store.append(&new_message("c1", 2)).await.unwrap();
        store.append(&new_message("c2", 3)).await.unwrap();

        assert_eq!(store.delete_conversation("c1").await.unwrap(), 2);
        assert!(store.list("c1").await.unwrap().is_empty());
        assert_eq!(store.list("c2").await.unwrap().len(), 1);
        assert_eq!(store.delete_conversation("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_last_activity_includes_saved() {
        let store = SqliteConversationStore::new(test_pool().await);
        assert_eq!(store.last_activity("empty-conv").await.unwrap(), None);

        store.append(&new_message("c1", 100)).await.unwrap();
        let latest = store.append(&new_message("c1", 500)).await.unwrap();
        store.set_saved(latest, true).await.unwrap();
        store.append(&new_message("c1", 300)).await.unwrap();

        assert_eq!(store.last_activity("c1").await.unwrap(), Some(500));
    }

    #[tokio::test]
    async fn test_prune_ranks_by_timestamp_then_id() {
        let store = SqliteConversationStore::new(test_pool().await);
        let old_backfill = store.append(&new_message("c1", 10)).await.unwrap();
        let tie_low = store.append(&new_message("c1", 50)).await.unwrap();
        let tie_high = store.append(&new_message("c1", 50)).await.unwrap();
        let newest = store.append(&new_message("c1", 90)).await.unwrap();
        // Arrives last but carries an old logical time.
        let late_backfill = store.append(&new_message("c1", 20)).await.unwrap();

        let pruned = store
            .prune_unsaved("c1", &RetentionPolicy::new(2))
            .await
            .unwrap();
        assert_eq!(pruned, vec![old_backfill, tie_low, late_backfill]);

        let survivors: Vec<MessageId> =
            store.list("c1").await.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(survivors, vec![tie_high, newest]);
    }

    #[tokio::test]
    async fn test_prune_skips_saved_and_other_conversations() {
        let store = SqliteConversationStore::new(test_pool().await);
        let saved = store.append(&new_message("c1", 1)).await.unwrap();
        store.set_saved(saved, true).await.unwrap();
        for ts in 2..=5 {
            store.append(&new_message("c1", ts)).await.unwrap();
            store.append(&new_message("c2", ts)).await.unwrap();
        }

        let pruned = store
            .prune_unsaved("c1", &RetentionPolicy::new(1))
            .await
            .unwrap();
        assert_eq!(pruned.len(), 3);
        assert!(store.get(saved).await.unwrap().is_some());
        assert_eq!(store.count_unsaved("c1").await.unwrap(), 1);
        assert_eq!(store.count_unsaved("c2").await.unwrap(), 4);
        assert_eq!(store.count_messages().await.unwrap(), 2 + 4);

        // Second run with no intervening append changes nothing.
        let again = store
            .prune_unsaved("c1", &RetentionPolicy::new(1))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_prune_deletes_in_batches() {
        let store = SqliteConversationStore::new(test_pool().await);
        for ts in 0..(DELETE_BATCH as i64 + 30) {
            store.append(&new_message("bulk", ts)).await.unwrap();
        }

        let pruned = store
            .prune_unsaved("bulk", &RetentionPolicy::new(20))
            .await
            .unwrap();
        assert_eq!(pruned.len(), DELETE_BATCH + 10);
        assert_eq!(store.count_unsaved("bulk").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_scenario_twenty_five_appends() {
        let svc = test_service(20).await;
        for ts in 1..=25 {
            svc.append_and_prune(AppendMessageRequest::new("c1", format!("m{ts}"), ts))
                .await
                .unwrap();
        }

        let messages = svc.list_messages(Some("c1")).await.unwrap();
        assert_eq!(messages.len(), 20);
        let timestamps: Vec<i64> = messages.iter().map(|m| m.timestamp).collect();
        assert_eq!(timestamps, (6..=25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_scenario_saved_message_survives() {
        let svc = test_service(20).await;
        let mut ids = Vec::new();
        for ts in 1..=5 {
            ids.push(
                svc.append_and_prune(AppendMessageRequest::new("c2", "early", ts))
                    .await
                    .unwrap(),
            );
        }
        svc.set_saved(ids[1], true).await.unwrap();
        for ts in 6..=25 {
            svc.append_and_prune(AppendMessageRequest::new("c2", "late", ts))
                .await
                .unwrap();
        }

        let messages = svc.list_messages(Some("c2")).await.unwrap();
        assert_eq!(messages.len(), 21);
        assert!(messages.iter().any(|m| m.id == ids[1]));
        assert_eq!(svc.unsaved_count("c2").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_saved_overflow_never_pruned() {
        let svc = test_service(20).await;
        let mut ids = Vec::new();
        for ts in 1..=25 {
            ids.push(
                svc.append_and_prune(AppendMessageRequest::new("c3", "x", ts))
                    .await
                    .unwrap(),
            );
        }
        // Only the last 20 survived the appends above; save them all.
        let survivors = svc.list_messages(Some("c3")).await.unwrap();
        for m in &survivors {
            svc.set_saved(m.id, true).await.unwrap();
        }
        for ts in 26..=60 {
            svc.append_and_prune(AppendMessageRequest::new("c3", "y", ts))
                .await
                .unwrap();
        }

        let remaining = svc.list_messages(Some("c3")).await.unwrap();
        for m in &survivors {
            assert!(remaining.iter().any(|r| r.id == m.id), "saved {} pruned", m.id);
        }
        assert_eq!(svc.unsaved_count("c3").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_concurrent_appends_same_conversation() {
        let svc = Arc::new(test_service(20).await);

        let mut handles = Vec::new();
        for ts in 0..60 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(async move {
                svc.append_and_prune(AppendMessageRequest::new("hot", "x", ts))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(svc.unsaved_count("hot").await.unwrap(), 20);
        let timestamps: Vec<i64> = svc
            .list_messages(Some("hot"))
            .await
            .unwrap()
            .iter()
            .map(|m| m.timestamp)
            .collect();
        assert!(timestamps.iter().all(|ts| *ts >= 40));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_two_pools_on_one_file_prune_without_lock_errors() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("shared.db").display());

        // Each pool has its own writer connection, like a second process.
        let mut services = Vec::new();
        for _ in 0..2 {
            let pool = DatabasePool::new(&url).await.unwrap();
            services.push(Arc::new(MessageService::new(
                SqliteConversationStore::new(pool),
                RetentionPolicy::new(5),
            )));
        }

        let mut handles = Vec::new();
        for ts in 0..2_000_i64 {
            let svc = Arc::clone(&services[(ts % 2) as usize]);
            handles.push(tokio::spawn(async move {
                svc.append_and_prune(AppendMessageRequest::new("shared", "x", ts))
                    .await
            }));
        }

        let mut failures = Vec::new();
        for handle in handles {
            if let Err(e) = handle.await.unwrap() {
                failures.push(e.to_string());
            }
        }
        assert!(failures.is_empty(), "{} failed, first: {:?}", failures.len(), failures.first());

        assert_eq!(services[0].unsaved_count("shared").await.unwrap(), 5);
        let timestamps: Vec<i64> = services[1]
            .list_messages(Some("shared"))
            .await
            .unwrap()
            .iter()
            .map(|m| m.timestamp)
            .collect();
        assert_eq!(timestamps.len(), 5);
        assert!(timestamps.iter().all(|ts| *ts >= 1_995));
    }

    #[tokio::test]
    async fn test_check_constraint_maps_to_conflict() {
        let store = SqliteConversationStore::new(test_pool().await);
        // Bypass validation to reach the schema constraint.
        let mut message = new_message("c1", 1);
        message.text = String::new();

        let err = store.append(&message).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)), "got {err:?}");
    }
}
