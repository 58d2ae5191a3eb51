//! ConversationStore trait definition.
//!
//! The persistence boundary for message records. Every operation is scoped to
//! a single conversation or a single record.

use volpina_types::error::RepositoryError;
use volpina_types::message::{MessageId, MessageRecord, NewMessage};

use crate::retention::RetentionPolicy;

/// Repository trait for message persistence.
///
/// Implementations live in volpina-infra (e.g., `SqliteConversationStore`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
///
/// The store is the single source of truth: implementations must not cache
/// counts or save state in memory.
pub trait ConversationStore: Send + Sync {
    /// Insert a validated message and return its store-assigned id.
    fn append(
        &self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<MessageId, RepositoryError>> + Send;

    /// Get a single message by id.
    fn get(
        &self,
        id: MessageId,
    ) -> impl std::future::Future<Output = Result<Option<MessageRecord>, RepositoryError>> + Send;

    /// List a conversation's messages ordered by id ASC (insertion order).
    fn list(
        &self,
        conversation_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<MessageRecord>, RepositoryError>> + Send;

    /// List every stored message ordered by id ASC.
    fn list_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<MessageRecord>, RepositoryError>> + Send;

    /// Set the saved flag. Returns `NotFound` if the id does not exist;
    /// setting the current value again succeeds.
    fn set_saved(
        &self,
        id: MessageId,
        saved: bool,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete one message. Returns `true` if a row was removed; a missing id
    /// is not an error.
    fn delete_message(
        &self,
        id: MessageId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Delete every message of a conversation, saved or not. Returns the
    /// number of rows removed.
    fn delete_conversation(
        &self,
        conversation_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Maximum `timestamp` over all messages of a conversation, or `None`
    /// when it has none.
    fn last_activity(
        &self,
        conversation_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<i64>, RepositoryError>> + Send;

    /// Enforce the retention policy on one conversation.
    ///
    /// Must read the conversation's unsaved messages and delete the ids chosen
    /// by [`RetentionPolicy::select_prunable`] within a single write
    /// transaction, so concurrent appends are counted at prune time. Returns
    /// the pruned ids.
    fn prune_unsaved(
        &self,
        conversation_id: &str,
        policy: &RetentionPolicy,
    ) -> impl std::future::Future<Output = Result<Vec<MessageId>, RepositoryError>> + Send;

    /// Number of unsaved messages in a conversation.
    fn count_unsaved(
        &self,
        conversation_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Total number of stored messages across all conversations.
    fn count_messages(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
