//! Message service sequencing append-then-prune per conversation.
//!
//! `MessageService` is the only writer that appends messages. Every append is
//! followed by a prune of the same conversation, so once `append_and_prune`
//! returns `Ok` the conversation holds at most `cap` unsaved messages.
//! Save/unsave and delete go straight to the store.

use tracing::{debug, error, info, warn};

use volpina_types::error::{MessageError, RepositoryError};
use volpina_types::message::{AppendMessageRequest, MessageId, MessageRecord};

use crate::repository::conversation::ConversationStore;
use crate::retention::RetentionPolicy;

/// Orchestrates message writes against a `ConversationStore`.
///
/// Generic over the store to maintain clean architecture (volpina-core never
/// depends on volpina-infra). Holds no state besides the injected store and
/// the retention policy.
pub struct MessageService<S: ConversationStore> {
    store: S,
    policy: RetentionPolicy,
}

impl<S: ConversationStore> MessageService<S> {
    /// Create a new message service over the given store.
    pub fn new(store: S, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    // --- Mutations ---

    /// Validate, append, then prune the message's conversation.
    ///
    /// Validation runs before the store is touched. If the append succeeds
    /// but the prune fails, returns [`MessageError::PruneAfterAppend`]: the
    /// message is stored and the conversation may exceed the cap until the
    /// next successful append.
    #[tracing::instrument(
        name = "append_and_prune",
        skip(self, request),
        fields(conversation_id = tracing::field::Empty, message_id = tracing::field::Empty)
    )]
    pub async fn append_and_prune(
        &self,
        request: AppendMessageRequest,
    ) -> Result<MessageId, MessageError> {
        let message = request.validate()?;
        let span = tracing::Span::current();
        span.record("conversation_id", message.conversation_id.as_str());

        let id = self
            .store
            .append(&message)
            .await
            .map_err(|e| store_failure("append", Some(&message.conversation_id), None, e))?;
        span.record("message_id", id.0);
        debug!("Message appended");

        match self
            .store
            .prune_unsaved(&message.conversation_id, &self.policy)
            .await
        {
            Ok(pruned) => {
                if !pruned.is_empty() {
                    info!(
                        pruned = pruned.len(),
                        cap = self.policy.cap(),
                        "Pruned unsaved messages over retention cap"
                    );
                }
                Ok(id)
            }
            Err(source) => {
                error!(
                    operation = "prune",
                    error = %source,
                    "Prune failed after append; conversation may exceed the cap until the next append"
                );
                Err(MessageError::PruneAfterAppend { id, source })
            }
        }
    }

    /// Run the prune step for a conversation on its own.
    ///
    /// Restores the cap on a conversation left over it by a crash between
    /// insert and prune. A no-op on a compliant conversation.
    pub async fn prune(&self, conversation_id: &str) -> Result<Vec<MessageId>, MessageError> {
        require_conversation_id(conversation_id)?;

        let pruned = self
            .store
            .prune_unsaved(conversation_id, &self.policy)
            .await
            .map_err(|e| store_failure("prune", Some(conversation_id), None, e))?;

        if pruned.is_empty() {
            debug!(conversation_id, "Conversation already within retention cap");
        } else {
            info!(conversation_id, pruned = pruned.len(), "Pruned unsaved messages");
        }
        Ok(pruned)
    }

    /// Mark a message saved (`true`) or unsaved (`false`).
    ///
    /// Idempotent for existing ids; `NotFound` for missing ones. Unsaving does
    /// not prune: the conversation is brought back under the cap by its next
    /// append.
    pub async fn set_saved(&self, id: MessageId, saved: bool) -> Result<(), MessageError> {
        match self.store.set_saved(id, saved).await {
            Ok(()) => {
                debug!(message_id = %id, saved, "Message save state updated");
                Ok(())
            }
            Err(RepositoryError::NotFound) => {
                warn!(message_id = %id, "Attempted to change save state of non-existent message");
                Err(MessageError::NotFound(id))
            }
            Err(e) => Err(store_failure("set_saved", None, Some(id), e)),
        }
    }

    /// Delete a message. Deleting an id that does not exist succeeds.
    pub async fn delete_message(&self, id: MessageId) -> Result<bool, MessageError> {
        let removed = self
            .store
            .delete_message(id)
            .await
            .map_err(|e| store_failure("delete_message", None, Some(id), e))?;

        if removed {
            info!(message_id = %id, "Message deleted");
        } else {
            debug!(message_id = %id, "Delete of missing message treated as success");
        }
        Ok(removed)
    }

    /// Delete every message in a conversation, saved or not.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<u64, MessageError> {
        require_conversation_id(conversation_id)?;

        let removed = self
            .store
            .delete_conversation(conversation_id)
            .await
            .map_err(|e| store_failure("delete_conversation", Some(conversation_id), None, e))?;

        info!(conversation_id, removed, "Conversation deleted");
        Ok(removed)
    }

    // --- Queries ---

    /// List messages by ascending id, for one conversation or for all.
    pub async fn list_messages(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<Vec<MessageRecord>, MessageError> {
        match conversation_id {
            Some(conversation_id) => self
                .store
                .list(conversation_id)
                .await
                .map_err(|e| store_failure("list", Some(conversation_id), None, e)),
            None => self
                .store
                .list_all()
                .await
                .map_err(|e| store_failure("list_all", None, None, e)),
        }
    }

    /// Get a message by id.
    pub async fn get_message(&self, id: MessageId) -> Result<Option<MessageRecord>, MessageError> {
        self.store
            .get(id)
            .await
            .map_err(|e| store_failure("get", None, Some(id), e))
    }

    /// Latest `timestamp` in a conversation, `None` if it has no messages.
    pub async fn last_activity(&self, conversation_id: &str) -> Result<Option<i64>, MessageError> {
        require_conversation_id(conversation_id)?;

        self.store
            .last_activity(conversation_id)
            .await
            .map_err(|e| store_failure("last_activity", Some(conversation_id), None, e))
    }

    /// Number of unsaved messages in a conversation.
    pub async fn unsaved_count(&self, conversation_id: &str) -> Result<u64, MessageError> {
        require_conversation_id(conversation_id)?;

        self.store
            .count_unsaved(conversation_id)
            .await
            .map_err(|e| store_failure("count_unsaved", Some(conversation_id), None, e))
    }

    /// Number of stored messages across all conversations.
    pub async fn total_messages(&self) -> Result<u64, MessageError> {
        self.store
            .count_messages()
            .await
            .map_err(|e| store_failure("count_messages", None, None, e))
    }
}

fn require_conversation_id(conversation_id: &str) -> Result<(), MessageError> {
    if conversation_id.trim().is_empty() {
        return Err(MessageError::Validation(
            "conversation id cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Log a store failure with its context and wrap it for the caller.
fn store_failure(
    operation: &'static str,
    conversation_id: Option<&str>,
    message_id: Option<MessageId>,
    source: RepositoryError,
) -> MessageError {
    error!(
        operation,
        conversation_id = ?conversation_id,
        message_id = ?message_id.map(|id| id.0),
        error = %source,
        "Store operation failed"
    );
    MessageError::store(operation, source)
}
