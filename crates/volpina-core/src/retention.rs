//! Count-based retention for unsaved messages.
//!
//! Each conversation keeps at most `cap` unsaved messages. Messages are ranked
//! by logical `timestamp` descending, ties broken by `id` descending, so a
//! backfilled message with an old timestamp is pruned before a newer one even
//! if it arrived later. Saved messages never reach this module.

use volpina_types::config::DEFAULT_RETENTION_CAP;
use volpina_types::message::MessageId;

/// The fields of an unsaved message that retention ranks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCandidate {
    pub id: MessageId,
    pub timestamp: i64,
}

impl RetentionCandidate {
    pub fn new(id: MessageId, timestamp: i64) -> Self {
        Self { id, timestamp }
    }
}

/// Keep at most `cap` unsaved messages per conversation.
///
/// The cap is an operator setting, never taken from a request. It has a floor
/// of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    cap: usize,
}

impl RetentionPolicy {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1) }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Return the ids to delete so that at most `cap` candidates survive.
    ///
    /// `candidates` must be the complete set of unsaved messages of a single
    /// conversation, read in the same transaction that will delete the result.
    /// The returned ids are sorted ascending. Pure: running it again on the
    /// survivors yields an empty set.
    pub fn select_prunable(&self, candidates: &[RetentionCandidate]) -> Vec<MessageId> {
        if candidates.len() <= self.cap {
            return Vec::new();
        }

        let mut ranked = candidates.to_vec();
        ranked.sort_unstable_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });

        let mut prunable: Vec<MessageId> = ranked
            .into_iter()
            .skip(self.cap)
            .map(|candidate| candidate.id)
            .collect();
        prunable.sort_unstable();
        prunable
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_CAP)
    }
}
