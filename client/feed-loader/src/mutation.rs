//! Optimistic mutation records
//!
//! A record is created when a user action is applied to the local feed and
//! lives until the matching remote call resolves.

use post_client::{Like, Post, PostId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Like,
    Unlike,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Like => write!(f, "like"),
            MutationKind::Unlike => write!(f, "unlike"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// State needed to undo a mutation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Snapshot {
    /// Like set before a like/unlike
    Likes(Vec<Like>),
    /// Removed post and the position it occupied
    Removed { index: usize, post: Box<Post> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MutationRecord {
    pub id: MutationId,
    pub post_id: PostId,
    pub kind: MutationKind,
    pub snapshot: Snapshot,
    pub status: MutationStatus,
    /// Pending like the viewer has since undone; its confirmation must be
    /// followed by an unlike of the server-issued id
    pub cancelled: bool,
}

/// Outstanding optimistic mutations keyed by id
#[derive(Debug, Default)]
pub(crate) struct MutationLedger {
    next_id: u64,
    records: HashMap<MutationId, MutationRecord>,
}

impl MutationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, post_id: PostId, kind: MutationKind, snapshot: Snapshot) -> MutationId {
        self.next_id += 1;
        let id = MutationId(self.next_id);
        self.records.insert(
            id,
            MutationRecord {
                id,
                post_id,
                kind,
                snapshot,
                status: MutationStatus::Pending,
                cancelled: false,
            },
        );
        id
    }

    /// Remove and return a record, marking it with its final status
    pub fn resolve(&mut self, id: MutationId, status: MutationStatus) -> Option<MutationRecord> {
        self.records.remove(&id).map(|mut record| {
            record.status = status;
            record
        })
    }

    /// Mark the live pending like on `post_id` as undone
    ///
    /// At most one like per post can be pending and not cancelled, since a
    /// new like is only staged while the viewer does not like the post.
    pub fn cancel_pending_like(&mut self, post_id: &PostId) -> Option<MutationId> {
        let record = self
            .records
            .values_mut()
            .find(|r| r.kind == MutationKind::Like && !r.cancelled && &r.post_id == post_id)?;
        record.cancelled = true;
        Some(record.id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
