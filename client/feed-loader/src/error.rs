//! Error types for the feed core

use post_client::{PostId, RepositoryError};
use thiserror::Error;

/// Result type alias for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Precondition violations on the pagination cursor
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    #[error("Feed is exhausted")]
    Exhausted,

    #[error("A page fetch is already in flight")]
    InFlight,
}

/// Errors surfaced by the feed reconciler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Post is not (or no longer) part of the feed, or the server does not know it
    #[error("Post not found: {0}")]
    NotFound(PostId),

    /// Page load failed; already loaded posts are kept and a retry is allowed
    #[error("Failed to load posts: {0}")]
    FetchFailure(String),

    /// Remote like/unlike/delete failed after the local change was applied
    #[error("Mutation on post {post_id} failed: {reason}")]
    MutationFailure { post_id: PostId, reason: String },

    /// Mutation does not apply to the post's current state
    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl FeedError {
    /// Convert a repository failure on a call targeting `post_id`
    pub fn from_repository(post_id: &PostId, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => FeedError::NotFound(post_id.clone()),
            other => FeedError::Repository(other),
        }
    }
}
