use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AuthToken, Comment, CommentId, LikeId, LikeReceipt, PageRequest, Post, PostId};

/// Remote post store consumed by the feed core
///
/// Every call takes the bearer token explicitly; implementations must not
/// source credentials on their own.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Fetch one page of a channel. An empty page means no further pages exist.
    async fn fetch_page(&self, request: &PageRequest, token: &AuthToken) -> Result<Vec<Post>>;

    async fn fetch_detail(&self, post_id: &PostId, token: &AuthToken) -> Result<Post>;

    async fn delete_post(&self, post_id: &PostId, token: &AuthToken) -> Result<()>;

    async fn like(&self, post_id: &PostId, token: &AuthToken) -> Result<LikeReceipt>;

    async fn unlike(&self, like_id: &LikeId, token: &AuthToken) -> Result<()>;

    async fn add_comment(&self, post_id: &PostId, text: &str, token: &AuthToken)
        -> Result<Comment>;

    async fn delete_comment(&self, comment_id: &CommentId, token: &AuthToken) -> Result<()>;
}
