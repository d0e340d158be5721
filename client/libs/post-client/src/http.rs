//! reqwest-backed implementation of the post REST contract

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RepositoryError, Result};
use crate::models::{AuthToken, Comment, CommentId, LikeId, LikeReceipt, PageRequest, Post, PostId};
use crate::repository::PostRepository;

/// HTTP client for the post API
#[derive(Debug, Clone)]
pub struct HttpPostRepository {
    client: Client,
    base_url: String,
}

impl HttpPostRepository {
    /// Create a client rooted at `base_url` (e.g. `http://localhost:3000/api`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, token: &AuthToken) -> Result<Response> {
        let response = request.bearer_auth(token.as_str()).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!(status = status.as_u16(), "Post API returned non-success status");
        Err(RepositoryError::from_status(status.as_u16(), message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: &AuthToken,
    ) -> Result<T> {
        Ok(self.send(request, token).await?.json::<T>().await?)
    }
}

#[async_trait]
impl PostRepository for HttpPostRepository {
    async fn fetch_page(&self, request: &PageRequest, token: &AuthToken) -> Result<Vec<Post>> {
        let url = self.url(&format!(
            "/posts/channel/{}",
            urlencoding::encode(request.channel_id.as_str())
        ));
        debug!(
            channel_id = %request.channel_id,
            page_index = request.page_index,
            page_size = request.page_size,
            "Fetching channel page"
        );

        // The API names the page index `offset`.
        let builder = self.client.get(&url).query(&[
            ("offset", request.page_index),
            ("limit", request.page_size),
        ]);
        self.send_json(builder, token).await
    }

    async fn fetch_detail(&self, post_id: &PostId, token: &AuthToken) -> Result<Post> {
        let url = self.url(&format!("/posts/{}", urlencoding::encode(post_id.as_str())));
        self.send_json(self.client.get(&url), token).await
    }

    async fn delete_post(&self, post_id: &PostId, token: &AuthToken) -> Result<()> {
        let builder = self
            .client
            .delete(self.url("/posts/delete"))
            .json(&json!({ "id": post_id }));
        self.send(builder, token).await.map(|_| ())
    }

    async fn like(&self, post_id: &PostId, token: &AuthToken) -> Result<LikeReceipt> {
        let builder = self
            .client
            .post(self.url("/likes/create"))
            .json(&json!({ "postId": post_id }));
        self.send_json(builder, token).await
    }

    async fn unlike(&self, like_id: &LikeId, token: &AuthToken) -> Result<()> {
        let builder = self
            .client
            .delete(self.url("/likes/delete"))
            .json(&json!({ "id": like_id }));
        self.send(builder, token).await.map(|_| ())
    }

    async fn add_comment(
        &self,
        post_id: &PostId,
        text: &str,
        token: &AuthToken,
    ) -> Result<Comment> {
        let builder = self
            .client
            .post(self.url("/comments/create"))
            .json(&json!({ "postId": post_id, "comment": text }));
        self.send_json(builder, token).await
    }

    async fn delete_comment(&self, comment_id: &CommentId, token: &AuthToken) -> Result<()> {
        let builder = self
            .client
            .delete(self.url("/comments/delete"))
            .json(&json!({ "id": comment_id }));
        self.send(builder, token).await.map(|_| ())
    }
}
