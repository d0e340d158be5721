//! Scripted in-memory post repository for feed tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use post_client::{
    AuthToken, Author, Comment, CommentId, Like, LikeId, LikeReceipt, PageRequest, Post, PostId,
    PostRepository, RepositoryError, Result as RepoResult, UserId,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use feed_loader::{FeedConfig, FeedReconciler, RollbackPolicy, SessionContext};

pub const VIEWER: &str = "viewer-u";

pub fn post(id: &str) -> Post {
    Post {
        id: PostId::new(id),
        title: format!("Post {}", id),
        author: Author {
            id: UserId::new("author"),
            display_name: "Author".to_string(),
        },
        image: None,
        comments: Vec::new(),
        likes: Vec::new(),
        created_at: Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).unwrap(),
    }
}

/// Post already liked by `likers`, each with a confirmed like id
pub fn post_with_likes(id: &str, likers: &[&str]) -> Post {
    let mut p = post(id);
    p.likes = likers
        .iter()
        .map(|user| Like {
            id: Some(LikeId::new(format!("like-{}-{}", id, user))),
            user: UserId::new(*user),
        })
        .collect();
    p
}

pub fn ids(posts: &[Post]) -> Vec<String> {
    posts.iter().map(|p| p.id.to_string()).collect()
}

#[derive(Default)]
pub struct ScriptedRepository {
    pages: Mutex<VecDeque<RepoResult<Vec<Post>>>>,
    like_results: Mutex<VecDeque<RepoResult<LikeReceipt>>>,
    unlike_results: Mutex<VecDeque<RepoResult<()>>>,
    delete_results: Mutex<VecDeque<RepoResult<()>>>,
    requested_pages: Mutex<Vec<u32>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    like_counter: AtomicUsize,
    page_gate: Mutex<Option<Arc<Semaphore>>>,
    mutation_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, posts: Vec<Post>) {
        self.pages.lock().push_back(Ok(posts));
    }

    pub fn push_page_error(&self, err: RepositoryError) {
        self.pages.lock().push_back(Err(err));
    }

    pub fn push_like_result(&self, result: RepoResult<LikeReceipt>) {
        self.like_results.lock().push_back(result);
    }

    pub fn push_unlike_result(&self, result: RepoResult<()>) {
        self.unlike_results.lock().push_back(result);
    }

    pub fn push_delete_result(&self, result: RepoResult<()>) {
        self.delete_results.lock().push_back(result);
    }

    /// Hold every page fetch until the returned gate hands out a permit
    pub fn gate_pages(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.page_gate.lock() = Some(gate.clone());
        gate
    }

    /// Hold every like/unlike/delete call until the returned gate hands out a permit
    pub fn gate_mutations(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.mutation_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested_pages.lock().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn wait_mutation_gate(&self) {
        let gate = self.mutation_gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl PostRepository for ScriptedRepository {
    async fn fetch_page(&self, request: &PageRequest, _token: &AuthToken) -> RepoResult<Vec<Post>> {
        self.requested_pages.lock().push(request.page_index);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.page_gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.pages.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_detail(&self, post_id: &PostId, _token: &AuthToken) -> RepoResult<Post> {
        self.calls.lock().push(format!("detail:{}", post_id));
        Err(RepositoryError::NotFound(post_id.to_string()))
    }

    async fn delete_post(&self, post_id: &PostId, _token: &AuthToken) -> RepoResult<()> {
        self.calls.lock().push(format!("delete:{}", post_id));
        self.wait_mutation_gate().await;
        self.delete_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn like(&self, post_id: &PostId, _token: &AuthToken) -> RepoResult<LikeReceipt> {
        self.calls.lock().push(format!("like:{}", post_id));
        self.wait_mutation_gate().await;
        let scripted = self.like_results.lock().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.like_counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(LikeReceipt {
                like_id: LikeId::new(format!("server-like-{}", n)),
                like_count: None,
            })
        })
    }

    async fn unlike(&self, like_id: &LikeId, _token: &AuthToken) -> RepoResult<()> {
        self.calls.lock().push(format!("unlike:{}", like_id));
        self.wait_mutation_gate().await;
        self.unlike_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn add_comment(
        &self,
        post_id: &PostId,
        text: &str,
        _token: &AuthToken,
    ) -> RepoResult<Comment> {
        self.calls.lock().push(format!("comment:{}", post_id));
        Ok(Comment {
            id: CommentId::new("c1"),
            author: Author {
                id: UserId::new(VIEWER),
                display_name: "Viewer".to_string(),
            },
            text: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 10, 2, 9, 0, 0).unwrap(),
        })
    }

    async fn delete_comment(&self, comment_id: &CommentId, _token: &AuthToken) -> RepoResult<()> {
        self.calls.lock().push(format!("delete-comment:{}", comment_id));
        Ok(())
    }
}

pub fn config(page_size: u32) -> FeedConfig {
    let mut config = FeedConfig::for_channel("channel-1");
    config.page_size = page_size;
    config.retry_initial_backoff_ms = 0;
    config.retry_jitter = false;
    config
}

pub fn reconciler_with(repo: &Arc<ScriptedRepository>, config: &FeedConfig) -> Arc<FeedReconciler> {
    Arc::new(FeedReconciler::new(
        repo.clone(),
        SessionContext::new(VIEWER, AuthToken::new("token")),
        config,
    ))
}

pub fn reconciler(repo: &Arc<ScriptedRepository>) -> Arc<FeedReconciler> {
    reconciler_with(repo, &config(2))
}

pub fn restoring_reconciler(repo: &Arc<ScriptedRepository>) -> Arc<FeedReconciler> {
    let mut config = config(2);
    config.rollback_policy = RollbackPolicy::Restore;
    reconciler_with(repo, &config)
}
