//! Feed reconciler
//!
//! Owns the post collection and the pagination cursor for one mounted feed.
//! Page loads and optimistic mutations are applied as short synchronous steps
//! under the state lock; the lock is never held across a remote call, so a
//! like or delete can land while a page fetch is outstanding.
//!
//! ```text
//!   Idle ──request_more──▶ Loading ──page(n>0)──▶ Idle
//!     ▲                      │  └────page(0)────▶ Exhausted (terminal)
//!     └──request_more── Error ◀──failure──┘
//! ```

use parking_lot::Mutex;
use post_client::{
    AuthToken, ChannelId, Comment, CommentId, Like, LikeId, LikeReceipt, PageRequest, Post,
    PostId, PostRepository, RepositoryError, UserId,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::BackoffConfig;
use crate::config::{FeedConfig, RollbackPolicy};
use crate::cursor::PaginationCursor;
use crate::error::{CursorError, FeedError, Result};
use crate::merge::merge;
use crate::mutation::{MutationId, MutationKind, MutationLedger, MutationStatus, Snapshot};

/// Message shown to the user when a page fails to load
pub const FETCH_ERROR_MESSAGE: &str = "Failed to load posts.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedPhase {
    Idle,
    Loading,
    Exhausted,
    Error,
}

/// Lightweight status published on every state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStatus {
    pub phase: FeedPhase,
    pub in_flight: bool,
    pub exhausted: bool,
    pub next_page_index: u32,
    /// Bumped whenever the post collection changes
    pub revision: u64,
}

/// Everything the rendering layer needs for one render cycle
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView {
    pub posts: Vec<Post>,
    pub loading: bool,
    pub error: Option<String>,
    pub exhausted: bool,
    pub mutation_error: Option<String>,
}

/// Viewer identity and credentials, supplied by the session store
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub viewer: UserId,
    pub token: AuthToken,
}

impl SessionContext {
    pub fn new(viewer: impl Into<UserId>, token: AuthToken) -> Self {
        Self {
            viewer: viewer.into(),
            token,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    Exhausted,
    BackingOff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Loaded {
        page_index: u32,
        received: usize,
        added: usize,
    },
    Exhausted {
        page_index: u32,
    },
    Failed {
        page_index: u32,
        error: FeedError,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub mutation_id: MutationId,
    pub post_id: PostId,
    pub kind: MutationKind,
    pub status: MutationStatus,
    pub error: Option<FeedError>,
}

struct FeedState {
    posts: Vec<Post>,
    cursor: PaginationCursor,
    phase: FeedPhase,
    error: Option<String>,
    mutation_error: Option<String>,
    ledger: MutationLedger,
    tombstones: HashSet<PostId>,
    consecutive_failures: u32,
    retry_after: Option<Instant>,
    revision: u64,
}

impl FeedState {
    fn new() -> Self {
        Self {
            posts: Vec::new(),
            cursor: PaginationCursor::new(),
            phase: FeedPhase::Idle,
            error: None,
            mutation_error: None,
            ledger: MutationLedger::new(),
            tombstones: HashSet::new(),
            consecutive_failures: 0,
            retry_after: None,
            revision: 0,
        }
    }

    fn status(&self) -> FeedStatus {
        FeedStatus {
            phase: self.phase,
            in_flight: self.cursor.is_in_flight(),
            exhausted: self.cursor.is_exhausted(),
            next_page_index: self.cursor.next_page_index(),
            revision: self.revision,
        }
    }

    fn post_mut(&mut self, post_id: &PostId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| &p.id == post_id)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

enum RemoteCall {
    Like,
    Unlike(LikeId),
    /// Viewer's like has no server id yet; the like's confirmation undoes it
    DeferredUnlike,
    Delete,
}

struct Staged {
    mutation_id: MutationId,
    call: RemoteCall,
}

/// State machine behind one mounted channel feed
pub struct FeedReconciler {
    repository: Arc<dyn PostRepository>,
    session: SessionContext,
    channel_id: ChannelId,
    page_size: u32,
    request_timeout: Duration,
    backoff: BackoffConfig,
    rollback: RollbackPolicy,
    state: Mutex<FeedState>,
    status_tx: watch::Sender<FeedStatus>,
}

impl FeedReconciler {
    pub fn new(
        repository: Arc<dyn PostRepository>,
        session: SessionContext,
        config: &FeedConfig,
    ) -> Self {
        let state = FeedState::new();
        let (status_tx, _) = watch::channel(state.status());

        Self {
            repository,
            session,
            channel_id: ChannelId::new(config.channel_id.clone()),
            page_size: config.page_size,
            request_timeout: config.request_timeout(),
            backoff: config.backoff(),
            rollback: config.rollback_policy,
            state: Mutex::new(state),
            status_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> FeedStatus {
        self.state.lock().status()
    }

    pub fn view(&self) -> FeedView {
        let state = self.state.lock();
        FeedView {
            posts: state.posts.clone(),
            loading: state.cursor.is_in_flight(),
            error: state.error.clone(),
            exhausted: state.cursor.is_exhausted(),
            mutation_error: state.mutation_error.clone(),
        }
    }

    pub fn posts(&self) -> Vec<Post> {
        self.state.lock().posts.clone()
    }

    pub fn post(&self, post_id: &PostId) -> Option<Post> {
        self.state
            .lock()
            .posts
            .iter()
            .find(|p| &p.id == post_id)
            .cloned()
    }

    /// Id of the last post in the collection, used as the viewport sentinel
    pub fn last_post_id(&self) -> Option<PostId> {
        self.state.lock().posts.last().map(|p| p.id.clone())
    }

    pub fn pending_mutations(&self) -> usize {
        self.state.lock().ledger.len()
    }

    /// Time left before a retry is accepted after a failed load
    pub fn retry_delay(&self) -> Duration {
        self.state
            .lock()
            .retry_after
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    fn publish(&self, state: &FeedState) {
        self.status_tx.send_replace(state.status());
    }

    /// Load the next page if the cursor allows it
    ///
    /// Calls made while a fetch is outstanding, after exhaustion, or inside
    /// the retry backoff window are skipped without touching the network.
    pub async fn request_more(&self) -> RequestOutcome {
        let (request, resume_phase) = {
            let mut state = self.state.lock();

            if let Some(at) = state.retry_after {
                if state.cursor.can_fetch() && Instant::now() < at {
                    debug!(channel_id = %self.channel_id, "Skipping load, retry backoff active");
                    return RequestOutcome::Skipped(SkipReason::BackingOff);
                }
            }

            let page_index = match state.cursor.begin_fetch() {
                Ok(index) => index,
                Err(CursorError::InFlight) => {
                    debug!(channel_id = %self.channel_id, "Skipping load, fetch already in flight");
                    return RequestOutcome::Skipped(SkipReason::InFlight);
                }
                Err(CursorError::Exhausted) => {
                    debug!(channel_id = %self.channel_id, "Skipping load, feed exhausted");
                    return RequestOutcome::Skipped(SkipReason::Exhausted);
                }
            };

            let resume_phase = std::mem::replace(&mut state.phase, FeedPhase::Loading);
            self.publish(&state);

            let request = PageRequest {
                channel_id: self.channel_id.clone(),
                page_index,
                page_size: self.page_size,
            };
            (request, resume_phase)
        };
        let guard = FetchGuard {
            reconciler: self,
            page_index: request.page_index,
            resume_phase,
            armed: true,
        };

        info!(
            channel_id = %request.channel_id,
            page_index = request.page_index,
            page_size = request.page_size,
            "Loading feed page"
        );

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.repository.fetch_page(&request, &self.session.token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Network(format!(
                "page request timed out after {:?}",
                self.request_timeout
            ))),
        };

        guard.disarm();
        self.finish_fetch(request.page_index, result)
    }

    fn finish_fetch(
        &self,
        page_index: u32,
        result: std::result::Result<Vec<Post>, RepositoryError>,
    ) -> RequestOutcome {
        let mut state = self.state.lock();

        let outcome = match result {
            Ok(page) => {
                let received = page.len();
                state.cursor.complete_fetch(received);
                state.consecutive_failures = 0;
                state.retry_after = None;
                state.error = None;

                let incoming: Vec<Post> = page
                    .into_iter()
                    .filter(|p| !state.tombstones.contains(&p.id))
                    .collect();
                let before = state.posts.len();
                let existing = std::mem::take(&mut state.posts);
                state.posts = merge(existing, incoming);
                let added = state.posts.len() - before;
                if added > 0 {
                    state.touch();
                }

                if state.cursor.is_exhausted() {
                    state.phase = FeedPhase::Exhausted;
                    info!(
                        channel_id = %self.channel_id,
                        total = state.posts.len(),
                        "Feed exhausted"
                    );
                    RequestOutcome::Exhausted { page_index }
                } else {
                    state.phase = FeedPhase::Idle;
                    info!(
                        channel_id = %self.channel_id,
                        page_index,
                        received,
                        added,
                        "Feed page merged"
                    );
                    RequestOutcome::Loaded {
                        page_index,
                        received,
                        added,
                    }
                }
            }
            Err(err) => {
                state.cursor.fail_fetch();
                state.consecutive_failures += 1;
                let delay = if err.is_retryable() {
                    self.backoff.delay_for(state.consecutive_failures)
                } else {
                    self.backoff.ceiling()
                };
                state.retry_after = (!delay.is_zero()).then(|| Instant::now() + delay);
                state.error = Some(FETCH_ERROR_MESSAGE.to_string());
                state.phase = FeedPhase::Error;

                warn!(
                    channel_id = %self.channel_id,
                    page_index,
                    failures = state.consecutive_failures,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "Failed to load feed page"
                );
                RequestOutcome::Failed {
                    page_index,
                    error: FeedError::FetchFailure(err.to_string()),
                }
            }
        };

        self.publish(&state);
        outcome
    }

    /// Apply a like, unlike or delete locally, then confirm it remotely
    ///
    /// The local change is visible before the remote call is issued. Remote
    /// failures are reported in the outcome and in [`FeedView::mutation_error`];
    /// whether the local change is undone depends on the rollback policy.
    pub async fn apply_optimistic(
        &self,
        post_id: &PostId,
        kind: MutationKind,
    ) -> Result<MutationOutcome> {
        let staged = self.stage(post_id, kind)?;
        let token = &self.session.token;

        let outcome = match staged.call {
            RemoteCall::Like => {
                let result = self.repository.like(post_id, token).await;
                self.settle_like(staged.mutation_id, post_id, result).await
            }
            RemoteCall::Unlike(like_id) => {
                let result = self.repository.unlike(&like_id, token).await;
                self.settle(staged.mutation_id, post_id, kind, result)
            }
            RemoteCall::DeferredUnlike => {
                debug!(post_id = %post_id, "Unlike deferred until the pending like confirms");
                let mut outcome = self.settle(staged.mutation_id, post_id, kind, Ok(()));
                outcome.status = MutationStatus::Pending;
                outcome
            }
            RemoteCall::Delete => {
                let result = match self.repository.delete_post(post_id, token).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other,
                };
                self.settle(staged.mutation_id, post_id, kind, result)
            }
        };

        Ok(outcome)
    }

    fn stage(&self, post_id: &PostId, kind: MutationKind) -> Result<Staged> {
        let viewer = &self.session.viewer;
        let mut state = self.state.lock();

        let index = state
            .posts
            .iter()
            .position(|p| &p.id == post_id)
            .ok_or_else(|| FeedError::NotFound(post_id.clone()))?;

        let (snapshot, call) = match kind {
            MutationKind::Like => {
                let post = &mut state.posts[index];
                if post.is_liked_by(viewer) {
                    return Err(FeedError::InvalidMutation(format!(
                        "post {} is already liked",
                        post_id
                    )));
                }
                let snapshot = Snapshot::Likes(post.likes.clone());
                post.likes.push(Like::provisional(viewer.clone()));
                (snapshot, RemoteCall::Like)
            }
            MutationKind::Unlike => {
                let post = &mut state.posts[index];
                let like = post.like_by(viewer).cloned().ok_or_else(|| {
                    FeedError::InvalidMutation(format!("post {} is not liked", post_id))
                })?;
                let snapshot = Snapshot::Likes(post.likes.clone());
                post.likes.retain(|l| &l.user != viewer);
                let call = match like.id {
                    Some(like_id) => RemoteCall::Unlike(like_id),
                    None => RemoteCall::DeferredUnlike,
                };
                (snapshot, call)
            }
            MutationKind::Delete => {
                let post = state.posts.remove(index);
                state.tombstones.insert(post_id.clone());
                (
                    Snapshot::Removed {
                        index,
                        post: Box::new(post),
                    },
                    RemoteCall::Delete,
                )
            }
        };

        if matches!(call, RemoteCall::DeferredUnlike) {
            state.ledger.cancel_pending_like(post_id);
        }
        let mutation_id = state.ledger.record(post_id.clone(), kind, snapshot);
        state.touch();
        self.publish(&state);

        debug!(post_id = %post_id, kind = %kind, mutation_id = %mutation_id, "Applied optimistic mutation");
        Ok(Staged { mutation_id, call })
    }

    async fn settle_like(
        &self,
        mutation_id: MutationId,
        post_id: &PostId,
        result: std::result::Result<LikeReceipt, RepositoryError>,
    ) -> MutationOutcome {
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => return self.settle(mutation_id, post_id, MutationKind::Like, Err(err)),
        };

        let cancelled = {
            let viewer = &self.session.viewer;
            let mut state = self.state.lock();
            let cancelled = state
                .ledger
                .resolve(mutation_id, MutationStatus::Confirmed)
                .is_some_and(|record| record.cancelled);

            // A live like owns the viewer's only provisional entry on the post
            if !cancelled {
                let provisional = state.post_mut(post_id).and_then(|post| {
                    post.likes
                        .iter_mut()
                        .find(|l| &l.user == viewer && l.is_provisional())
                });
                if let Some(like) = provisional {
                    like.id = Some(receipt.like_id.clone());
                }
            }
            cancelled
        };

        // The viewer unliked while this like was in flight
        if cancelled {
            let like_id = &receipt.like_id;
            debug!(post_id = %post_id, like_id = %like_id, "Sending deferred unlike");
            if let Err(err) = self.repository.unlike(like_id, &self.session.token).await {
                let mut state = self.state.lock();
                warn!(post_id = %post_id, error = %err, "Deferred unlike failed");
                state.mutation_error = Some(
                    FeedError::MutationFailure {
                        post_id: post_id.clone(),
                        reason: err.to_string(),
                    }
                    .to_string(),
                );
            }
        }

        MutationOutcome {
            mutation_id,
            post_id: post_id.clone(),
            kind: MutationKind::Like,
            status: MutationStatus::Confirmed,
            error: None,
        }
    }

    fn settle(
        &self,
        mutation_id: MutationId,
        post_id: &PostId,
        kind: MutationKind,
        result: std::result::Result<(), RepositoryError>,
    ) -> MutationOutcome {
        let mut state = self.state.lock();

        let err = match result {
            Ok(()) => {
                state.ledger.resolve(mutation_id, MutationStatus::Confirmed);
                return MutationOutcome {
                    mutation_id,
                    post_id: post_id.clone(),
                    kind,
                    status: MutationStatus::Confirmed,
                    error: None,
                };
            }
            Err(err) => err,
        };

        let error = FeedError::MutationFailure {
            post_id: post_id.clone(),
            reason: err.to_string(),
        };
        warn!(
            post_id = %post_id,
            kind = %kind,
            error = %err,
            rollback = ?self.rollback,
            "Remote mutation failed"
        );
        state.mutation_error = Some(error.to_string());

        if let Some(record) = state.ledger.resolve(mutation_id, MutationStatus::Failed) {
            if self.rollback == RollbackPolicy::Restore && !record.cancelled {
                self.restore(&mut state, record.kind, record.snapshot, post_id);
                state.touch();
                self.publish(&state);
            }
        }

        MutationOutcome {
            mutation_id,
            post_id: post_id.clone(),
            kind,
            status: MutationStatus::Failed,
            error: Some(error),
        }
    }

    /// Undo the viewer-visible effect of a failed mutation
    ///
    /// Only the viewer's own membership is restored so that changes made by
    /// later mutations on the same post are kept.
    fn restore(&self, state: &mut FeedState, kind: MutationKind, snapshot: Snapshot, post_id: &PostId) {
        let viewer = &self.session.viewer;
        match (kind, snapshot) {
            (MutationKind::Like, _) => {
                if let Some(post) = state.post_mut(post_id) {
                    post.likes.retain(|l| !(&l.user == viewer && l.is_provisional()));
                }
            }
            (MutationKind::Unlike, Snapshot::Likes(previous)) => {
                let prior = previous.into_iter().find(|l| &l.user == viewer);
                if let (Some(post), Some(like)) = (state.post_mut(post_id), prior) {
                    if !post.is_liked_by(viewer) {
                        post.likes.push(like);
                    }
                }
            }
            (MutationKind::Delete, Snapshot::Removed { index, post }) => {
                state.tombstones.remove(post_id);
                if !state.posts.iter().any(|p| &p.id == post_id) {
                    let at = index.min(state.posts.len());
                    state.posts.insert(at, *post);
                }
            }
            (kind, _) => {
                warn!(post_id = %post_id, kind = %kind, "Snapshot does not match mutation kind");
            }
        }
    }

    /// Fetch full post detail for the detail view
    pub async fn open_detail(&self, post_id: &PostId) -> Result<Post> {
        self.repository
            .fetch_detail(post_id, &self.session.token)
            .await
            .map_err(|err| {
                warn!(post_id = %post_id, error = %err, "Failed to fetch post detail");
                FeedError::from_repository(post_id, err)
            })
    }

    /// Post a comment and append the server's copy to the local post
    pub async fn add_comment(&self, post_id: &PostId, text: &str) -> Result<Comment> {
        if self.post(post_id).is_none() {
            return Err(FeedError::NotFound(post_id.clone()));
        }

        let comment = self
            .repository
            .add_comment(post_id, text, &self.session.token)
            .await
            .map_err(|err| FeedError::from_repository(post_id, err))?;

        let mut state = self.state.lock();
        if let Some(post) = state.post_mut(post_id) {
            post.comments.push(comment.clone());
            state.touch();
            self.publish(&state);
        }
        Ok(comment)
    }

    pub async fn delete_comment(&self, post_id: &PostId, comment_id: &CommentId) -> Result<()> {
        self.repository
            .delete_comment(comment_id, &self.session.token)
            .await
            .map_err(|err| FeedError::from_repository(post_id, err))?;

        let mut state = self.state.lock();
        if let Some(post) = state.post_mut(post_id) {
            post.comments.retain(|c| &c.id != comment_id);
            state.touch();
            self.publish(&state);
        }
        Ok(())
    }
}

/// Releases the cursor when a page request is dropped before it settles
struct FetchGuard<'a> {
    reconciler: &'a FeedReconciler,
    page_index: u32,
    resume_phase: FeedPhase,
    armed: bool,
}

impl FetchGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.reconciler.state.lock();
        state.cursor.fail_fetch();
        state.phase = self.resume_phase;
        self.reconciler.publish(&state);
        debug!(
            channel_id = %self.reconciler.channel_id,
            page_index = self.page_index,
            "Page request dropped before completion"
        );
    }
}
