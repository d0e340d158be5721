//! Mounted feed session
//!
//! Ties the reconciler to a viewport trigger and exposes the entry points the
//! rendering layer calls: `request_more`, `apply_optimistic` and
//! `attach_sentinel`, plus the per-render [`FeedView`].

use post_client::PostId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;
use crate::mutation::MutationKind;
use crate::reconciler::{FeedReconciler, FeedView, MutationOutcome, RequestOutcome};
use crate::trigger::{LoadMore, SentinelObserver, ViewportTrigger};

pub struct FeedSession {
    reconciler: Arc<FeedReconciler>,
    trigger: ViewportTrigger,
    signals: mpsc::UnboundedReceiver<LoadMore>,
}

impl FeedSession {
    /// Mount a feed: wire the trigger to the reconciler's status
    pub fn mount(reconciler: Arc<FeedReconciler>, observer: Arc<dyn SentinelObserver>) -> Self {
        let (trigger, signals) = ViewportTrigger::new(observer, reconciler.subscribe());
        Self {
            reconciler,
            trigger,
            signals,
        }
    }

    pub fn reconciler(&self) -> &Arc<FeedReconciler> {
        &self.reconciler
    }

    pub fn view(&self) -> FeedView {
        self.reconciler.view()
    }

    pub async fn request_more(&self) -> RequestOutcome {
        self.reconciler.request_more().await
    }

    pub async fn apply_optimistic(
        &self,
        post_id: &PostId,
        kind: MutationKind,
    ) -> Result<MutationOutcome> {
        self.reconciler.apply_optimistic(post_id, kind).await
    }

    pub fn attach_sentinel(&mut self, sentinel: Option<PostId>) {
        self.trigger.attach_sentinel(sentinel);
    }

    /// Re-attach the trigger to the current last post after a render
    pub fn rendered(&mut self) {
        let sentinel = self.reconciler.last_post_id();
        self.trigger.attach_sentinel(sentinel);
    }

    pub fn sentinel(&self) -> Option<&PostId> {
        self.trigger.sentinel()
    }

    pub fn on_visibility(&mut self, sentinel: &PostId, is_intersecting: bool) -> bool {
        self.trigger.on_visibility(sentinel, is_intersecting)
    }

    /// Serve every queued load signal; returns the outcome of each request
    pub async fn pump(&mut self) -> Vec<RequestOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            debug!(sentinel = %signal.sentinel, "Load signal received");
            outcomes.push(self.reconciler.request_more().await);
        }
        outcomes
    }

    /// Release the sentinel observation; in-flight requests are not cancelled
    pub fn unmount(mut self) {
        self.trigger.unmount();
        info!("Feed unmounted");
    }
}

/// Serve load signals from a trigger owned elsewhere until the channel closes
/// or the feed is exhausted
pub async fn drive_signals(
    reconciler: Arc<FeedReconciler>,
    mut signals: mpsc::UnboundedReceiver<LoadMore>,
) -> usize {
    let mut served = 0;
    while let Some(signal) = signals.recv().await {
        debug!(sentinel = %signal.sentinel, "Load signal received");
        reconciler.request_more().await;
        served += 1;
        if reconciler.status().exhausted {
            break;
        }
    }
    served
}
