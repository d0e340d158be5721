//! Viewport trigger
//!
//! Watches the sentinel (the last rendered post) and emits [`LoadMore`] once
//! for every transition of that sentinel from hidden to visible. Visibility
//! detection itself belongs to the host environment, reached through
//! [`SentinelObserver`].

use post_client::PostId;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::reconciler::FeedStatus;

/// Host hook that starts and stops visibility reporting for an element
pub trait SentinelObserver: Send + Sync {
    fn observe(&self, sentinel: &PostId);
    fn unobserve(&self, sentinel: &PostId);
}

/// Signal asking the feed for the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMore {
    pub sentinel: PostId,
}

/// Active observation; dropping it stops reporting for the sentinel
struct Observation {
    sentinel: PostId,
    observer: Arc<dyn SentinelObserver>,
}

impl Observation {
    fn start(observer: Arc<dyn SentinelObserver>, sentinel: PostId) -> Self {
        observer.observe(&sentinel);
        Self { sentinel, observer }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.observer.unobserve(&self.sentinel);
    }
}

pub struct ViewportTrigger {
    observer: Arc<dyn SentinelObserver>,
    status: watch::Receiver<FeedStatus>,
    signals: mpsc::UnboundedSender<LoadMore>,
    observation: Option<Observation>,
    intersecting: bool,
    mounted: bool,
}

impl ViewportTrigger {
    pub fn new(
        observer: Arc<dyn SentinelObserver>,
        status: watch::Receiver<FeedStatus>,
    ) -> (Self, mpsc::UnboundedReceiver<LoadMore>) {
        let (signals, rx) = mpsc::unbounded_channel();
        let trigger = Self {
            observer,
            status,
            signals,
            observation: None,
            intersecting: false,
            mounted: true,
        };
        (trigger, rx)
    }

    /// Observe a new sentinel, releasing the previous one first
    ///
    /// Re-attaching, even to the same post, re-arms the trigger: the next
    /// visible report fires again.
    pub fn attach_sentinel(&mut self, sentinel: Option<PostId>) {
        self.observation = None;
        self.intersecting = false;

        if !self.mounted {
            return;
        }
        if let Some(sentinel) = sentinel {
            self.observation = Some(Observation::start(self.observer.clone(), sentinel));
        }
    }

    pub fn sentinel(&self) -> Option<&PostId> {
        self.observation.as_ref().map(|o| &o.sentinel)
    }

    /// Feed a visibility report from the host; returns whether a signal was sent
    pub fn on_visibility(&mut self, sentinel: &PostId, is_intersecting: bool) -> bool {
        if !self.mounted || self.sentinel() != Some(sentinel) {
            return false;
        }

        let was_intersecting = std::mem::replace(&mut self.intersecting, is_intersecting);
        if !is_intersecting || was_intersecting {
            return false;
        }

        let (in_flight, exhausted) = {
            let status = self.status.borrow();
            (status.in_flight, status.exhausted)
        };
        if in_flight || exhausted {
            debug!(sentinel = %sentinel, in_flight, exhausted, "Sentinel visible, load suppressed");
            return false;
        }

        self.signals
            .send(LoadMore {
                sentinel: sentinel.clone(),
            })
            .is_ok()
    }

    /// Stop observing for good; later reports and attachments are ignored
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.observation = None;
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}
