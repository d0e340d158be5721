//! Incremental channel feed loader
//!
//! Turns a paged, possibly overlapping remote post listing into a growing,
//! de-duplicated local feed driven by viewport signals, and keeps that feed
//! consistent under optimistic likes, unlikes and deletes.

pub mod backoff;
pub mod config;
pub mod cursor;
pub mod error;
pub mod merge;
pub mod mutation;
pub mod reconciler;
pub mod session;
pub mod telemetry;
pub mod trigger;

pub use backoff::BackoffConfig;
pub use config::{ConfigError, FeedConfig, LogFormat, RollbackPolicy, SessionConfig};
pub use cursor::PaginationCursor;
pub use error::{CursorError, FeedError, Result};
pub use merge::merge;
pub use mutation::{MutationId, MutationKind, MutationStatus};
pub use reconciler::{
    FeedPhase, FeedReconciler, FeedStatus, FeedView, MutationOutcome, RequestOutcome,
    SessionContext, SkipReason, FETCH_ERROR_MESSAGE,
};
pub use session::{drive_signals, FeedSession};
pub use trigger::{LoadMore, SentinelObserver, ViewportTrigger};
