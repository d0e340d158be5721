//! Headless feed driver
//!
//! Mounts a channel feed against the live post API and scrolls it to the end
//! with a viewport that always reports the sentinel as visible.

use anyhow::Context;
use post_client::{AuthToken, HttpPostRepository, PostId};
use std::sync::Arc;
use tracing::{error, info, warn};

use feed_loader::telemetry::init_tracing;
use feed_loader::{
    FeedConfig, FeedReconciler, FeedSession, RequestOutcome, SentinelObserver, SessionConfig,
    SessionContext,
};

const MAX_CONSECUTIVE_FAILURES: u32 = 3;

struct HeadlessViewport;

impl SentinelObserver for HeadlessViewport {
    fn observe(&self, sentinel: &PostId) {
        tracing::debug!(sentinel = %sentinel, "Observing sentinel");
    }

    fn unobserve(&self, sentinel: &PostId) {
        tracing::debug!(sentinel = %sentinel, "Released sentinel");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = FeedConfig::from_env().context("Failed to load feed configuration")?;
    init_tracing(&config.log_level, config.log_format)?;

    if let Err(e) = run(config).await {
        error!(error = %e, "Feed driver failed");
        return Err(e);
    }
    Ok(())
}

async fn run(config: FeedConfig) -> anyhow::Result<()> {
    let session = SessionConfig::from_env().context("Failed to load session credentials")?;
    let repository = HttpPostRepository::new(&config.api_base_url, config.request_timeout())?;

    info!(
        api_base_url = %config.api_base_url,
        channel_id = %config.channel_id,
        page_size = config.page_size,
        "Mounting feed"
    );

    let reconciler = Arc::new(FeedReconciler::new(
        Arc::new(repository),
        SessionContext::new(session.user_id, AuthToken::new(session.token)),
        &config,
    ));
    let mut feed = FeedSession::mount(reconciler.clone(), Arc::new(HeadlessViewport));

    let mut failures = 0;
    let mut outcome = feed.request_more().await;

    loop {
        match &outcome {
            RequestOutcome::Exhausted { .. } => break,
            RequestOutcome::Failed { error, .. } => {
                failures += 1;
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    warn!(failures, error = %error, "Giving up after repeated failures");
                    break;
                }
                tokio::time::sleep(reconciler.retry_delay()).await;
                outcome = feed.request_more().await;
                continue;
            }
            _ => failures = 0,
        }

        feed.rendered();
        let Some(sentinel) = feed.sentinel().cloned() else {
            break;
        };
        feed.on_visibility(&sentinel, true);

        match feed.pump().await.pop() {
            Some(next) => outcome = next,
            None => break,
        }
    }

    let view = feed.view();
    for post in &view.posts {
        println!(
            "{}\t{}\t{} likes\t{}",
            post.id,
            post.author.display_name,
            post.like_count(),
            post.title
        );
    }
    info!(
        total = view.posts.len(),
        exhausted = view.exhausted,
        error = ?view.error,
        "Feed drained"
    );

    feed.unmount();
    Ok(())
}
