//! Page loading through the feed reconciler: merge, exhaustion, retry, backoff

mod common;

use common::{config, ids, post, reconciler, reconciler_with, ScriptedRepository};
use feed_loader::{FeedError, FeedPhase, MutationKind, RequestOutcome, SkipReason};
use post_client::{PostId, RepositoryError};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test]
async fn test_overlapping_pages_merge_then_exhaust() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("A"), post("B")]);
    repo.push_page(vec![post("B"), post("C")]);
    repo.push_page(vec![]);
    let feed = reconciler(&repo);

    assert_eq!(
        feed.request_more().await,
        RequestOutcome::Loaded {
            page_index: 0,
            received: 2,
            added: 2
        }
    );
    assert_eq!(
        feed.request_more().await,
        RequestOutcome::Loaded {
            page_index: 1,
            received: 2,
            added: 1
        }
    );
    assert_eq!(
        feed.request_more().await,
        RequestOutcome::Exhausted { page_index: 2 }
    );

    assert_eq!(ids(&feed.posts()), vec!["A", "B", "C"]);
    assert_eq!(feed.status().phase, FeedPhase::Exhausted);
    assert!(feed.view().exhausted);
    assert_eq!(repo.requested_pages(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_collection_never_holds_duplicate_ids() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("1"), post("2"), post("3")]);
    repo.push_page(vec![post("3"), post("1"), post("4")]);
    repo.push_page(vec![post("4"), post("4"), post("5")]);
    repo.push_page(vec![post("2"), post("5")]);
    let feed = reconciler(&repo);

    for _ in 0..4 {
        feed.request_more().await;
        let posts = feed.posts();
        let unique: HashSet<_> = posts.iter().map(|p| p.id.clone()).collect();
        assert_eq!(unique.len(), posts.len());
    }
    assert_eq!(ids(&feed.posts()), vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn test_exhaustion_is_terminal() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![]);
    repo.push_page(vec![post("late")]);
    let feed = reconciler(&repo);

    assert_eq!(
        feed.request_more().await,
        RequestOutcome::Exhausted { page_index: 0 }
    );
    for _ in 0..3 {
        assert_eq!(
            feed.request_more().await,
            RequestOutcome::Skipped(SkipReason::Exhausted)
        );
        assert!(feed.status().exhausted);
    }
    assert_eq!(repo.requested_pages(), vec![0]);
    assert!(feed.posts().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_collapse_into_one_fetch() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("A"), post("B")]);
    let gate = repo.gate_pages();
    let feed = reconciler(&repo);

    let (first, skipped) = tokio::join!(feed.request_more(), async {
        tokio::task::yield_now().await;
        assert!(feed.view().loading);
        assert_eq!(feed.status().phase, FeedPhase::Loading);

        let mut skipped = Vec::new();
        for _ in 0..5 {
            skipped.push(feed.request_more().await);
        }
        gate.add_permits(1);
        skipped
    });

    assert!(matches!(first, RequestOutcome::Loaded { added: 2, .. }));
    assert!(skipped
        .iter()
        .all(|o| *o == RequestOutcome::Skipped(SkipReason::InFlight)));
    assert_eq!(repo.requested_pages(), vec![0]);
    assert_eq!(repo.max_in_flight(), 1);
}

#[tokio::test]
async fn test_failed_fetch_retries_same_page_and_keeps_posts() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("A"), post("B")]);
    repo.push_page_error(RepositoryError::Server {
        status: 500,
        message: "boom".to_string(),
    });
    repo.push_page(vec![post("C")]);
    let feed = reconciler(&repo);

    feed.request_more().await;
    let failed = feed.request_more().await;
    assert!(matches!(
        failed,
        RequestOutcome::Failed {
            page_index: 1,
            error: FeedError::FetchFailure(_)
        }
    ));

    let view = feed.view();
    assert_eq!(ids(&view.posts), vec!["A", "B"]);
    assert!(view.error.is_some());
    assert_eq!(feed.status().next_page_index, 1);
    assert_eq!(feed.status().phase, FeedPhase::Error);

    let retried = feed.request_more().await;
    assert!(matches!(retried, RequestOutcome::Loaded { page_index: 1, .. }));
    assert_eq!(repo.requested_pages(), vec![0, 1, 1]);
    assert_eq!(ids(&feed.posts()), vec!["A", "B", "C"]);
    assert!(feed.view().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_backoff_window_skips_early_retries() {
    let repo = ScriptedRepository::new();
    repo.push_page_error(RepositoryError::Network("down".to_string()));
    repo.push_page_error(RepositoryError::Network("still down".to_string()));
    repo.push_page(vec![post("A")]);

    let mut config = config(2);
    config.retry_initial_backoff_ms = 1_000;
    config.retry_backoff_multiplier = 2.0;
    let feed = reconciler_with(&repo, &config);

    assert!(matches!(feed.request_more().await, RequestOutcome::Failed { .. }));
    assert_eq!(
        feed.request_more().await,
        RequestOutcome::Skipped(SkipReason::BackingOff)
    );
    assert_eq!(feed.retry_delay(), Duration::from_millis(1_000));

    tokio::time::advance(Duration::from_millis(1_001)).await;
    assert!(matches!(feed.request_more().await, RequestOutcome::Failed { .. }));
    assert_eq!(feed.retry_delay(), Duration::from_millis(2_000));

    tokio::time::advance(Duration::from_millis(1_500)).await;
    assert_eq!(
        feed.request_more().await,
        RequestOutcome::Skipped(SkipReason::BackingOff)
    );

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(matches!(feed.request_more().await, RequestOutcome::Loaded { .. }));
    assert_eq!(feed.retry_delay(), Duration::ZERO);
    assert_eq!(repo.requested_pages(), vec![0, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_page_timeout_is_a_fetch_failure() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("A")]);
    let _gate = repo.gate_pages();

    let mut config = config(2);
    config.request_timeout_ms = 50;
    let feed = reconciler_with(&repo, &config);

    match feed.request_more().await {
        RequestOutcome::Failed { page_index, error } => {
            assert_eq!(page_index, 0);
            assert!(error.to_string().contains("timed out"));
        }
        other => panic!("expected timeout failure, got {:?}", other),
    }
    assert!(!feed.status().in_flight);
    assert_eq!(feed.status().next_page_index, 0);
}

#[tokio::test]
async fn test_page_in_flight_cannot_resurrect_deleted_post() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("A"), post("B")]);
    let feed = reconciler(&repo);
    feed.request_more().await;

    repo.push_page(vec![post("B"), post("C")]);
    let gate = repo.gate_pages();

    let (loaded, deleted) = tokio::join!(feed.request_more(), async {
        tokio::task::yield_now().await;
        let outcome = feed
            .apply_optimistic(&PostId::new("B"), MutationKind::Delete)
            .await;
        gate.add_permits(1);
        outcome
    });

    assert!(deleted.is_ok());
    assert!(matches!(loaded, RequestOutcome::Loaded { page_index: 1, .. }));
    assert_eq!(ids(&feed.posts()), vec!["A", "C"]);
}

#[tokio::test]
async fn test_status_channel_follows_transitions() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("A")]);
    repo.push_page(vec![]);
    let feed = reconciler(&repo);
    let mut status = feed.subscribe();

    assert_eq!(status.borrow_and_update().phase, FeedPhase::Idle);

    feed.request_more().await;
    assert!(status.has_changed().unwrap());
    let current = status.borrow_and_update().clone();
    assert_eq!(current.phase, FeedPhase::Idle);
    assert_eq!(current.next_page_index, 1);
    assert_eq!(current.revision, 1);

    feed.request_more().await;
    assert!(status.borrow_and_update().exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_request_releases_the_cursor() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("A"), post("B")]);
    let gate = repo.gate_pages();
    let feed = reconciler(&repo);

    let abandoned = tokio::time::timeout(Duration::from_millis(10), feed.request_more()).await;
    assert!(abandoned.is_err());

    let status = feed.status();
    assert!(!status.in_flight);
    assert_eq!(status.phase, FeedPhase::Idle);
    assert_eq!(status.next_page_index, 0);
    assert!(!feed.view().loading);

    gate.add_permits(1);
    assert!(matches!(
        feed.request_more().await,
        RequestOutcome::Loaded {
            page_index: 0,
            added: 2,
            ..
        }
    ));
    assert_eq!(repo.requested_pages(), vec![0, 0]);
}

#[tokio::test]
async fn test_aborted_load_task_keeps_feed_usable() {
    let repo = ScriptedRepository::new();
    repo.push_page(vec![post("A")]);
    let gate = repo.gate_pages();
    let feed = reconciler(&repo);

    let task = tokio::spawn({
        let feed = feed.clone();
        async move { feed.request_more().await }
    });
    for _ in 0..10 {
        if feed.status().in_flight {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(feed.status().in_flight);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(!feed.status().in_flight);

    gate.add_permits(1);
    assert!(matches!(
        feed.request_more().await,
        RequestOutcome::Loaded { page_index: 0, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_waits_for_the_longest_delay() {
    let repo = ScriptedRepository::new();
    repo.push_page_error(RepositoryError::Auth("token expired".to_string()));

    let mut config = config(2);
    config.retry_initial_backoff_ms = 1_000;
    config.retry_max_backoff_ms = 5_000;
    let feed = reconciler_with(&repo, &config);

    assert!(matches!(feed.request_more().await, RequestOutcome::Failed { .. }));
    assert_eq!(feed.retry_delay(), Duration::from_millis(5_000));
    assert_eq!(
        feed.request_more().await,
        RequestOutcome::Skipped(SkipReason::BackingOff)
    );
}
