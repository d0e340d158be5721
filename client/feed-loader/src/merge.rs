//! Dedup merge of fetched pages into the feed collection

use post_client::{Post, PostId};
use std::collections::HashSet;

/// Append `incoming` to `existing`, dropping posts whose id is already present
///
/// `existing` keeps its order and contents. Surviving incoming posts keep
/// their page order. Ids repeated within `incoming` are kept once.
pub fn merge(existing: Vec<Post>, incoming: Vec<Post>) -> Vec<Post> {
    if incoming.is_empty() {
        return existing;
    }

    let mut seen: HashSet<PostId> = existing.iter().map(|p| p.id.clone()).collect();
    let mut merged = existing;
    merged.reserve(incoming.len());

    for post in incoming {
        if seen.insert(post.id.clone()) {
            merged.push(post);
        }
    }

    merged
}
