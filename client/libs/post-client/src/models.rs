//! Wire models for the post REST API
//!
//! The server speaks Mongo-style JSON: identities live in `_id` and
//! attributes are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Opaque post identity, immutable for the post's lifetime
    PostId
);
string_id!(UserId);
string_id!(LikeId);
string_id!(CommentId);
string_id!(ChannelId);

/// Bearer token handed in by the session collaborator
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(rename = "fullName", alias = "name", default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: CommentId,
    pub author: Author,
    #[serde(rename = "comment")]
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of a post's like set
///
/// `id` is `None` while the like exists only locally and the server has not
/// yet assigned an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LikeId>,
    pub user: UserId,
}

impl Like {
    pub fn provisional(user: UserId) -> Self {
        Self { id: None, user }
    }

    pub fn is_provisional(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: PostId,
    pub title: String,
    pub author: Author,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub likes: Vec<Like>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Number of likes implied by the current like set
    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn like_by(&self, user: &UserId) -> Option<&Like> {
        self.likes.iter().find(|like| &like.user == user)
    }

    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.like_by(user).is_some()
    }

    /// First comment text, shown as the card body
    pub fn excerpt(&self) -> &str {
        self.comments
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or_default()
    }
}

/// Server answer to a like call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeReceipt {
    #[serde(rename = "_id")]
    pub like_id: LikeId,
    #[serde(default)]
    pub like_count: Option<u64>,
}

/// One page of a channel listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub channel_id: ChannelId,
    pub page_index: u32,
    pub page_size: u32,
}
