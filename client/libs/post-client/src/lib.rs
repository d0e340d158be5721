//! Post repository client
//!
//! Typed access to the remote post API used by the channel feed: page
//! listing, post detail, delete, like/unlike and comments. The
//! [`PostRepository`] trait is the seam the feed core depends on;
//! [`HttpPostRepository`] is the REST implementation.

pub mod error;
pub mod http;
pub mod models;
pub mod repository;

pub use error::{RepositoryError, Result};
pub use http::HttpPostRepository;
pub use models::{
    AuthToken, Author, ChannelId, Comment, CommentId, Like, LikeId, LikeReceipt, PageRequest,
    Post, PostId, UserId,
};
pub use repository::PostRepository;
