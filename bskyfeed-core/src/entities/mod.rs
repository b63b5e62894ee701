//! Database entities and the store commands that operate on them.
//!
//! Each command is a plain struct implementing
//! `Processor<Command> for DatabaseProcessor`; errors are raw `sqlx::Error`
//! and get their operation context in [`crate::store`].

pub mod bookmark;
pub mod bookmark_reply;
pub mod feed_post;
pub mod subscription;

pub use bookmark::{Bookmark, BookmarkInsert};
pub use bookmark_reply::{BookmarkReply, BookmarkReplyInsert};
pub use feed_post::{FeedPost, FeedPostInsert};
pub use subscription::Subscription;
