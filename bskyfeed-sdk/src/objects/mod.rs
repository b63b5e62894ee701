pub mod feed;
pub mod jetstream;
pub mod post;
pub mod user;

pub use feed::{
    DescribeFeedGeneratorResponse, DidDocument, DidService, FeedDescription, FeedSkeletonQuery,
    FeedSkeletonResponse, SkeletonFeedPost,
};
pub use jetstream::{Commit, CommitOperation, EventKind, JetstreamEvent};
pub use post::{POST_COLLECTION, PostRecord, ReplyRef, StrongRef};
pub use user::{BookmarkResponse, CreateBookmark, SubscriptionResponse};
