mod comment;
pub use comment::{Comment, Post, Reply};

mod config;
pub use config::{CascadePolicy, SyncConfig};

mod edit;
pub use edit::{EditState, EditTarget};

mod error;
pub use error::Error;

mod mutation;
pub use mutation::{LikeChange, Mutations};

mod registry;
pub use registry::{Delivery, FeedSource, SubscriptionRegistry};

mod sync;
pub use sync::{CommentSync, SyncEvent, SyncHandle};

mod tree;
pub use tree::CommentTree;

mod fuzz;

pub mod api {
    pub use cairn_api::*;
}

pub mod prelude {
    pub use crate::Post;
}
