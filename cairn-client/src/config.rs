use crate::api::{
    self, CollectionPath, CommentId, DocPath, OrderType, Query, ReplyId, TrailId,
};

/// What happens to the replies of a deleted comment
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadePolicy {
    /// Replies stay in the store, unreachable from the comment list
    #[default]
    Orphan,

    /// Replies are deleted one by one before their comment
    Delete,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncConfig {
    pub trails_collection: String,
    pub comments_collection: String,
    pub replies_collection: String,
    pub order_by: String,
    pub direction: OrderType,
    pub cascade_delete: CascadePolicy,

    /// Display name of authors whose document lacks one
    pub anonymous_name: String,

    /// Only let a single comment or reply be edited at a time
    pub exclusive_edit: bool,
}

impl Default for SyncConfig {
    fn default() -> SyncConfig {
        SyncConfig {
            trails_collection: String::from("trails"),
            comments_collection: String::from("comments"),
            replies_collection: String::from("replies"),
            order_by: String::from(api::field::CREATED_AT),
            direction: OrderType::Asc,
            cascade_delete: CascadePolicy::Orphan,
            anonymous_name: String::from("Anonymous"),
            exclusive_edit: false,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), api::Error> {
        let path = format!(
            "{}/t/{}/c/{}",
            self.trails_collection, self.comments_collection, self.replies_collection
        );
        CollectionPath::parse(&path)?;
        api::validate_string(&self.order_by)?;
        if self.order_by.is_empty() {
            return Err(api::Error::InvalidPath(self.order_by.clone()));
        }
        Ok(())
    }

    pub fn comments_path(&self, trail: &TrailId) -> CollectionPath {
        CollectionPath::root(&self.trails_collection)
            .doc(trail.as_str())
            .subcollection(&self.comments_collection)
    }

    pub fn comment_doc(&self, trail: &TrailId, comment: &CommentId) -> DocPath {
        self.comments_path(trail).doc(comment.as_str())
    }

    pub fn replies_path(&self, trail: &TrailId, comment: &CommentId) -> CollectionPath {
        self.comment_doc(trail, comment)
            .subcollection(&self.replies_collection)
    }

    pub fn reply_doc(&self, trail: &TrailId, comment: &CommentId, reply: &ReplyId) -> DocPath {
        self.replies_path(trail, comment).doc(reply.as_str())
    }

    pub fn comments_query(&self, trail: &TrailId) -> Query {
        Query::ordered(self.comments_path(trail), &self.order_by, self.direction)
    }

    pub fn replies_query(&self, trail: &TrailId, comment: &CommentId) -> Query {
        Query::ordered(
            self.replies_path(trail, comment),
            &self.order_by,
            self.direction,
        )
    }
}
