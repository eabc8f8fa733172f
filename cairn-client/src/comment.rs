use std::collections::BTreeSet;

use crate::{
    api::{field, Author, CommentId, Document, ReplyId, Time, UserId},
    SyncConfig,
};

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub author: Author,

    /// Set by the store on creation; absent until the write is acknowledged
    pub created_at: Option<Time>,

    /// Present only once the comment was edited at least once
    pub updated_at: Option<Time>,

    pub likes: BTreeSet<UserId>,

    /// Filled in by the comment's own reply subscription, never by the
    /// comment list
    pub replies: Vec<Reply>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct Reply {
    pub id: ReplyId,
    pub comment_id: CommentId,
    pub text: String,
    pub author: Author,
    pub created_at: Option<Time>,
    pub updated_at: Option<Time>,
    pub likes: BTreeSet<UserId>,
}

fn author_from(doc: &Document, cfg: &SyncConfig) -> Author {
    Author {
        id: UserId::from(doc.get_str(field::AUTHOR_UID).unwrap_or("")),
        name: String::from(
            doc.get_str(field::AUTHOR_NAME)
                .unwrap_or(cfg.anonymous_name.as_str()),
        ),
        avatar_url: doc.get_str(field::PHOTO_URL).map(String::from),
    }
}

fn likes_from(doc: &Document) -> BTreeSet<UserId> {
    doc.get_strings(field::LIKES)
        .into_iter()
        .map(UserId::from)
        .collect()
}

impl Comment {
    /// Decodes a comment document, filling in defaults for missing fields
    pub fn from_document(doc: &Document, cfg: &SyncConfig) -> Comment {
        Comment {
            id: CommentId(doc.id.clone()),
            text: String::from(doc.get_str(field::TEXT).unwrap_or("")),
            author: author_from(doc, cfg),
            created_at: doc.get_time(field::CREATED_AT),
            updated_at: doc.get_time(field::UPDATED_AT),
            likes: likes_from(doc),
            replies: Vec::new(),
        }
    }

    pub fn reply(&self, id: &ReplyId) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == *id)
    }
}

impl Reply {
    pub fn from_document(comment_id: &CommentId, doc: &Document, cfg: &SyncConfig) -> Reply {
        Reply {
            id: ReplyId(doc.id.clone()),
            comment_id: comment_id.clone(),
            text: String::from(doc.get_str(field::TEXT).unwrap_or("")),
            author: author_from(doc, cfg),
            created_at: doc.get_time(field::CREATED_AT),
            updated_at: doc.get_time(field::UPDATED_AT),
            likes: likes_from(doc),
        }
    }
}

/// What comments and replies have in common
pub trait Post {
    fn text(&self) -> &str;
    fn author(&self) -> &Author;
    fn created_at(&self) -> Option<Time>;
    fn updated_at(&self) -> Option<Time>;
    fn likes(&self) -> &BTreeSet<UserId>;

    fn is_edited(&self) -> bool {
        self.updated_at().is_some()
    }

    fn is_liked_by(&self, user: &UserId) -> bool {
        self.likes().contains(user)
    }

    fn like_count(&self) -> usize {
        self.likes().len()
    }
}

macro_rules! impl_post {
    ( $($t:ty),* ) => {
        $(
            impl Post for $t {
                fn text(&self) -> &str {
                    &self.text
                }

                fn author(&self) -> &Author {
                    &self.author
                }

                fn created_at(&self) -> Option<Time> {
                    self.created_at
                }

                fn updated_at(&self) -> Option<Time> {
                    self.updated_at
                }

                fn likes(&self) -> &BTreeSet<UserId> {
                    &self.likes
                }
            }
        )*
    };
}

impl_post!(Comment, Reply);
