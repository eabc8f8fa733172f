use std::{cmp::Ordering, sync::Arc};

use crate::{
    api::{CommentId, OrderType, ReplyId, Time},
    Comment, Reply,
};

/// Comments of one trail together with their replies, as last observed
///
/// Merging never mutates a tree in place: each merge returns a new tree, and
/// comments left untouched by the merge are shared with the previous one.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct CommentTree {
    comments: Vec<Arc<Comment>>,

    #[serde(skip)]
    direction: OrderType,
}

/// Orders by creation date in `direction`, with not-yet-timestamped entries last
fn by_creation(direction: OrderType, a: Option<Time>, b: Option<Time>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            OrderType::Asc => a.cmp(&b),
            OrderType::Desc => b.cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl CommentTree {
    pub fn new(direction: OrderType) -> CommentTree {
        CommentTree {
            comments: Vec::new(),
            direction,
        }
    }

    pub fn comments(&self) -> &[Arc<Comment>] {
        &self.comments
    }

    pub fn ids(&self) -> Vec<CommentId> {
        self.comments.iter().map(|c| c.id.clone()).collect()
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == *id).map(|c| &**c)
    }

    pub fn reply(&self, comment: &CommentId, reply: &ReplyId) -> Option<&Reply> {
        self.get(comment).and_then(|c| c.reply(reply))
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Replaces the comment list with `incoming`, in the order it was given.
    ///
    /// Comment lists never carry replies, so any comment already known keeps
    /// the replies it had unless `incoming` explicitly brings some.
    pub fn merge_top_level(&self, incoming: Vec<Comment>) -> CommentTree {
        let comments = incoming
            .into_iter()
            .map(|mut c| {
                let existing = self.comments.iter().find(|e| e.id == c.id);
                if let Some(existing) = existing {
                    if c.replies.is_empty() {
                        c.replies = existing.replies.clone();
                    }
                    if **existing == c {
                        return existing.clone();
                    }
                }
                Arc::new(c)
            })
            .collect();
        CommentTree {
            comments,
            direction: self.direction,
        }
    }

    /// Replaces the replies of `parent` with `incoming`, sorted by creation date.
    ///
    /// Replies belonging to another comment are dropped. Does nothing if
    /// `parent` is not in the tree, so that a late reply snapshot cannot bring
    /// a deleted comment back.
    pub fn merge_replies(&self, parent: &CommentId, incoming: Vec<Reply>) -> CommentTree {
        let mut res = self.clone();
        let Some(idx) = self.comments.iter().position(|c| c.id == *parent) else {
            return res;
        };
        let mut replies = incoming
            .into_iter()
            .filter(|r| r.comment_id == *parent)
            .collect::<Vec<_>>();
        replies.sort_by(|a, b| by_creation(self.direction, a.created_at, b.created_at));
        if res.comments[idx].replies != replies {
            Arc::make_mut(&mut res.comments[idx]).replies = replies;
        }
        res
    }
}
