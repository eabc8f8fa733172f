use std::collections::HashMap;

use crate::{
    api::{CommentId, LiveStore, ReplyId},
    Comment, CommentTree, Error, Mutations, Reply, SyncConfig,
};

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum EditTarget {
    Comment(CommentId),
    Reply(CommentId, ReplyId),
}

/// Drafts and edit modes of one viewer's session on a trail's comments
#[derive(Clone, Debug, Default)]
pub struct EditState {
    pub new_comment: String,
    replying_to: Option<CommentId>,
    reply_drafts: HashMap<CommentId, String>,
    editing_comment: Option<CommentId>,
    editing_reply: Option<(CommentId, ReplyId)>,
    edit_drafts: HashMap<EditTarget, String>,

    /// At most one comment or reply in edit mode at once, instead of one of each
    exclusive: bool,
}

impl EditState {
    pub fn new(config: &SyncConfig) -> EditState {
        EditState {
            exclusive: config.exclusive_edit,
            ..EditState::default()
        }
    }

    pub fn replying_to(&self) -> Option<&CommentId> {
        self.replying_to.as_ref()
    }

    /// Opens the reply box of `comment`, or closes it if it already was open
    pub fn toggle_reply_to(&mut self, comment: &CommentId) {
        self.replying_to = match self.replying_to.as_ref() == Some(comment) {
            true => None,
            false => Some(comment.clone()),
        };
    }

    pub fn reply_draft(&self, comment: &CommentId) -> &str {
        self.reply_drafts
            .get(comment)
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn set_reply_draft(&mut self, comment: &CommentId, text: String) {
        self.reply_drafts.insert(comment.clone(), text);
    }

    pub fn editing_comment(&self) -> Option<&CommentId> {
        self.editing_comment.as_ref()
    }

    pub fn editing_reply(&self) -> Option<(&CommentId, &ReplyId)> {
        self.editing_reply.as_ref().map(|(c, r)| (c, r))
    }

    pub fn is_editing(&self, target: &EditTarget) -> bool {
        match target {
            EditTarget::Comment(c) => self.editing_comment.as_ref() == Some(c),
            EditTarget::Reply(c, r) => {
                self.editing_reply.as_ref().map(|(ec, er)| (ec, er)) == Some((c, r))
            }
        }
    }

    pub fn edit_draft(&self, target: &EditTarget) -> Option<&str> {
        self.edit_drafts.get(target).map(|s| s.as_str())
    }

    pub fn set_edit_draft(&mut self, target: EditTarget, text: String) {
        self.edit_drafts.insert(target, text);
    }

    /// Enters edit mode on `comment`, with its current text as the draft
    pub fn start_edit_comment(&mut self, comment: &Comment) {
        if self.exclusive {
            self.cancel_edit_reply();
        }
        self.cancel_edit_comment();
        self.editing_comment = Some(comment.id.clone());
        self.edit_drafts.insert(
            EditTarget::Comment(comment.id.clone()),
            comment.text.clone(),
        );
    }

    pub fn start_edit_reply(&mut self, reply: &Reply) {
        if self.exclusive {
            self.cancel_edit_comment();
        }
        self.cancel_edit_reply();
        self.editing_reply = Some((reply.comment_id.clone(), reply.id.clone()));
        self.edit_drafts.insert(
            EditTarget::Reply(reply.comment_id.clone(), reply.id.clone()),
            reply.text.clone(),
        );
    }

    pub fn cancel_edit_comment(&mut self) {
        if let Some(c) = self.editing_comment.take() {
            self.edit_drafts.remove(&EditTarget::Comment(c));
        }
    }

    pub fn cancel_edit_reply(&mut self) {
        if let Some((c, r)) = self.editing_reply.take() {
            self.edit_drafts.remove(&EditTarget::Reply(c, r));
        }
    }

    /// Forgets everything about comments and replies that are no longer in `tree`
    pub fn prune(&mut self, tree: &CommentTree) {
        if let Some(c) = &self.replying_to {
            if tree.get(c).is_none() {
                self.replying_to = None;
            }
        }
        self.reply_drafts.retain(|c, _| tree.get(c).is_some());
        if let Some(c) = &self.editing_comment {
            if tree.get(c).is_none() {
                self.editing_comment = None;
            }
        }
        if let Some((c, r)) = &self.editing_reply {
            if tree.reply(c, r).is_none() {
                self.editing_reply = None;
            }
        }
        self.edit_drafts.retain(|t, _| match t {
            EditTarget::Comment(c) => tree.get(c).is_some(),
            EditTarget::Reply(c, r) => tree.reply(c, r).is_some(),
        });
    }

    /// Posts the new comment draft, clearing it once written. A blank draft
    /// writes nothing and is kept as-is.
    pub async fn submit_comment<S: LiveStore>(
        &mut self,
        m: &Mutations<S>,
    ) -> Result<Option<CommentId>, Error> {
        let res = m.add_comment(&self.new_comment).await?;
        if res.is_some() {
            self.new_comment.clear();
        }
        Ok(res)
    }

    /// Posts the reply draft of `comment`, then closes its reply box. A blank
    /// draft leaves the box open.
    pub async fn submit_reply<S: LiveStore>(
        &mut self,
        m: &Mutations<S>,
        comment: &CommentId,
    ) -> Result<Option<ReplyId>, Error> {
        let res = m.add_reply(comment, self.reply_draft(comment)).await?;
        if res.is_some() {
            self.reply_drafts.remove(comment);
            if self.replying_to.as_ref() == Some(comment) {
                self.replying_to = None;
            }
        }
        Ok(res)
    }

    /// Saves the comment being edited, leaving edit mode on success. Does
    /// nothing if no comment is being edited.
    pub async fn save_comment_edit<S: LiveStore>(
        &mut self,
        m: &Mutations<S>,
    ) -> Result<(), Error> {
        let Some(comment) = self.editing_comment.clone() else {
            return Ok(());
        };
        let target = EditTarget::Comment(comment.clone());
        let text = self.edit_draft(&target).unwrap_or("").to_owned();
        m.edit_comment(&comment, &text).await?;
        self.cancel_edit_comment();
        Ok(())
    }

    pub async fn save_reply_edit<S: LiveStore>(&mut self, m: &Mutations<S>) -> Result<(), Error> {
        let Some((comment, reply)) = self.editing_reply.clone() else {
            return Ok(());
        };
        let target = EditTarget::Reply(comment.clone(), reply.clone());
        let text = self.edit_draft(&target).unwrap_or("").to_owned();
        m.edit_reply(&comment, &reply, &text).await?;
        self.cancel_edit_reply();
        Ok(())
    }
}
