use std::{collections::BTreeSet, sync::Arc};

use crate::{
    api::{self, Author, CommentId, DocPath, LiveStore, ReplyId, TrailId, UserId},
    CascadePolicy, Error, SyncConfig,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LikeChange {
    Added,
    Removed,
}

/// Turns user actions on a trail's comments into store writes.
///
/// Nothing here touches a `CommentTree`: writes become visible once the live
/// queries deliver them.
pub struct Mutations<S: LiveStore> {
    store: Arc<S>,
    config: SyncConfig,
    trail: TrailId,
    viewer: Option<Author>,
}

impl<S: LiveStore> Clone for Mutations<S> {
    fn clone(&self) -> Mutations<S> {
        Mutations {
            store: self.store.clone(),
            config: self.config.clone(),
            trail: self.trail.clone(),
            viewer: self.viewer.clone(),
        }
    }
}

/// Trimmed text, or `None` if there is nothing to write
fn submitted_text(text: &str) -> Result<Option<&str>, Error> {
    match api::normalize_text(text) {
        None => Ok(None),
        Some(text) => {
            api::validate_string(text).map_err(|e| Error::Validation(e.to_string()))?;
            Ok(Some(text))
        }
    }
}

fn edited_text(text: &str) -> Result<&str, Error> {
    submitted_text(text)?.ok_or_else(|| Error::Validation(String::from("text cannot be empty")))
}

impl<S: LiveStore> Mutations<S> {
    pub fn new(store: Arc<S>, config: SyncConfig, trail: TrailId) -> Mutations<S> {
        Mutations {
            store,
            config,
            trail,
            viewer: None,
        }
    }

    pub fn with_viewer(mut self, viewer: Author) -> Mutations<S> {
        self.viewer = Some(viewer);
        self
    }

    pub fn set_viewer(&mut self, viewer: Option<Author>) {
        self.viewer = viewer;
    }

    pub fn viewer(&self) -> Option<&Author> {
        self.viewer.as_ref()
    }

    pub fn trail(&self) -> &TrailId {
        &self.trail
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn can_comment(&self) -> bool {
        self.viewer.is_some()
    }

    pub fn can_reply(&self) -> bool {
        self.viewer.is_some()
    }

    pub fn can_edit(&self, author: &Author) -> bool {
        self.viewer
            .as_ref()
            .map(|v| v.id == author.id)
            .unwrap_or(false)
    }

    fn signed_in(&self) -> Result<&Author, Error> {
        self.viewer.as_ref().ok_or(Error::Unauthenticated)
    }

    fn comment_doc(&self, comment: &CommentId) -> DocPath {
        self.config.comment_doc(&self.trail, comment)
    }

    fn reply_doc(&self, comment: &CommentId, reply: &ReplyId) -> DocPath {
        self.config.reply_doc(&self.trail, comment, reply)
    }

    /// Returns `None` without writing anything if `text` is blank
    pub async fn add_comment(&self, text: &str) -> Result<Option<CommentId>, Error> {
        let Some(text) = submitted_text(text)? else {
            return Ok(None);
        };
        let author = self.signed_in()?;
        let id = self
            .store
            .add_document(
                &self.config.comments_path(&self.trail),
                api::new_comment_writes(text, author),
            )
            .await
            .map_err(|e| Error::remote_write("adding comment", e))?;
        tracing::debug!(comment=%id, "added comment");
        Ok(Some(CommentId(id)))
    }

    /// Returns `None` without writing anything if `text` is blank
    pub async fn add_reply(
        &self,
        comment: &CommentId,
        text: &str,
    ) -> Result<Option<ReplyId>, Error> {
        let Some(text) = submitted_text(text)? else {
            return Ok(None);
        };
        let author = self.signed_in()?;
        let id = self
            .store
            .add_document(
                &self.config.replies_path(&self.trail, comment),
                api::new_reply_writes(text, author),
            )
            .await
            .map_err(|e| Error::remote_write("adding reply", e))?;
        tracing::debug!(%comment, reply=%id, "added reply");
        Ok(Some(ReplyId(id)))
    }

    pub async fn edit_comment(&self, comment: &CommentId, text: &str) -> Result<(), Error> {
        let text = edited_text(text)?;
        self.store
            .update_document(&self.comment_doc(comment), api::edit_writes(text))
            .await
            .map_err(|e| Error::remote_write("editing comment", e))
    }

    pub async fn edit_reply(
        &self,
        comment: &CommentId,
        reply: &ReplyId,
        text: &str,
    ) -> Result<(), Error> {
        let text = edited_text(text)?;
        self.store
            .update_document(&self.reply_doc(comment, reply), api::edit_writes(text))
            .await
            .map_err(|e| Error::remote_write("editing reply", e))
    }

    /// Depending on the cascade policy, replies are either left in the store
    /// or deleted before the comment itself. The cascade lists the whole reply
    /// collection, so replies lacking the order field are deleted too.
    pub async fn delete_comment(&self, comment: &CommentId) -> Result<(), Error> {
        if self.config.cascade_delete == CascadePolicy::Delete {
            let replies = self
                .store
                .list(&self.config.replies_path(&self.trail, comment))
                .await
                .map_err(|e| Error::remote_write("listing replies to delete", e))?;
            for r in replies {
                self.store
                    .delete_document(&self.reply_doc(comment, &ReplyId(r.id)))
                    .await
                    .map_err(|e| Error::remote_write("deleting reply", e))?;
            }
        }
        self.store
            .delete_document(&self.comment_doc(comment))
            .await
            .map_err(|e| Error::remote_write("deleting comment", e))
    }

    pub async fn delete_reply(&self, comment: &CommentId, reply: &ReplyId) -> Result<(), Error> {
        self.store
            .delete_document(&self.reply_doc(comment, reply))
            .await
            .map_err(|e| Error::remote_write("deleting reply", e))
    }

    async fn toggle_like_on(
        &self,
        doc: DocPath,
        current_likes: &BTreeSet<UserId>,
    ) -> Result<LikeChange, Error> {
        let viewer = self.signed_in()?;
        let like = !current_likes.contains(&viewer.id);
        self.store
            .update_document(&doc, api::like_writes(&viewer.id, like))
            .await
            .map_err(|e| Error::remote_write("toggling like", e))?;
        Ok(match like {
            true => LikeChange::Added,
            false => LikeChange::Removed,
        })
    }

    /// Likes the comment if the viewer is not among `current_likes`, unlikes it
    /// otherwise
    pub async fn toggle_like(
        &self,
        comment: &CommentId,
        current_likes: &BTreeSet<UserId>,
    ) -> Result<LikeChange, Error> {
        self.toggle_like_on(self.comment_doc(comment), current_likes)
            .await
    }

    pub async fn toggle_reply_like(
        &self,
        comment: &CommentId,
        reply: &ReplyId,
        current_likes: &BTreeSet<UserId>,
    ) -> Result<LikeChange, Error> {
        self.toggle_like_on(self.reply_doc(comment, reply), current_likes)
            .await
    }
}
