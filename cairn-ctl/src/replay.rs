use std::sync::Arc;

use anyhow::{anyhow, Context};
use cairn_client::{
    api::{Author, TrailId, UserId},
    Comment, CommentSync, CommentTree, Mutations, Reply, SyncConfig,
};
use cairn_mock_server::MockStore;

/// One user action of a script. Comments and replies are designated by their
/// position in the comment tree as it is when the step runs.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    SignIn {
        uid: String,
        name: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    SignOut,
    AddComment {
        text: String,
    },
    AddReply {
        comment: usize,
        text: String,
    },
    EditComment {
        comment: usize,
        text: String,
    },
    EditReply {
        comment: usize,
        reply: usize,
        text: String,
    },
    DeleteComment {
        comment: usize,
    },
    DeleteReply {
        comment: usize,
        reply: usize,
    },
    Like {
        comment: usize,
    },
    LikeReply {
        comment: usize,
        reply: usize,
    },
}

/// Parses one JSON step per line, skipping blank lines
pub fn parse_script(script: &str) -> anyhow::Result<Vec<Step>> {
    script
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l).with_context(|| format!("parsing step on line {}", i + 1))
        })
        .collect()
}

pub struct Session {
    sync: CommentSync<MockStore>,
    mutations: Mutations<MockStore>,
}

fn comment_at(tree: &CommentTree, idx: usize) -> anyhow::Result<&Comment> {
    tree.comments()
        .get(idx)
        .map(|c| &**c)
        .ok_or_else(|| anyhow!("no comment at index {idx}"))
}

fn reply_at(tree: &CommentTree, comment: usize, idx: usize) -> anyhow::Result<&Reply> {
    comment_at(tree, comment)?
        .replies
        .get(idx)
        .ok_or_else(|| anyhow!("no reply at index {idx} of comment {comment}"))
}

impl Session {
    pub fn new(
        store: Arc<MockStore>,
        config: SyncConfig,
        trail: TrailId,
    ) -> anyhow::Result<Session> {
        let mut sync = CommentSync::new(store.clone(), config.clone());
        sync.attach(trail.clone())
            .with_context(|| format!("following trail {trail}"))?;
        sync.process_pending();
        Ok(Session {
            sync,
            mutations: Mutations::new(store, config, trail),
        })
    }

    pub fn tree(&self) -> Arc<CommentTree> {
        self.sync.tree()
    }

    pub fn process(&mut self) {
        for event in self.sync.process_pending() {
            tracing::debug!(?event, "processed delivery");
        }
    }

    /// Runs every step, logging and skipping those that fail
    pub async fn run(&mut self, steps: Vec<Step>) {
        for (i, step) in steps.into_iter().enumerate() {
            if let Err(err) = self.step(step).await {
                tracing::warn!(?err, step = i + 1, "step failed");
            }
            self.process();
        }
    }

    pub async fn step(&mut self, step: Step) -> anyhow::Result<()> {
        let tree = self.sync.tree();
        let m = &self.mutations;
        match step {
            Step::SignIn { uid, name, avatar } => {
                let mut author = Author::new(UserId(uid), name);
                author.avatar_url = avatar;
                self.mutations.set_viewer(Some(author));
            }
            Step::SignOut => self.mutations.set_viewer(None),
            Step::AddComment { text } => {
                m.add_comment(&text).await?;
            }
            Step::AddReply { comment, text } => {
                let c = comment_at(&tree, comment)?;
                m.add_reply(&c.id, &text).await?;
            }
            Step::EditComment { comment, text } => {
                let c = comment_at(&tree, comment)?;
                m.edit_comment(&c.id, &text).await?;
            }
            Step::EditReply {
                comment,
                reply,
                text,
            } => {
                let r = reply_at(&tree, comment, reply)?;
                m.edit_reply(&r.comment_id, &r.id, &text).await?;
            }
            Step::DeleteComment { comment } => {
                let c = comment_at(&tree, comment)?;
                m.delete_comment(&c.id).await?;
            }
            Step::DeleteReply { comment, reply } => {
                let r = reply_at(&tree, comment, reply)?;
                m.delete_reply(&r.comment_id, &r.id).await?;
            }
            Step::Like { comment } => {
                let c = comment_at(&tree, comment)?;
                m.toggle_like(&c.id, &c.likes).await?;
            }
            Step::LikeReply { comment, reply } => {
                let r = reply_at(&tree, comment, reply)?;
                m.toggle_reply_like(&r.comment_id, &r.id, &r.likes).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cairn_client::Post;

    use super::*;

    const SCRIPT: &str = r#"
        {"op": "add-comment", "text": "nobody is signed in yet"}
        {"op": "sign-in", "uid": "u1", "name": "Alice"}
        {"op": "add-comment", "text": "Great trail!"}
        {"op": "add-comment", "text": "   "}
        {"op": "sign-in", "uid": "u2", "name": "Bob", "avatar": "bob.png"}
        {"op": "add-reply", "comment": 0, "text": "Thanks!"}
        {"op": "like", "comment": 0}
        {"op": "like-reply", "comment": 0, "reply": 0}
        {"op": "edit-comment", "comment": 0, "text": ""}
        {"op": "edit-reply", "comment": 0, "reply": 0, "text": "Thanks a lot!"}
        {"op": "add-comment", "text": "Muddy after the rain"}
        {"op": "delete-comment", "comment": 1}
        {"op": "delete-reply", "comment": 5, "reply": 0}
        {"op": "sign-out"}
    "#;

    #[test]
    fn scripts_parse() {
        let steps = parse_script(SCRIPT).unwrap();
        assert_eq!(steps.len(), 14);
        assert_eq!(
            steps[4],
            Step::SignIn {
                uid: String::from("u2"),
                name: String::from("Bob"),
                avatar: Some(String::from("bob.png")),
            }
        );
        assert_eq!(steps[13], Step::SignOut);
        let err = parse_script("{\"op\": \"add-comment\"}\n\n{\"op\": \"fly\"}").unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));
    }

    #[tokio::test]
    async fn replay_skips_failed_steps() {
        let store = Arc::new(MockStore::new());
        let mut session =
            Session::new(store, SyncConfig::default(), TrailId::from("demo")).unwrap();
        session.run(parse_script(SCRIPT).unwrap()).await;

        let tree = session.tree();
        assert_eq!(tree.len(), 1);
        let c = &tree.comments()[0];
        assert_eq!(c.text, "Great trail!");
        assert!(!c.is_edited());
        assert!(c.is_liked_by(&UserId::from("u2")));
        assert_eq!(c.replies.len(), 1);
        let r = &c.replies[0];
        assert_eq!(r.text, "Thanks a lot!");
        assert!(r.is_edited());
        assert_eq!(r.author.avatar_url.as_deref(), Some("bob.png"));
        assert_eq!(r.like_count(), 1);
        assert!(session.mutations.viewer().is_none());
    }
}
