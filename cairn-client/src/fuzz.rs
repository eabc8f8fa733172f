#![cfg(test)]

use std::{
    collections::{BTreeSet, HashMap},
    panic::AssertUnwindSafe,
    sync::Arc,
};

use bolero::generator::TypeGenerator;
use cairn_mock_server::MockStore;

use crate::{
    api::{Author, CommentId, LiveStore, ReplyId, Time, TrailId, UserId},
    *,
};

macro_rules! do_tokio_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_generator($gen)
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn time(secs: u8) -> Option<Time> {
    use chrono::TimeZone;
    chrono::Utc
        .timestamp_opt(1_700_000_000 + i64::from(secs), 0)
        .single()
}

fn fuzz_author() -> Author {
    Author::new(UserId::from("u1"), String::from("Alice"))
}

fn fuzz_comment(id: u8) -> Comment {
    Comment {
        id: CommentId(format!("c{id}")),
        text: format!("comment {id}"),
        author: fuzz_author(),
        created_at: time(id),
        updated_at: None,
        likes: BTreeSet::new(),
        replies: Vec::new(),
    }
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum MergeOp {
    TopLevel(#[generator(bolero::generator::gen_with::<Vec<u8>>().len(0..8usize))] Vec<u8>),
    Replies {
        parent: u8,
        #[generator(bolero::generator::gen_with::<Vec<u8>>().len(0..8usize))]
        created: Vec<u8>,
    },
}

#[test]
fn merges_match_model() {
    bolero::check!()
        .with_generator(bolero::generator::gen_with::<Vec<MergeOp>>().len(1..50usize))
        .cloned()
        .for_each(|ops: Vec<MergeOp>| {
            let mut tree = CommentTree::default();
            let mut present = Vec::<u8>::new();
            let mut replies = HashMap::<u8, Vec<(String, u8)>>::new();
            for op in ops {
                let next = match &op {
                    MergeOp::TopLevel(ids) => {
                        present.clear();
                        for id in ids.iter().map(|i| i % 16) {
                            if !present.contains(&id) {
                                present.push(id);
                            }
                        }
                        replies.retain(|id, _| present.contains(id));
                        tree.merge_top_level(present.iter().map(|i| fuzz_comment(*i)).collect())
                    }
                    MergeOp::Replies { parent, created } => {
                        let parent = parent % 16;
                        let mut incoming = created
                            .iter()
                            .enumerate()
                            .map(|(i, c)| (format!("r{i}"), *c))
                            .collect::<Vec<_>>();
                        if present.contains(&parent) {
                            incoming.sort_by_key(|(_, c)| *c);
                            replies.insert(parent, incoming);
                        }
                        let parent_id = CommentId(format!("c{parent}"));
                        tree.merge_replies(
                            &parent_id,
                            created
                                .iter()
                                .enumerate()
                                .map(|(i, c)| Reply {
                                    id: ReplyId(format!("r{i}")),
                                    comment_id: parent_id.clone(),
                                    text: String::new(),
                                    author: fuzz_author(),
                                    created_at: time(*c),
                                    updated_at: None,
                                    likes: BTreeSet::new(),
                                })
                                .collect(),
                        )
                    }
                };

                // applying the same snapshot again changes nothing
                let again = match &op {
                    MergeOp::TopLevel(_) => {
                        next.merge_top_level(present.iter().map(|i| fuzz_comment(*i)).collect())
                    }
                    MergeOp::Replies { parent, .. } => {
                        let parent = CommentId(format!("c{}", parent % 16));
                        let current = next
                            .get(&parent)
                            .map(|c| c.replies.clone())
                            .unwrap_or_default();
                        next.merge_replies(&parent, current)
                    }
                };
                assert_eq!(next, again);
                tree = next;

                assert_eq!(
                    tree.ids(),
                    present
                        .iter()
                        .map(|i| CommentId(format!("c{i}")))
                        .collect::<Vec<_>>()
                );
                for id in present.iter() {
                    let got = tree
                        .get(&CommentId(format!("c{id}")))
                        .unwrap()
                        .replies
                        .iter()
                        .map(|r| (r.id.0.clone(), r.created_at))
                        .collect::<Vec<_>>();
                    let expected = replies
                        .get(id)
                        .map(|rs| rs.iter().map(|(r, c)| (r.clone(), time(*c))).collect())
                        .unwrap_or_else(Vec::new);
                    assert_eq!(got, expected);
                }
            }
        })
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum SyncOp {
    AddComment,
    AddReply { comment: u8 },
    EditComment { comment: u8 },
    EditReply { comment: u8, reply: u8 },
    DeleteComment { comment: u8 },
    DeleteReply { comment: u8, reply: u8 },
    Like { comment: u8 },
    LikeReply { comment: u8, reply: u8 },
    SwitchViewer,
    Process,
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
struct SyncTest {
    cascade: bool,
    #[generator(bolero::generator::gen_with::<Vec<SyncOp>>().len(1..60usize))]
    ops: Vec<SyncOp>,
}

struct SyncFuzzer {
    store: Arc<MockStore>,
    sync: CommentSync<MockStore>,
    mutations: Mutations<MockStore>,
    viewers: [Author; 2],
    viewer: usize,
}

impl SyncFuzzer {
    fn new(cascade: bool) -> SyncFuzzer {
        let store = Arc::new(MockStore::new());
        let config = SyncConfig {
            cascade_delete: match cascade {
                true => CascadePolicy::Delete,
                false => CascadePolicy::Orphan,
            },
            ..SyncConfig::default()
        };
        let trail = TrailId::from("t1");
        let viewers = [
            fuzz_author(),
            Author::new(UserId::from("u2"), String::from("Bob")),
        ];
        let mut sync = CommentSync::new(store.clone(), config.clone());
        sync.attach(trail.clone())
            .expect("attaching to the mock store");
        let mutations =
            Mutations::new(store.clone(), config, trail).with_viewer(viewers[0].clone());
        SyncFuzzer {
            store,
            sync,
            mutations,
            viewers,
            viewer: 0,
        }
    }

    /// Comments and replies as currently stored, in display order
    async fn ground_truth(&self) -> Vec<Comment> {
        let cfg = self.sync.config();
        let trail = self.mutations.trail();
        let docs = self
            .store
            .fetch(&cfg.comments_query(trail))
            .await
            .expect("fetching comments");
        let mut res = Vec::new();
        for doc in docs.iter() {
            let mut c = Comment::from_document(doc, cfg);
            c.replies = self
                .store
                .fetch(&cfg.replies_query(trail, &c.id))
                .await
                .expect("fetching replies")
                .iter()
                .map(|d| Reply::from_document(&c.id, d, cfg))
                .collect();
            res.push(c);
        }
        res
    }

    async fn pick_comment(&self, idx: u8) -> Option<Comment> {
        let comments = self.ground_truth().await;
        match comments.len() {
            0 => None,
            n => Some(comments[usize::from(idx) % n].clone()),
        }
    }

    async fn pick_reply(&self, comment: u8, reply: u8) -> Option<Reply> {
        let c = self.pick_comment(comment).await?;
        match c.replies.len() {
            0 => None,
            n => Some(c.replies[usize::from(reply) % n].clone()),
        }
    }

    async fn execute(&mut self, op: SyncOp) {
        let m = &self.mutations;
        let res = match op {
            SyncOp::AddComment => m.add_comment("Nice hike").await.map(|_| ()),
            SyncOp::AddReply { comment } => match self.pick_comment(comment).await {
                Some(c) => m.add_reply(&c.id, "Agreed").await.map(|_| ()),
                None => Ok(()),
            },
            SyncOp::EditComment { comment } => match self.pick_comment(comment).await {
                Some(c) => m.edit_comment(&c.id, "Nice hike (edited)").await,
                None => Ok(()),
            },
            SyncOp::EditReply { comment, reply } => match self.pick_reply(comment, reply).await {
                Some(r) => m.edit_reply(&r.comment_id, &r.id, "Agreed (edited)").await,
                None => Ok(()),
            },
            SyncOp::DeleteComment { comment } => match self.pick_comment(comment).await {
                Some(c) => m.delete_comment(&c.id).await,
                None => Ok(()),
            },
            SyncOp::DeleteReply { comment, reply } => {
                match self.pick_reply(comment, reply).await {
                    Some(r) => m.delete_reply(&r.comment_id, &r.id).await,
                    None => Ok(()),
                }
            }
            SyncOp::Like { comment } => match self.pick_comment(comment).await {
                Some(c) => m.toggle_like(&c.id, &c.likes).await.map(|_| ()),
                None => Ok(()),
            },
            SyncOp::LikeReply { comment, reply } => match self.pick_reply(comment, reply).await {
                Some(r) => m
                    .toggle_reply_like(&r.comment_id, &r.id, &r.likes)
                    .await
                    .map(|_| ()),
                None => Ok(()),
            },
            SyncOp::SwitchViewer => {
                self.viewer = 1 - self.viewer;
                self.mutations
                    .set_viewer(Some(self.viewers[self.viewer].clone()));
                Ok(())
            }
            SyncOp::Process => {
                self.sync.process_pending();
                Ok(())
            }
        };
        if let Err(e) = res {
            panic!("got unexpected error: {e}");
        }
    }

    async fn check(&mut self) {
        for event in self.sync.process_pending() {
            assert!(
                !matches!(event, SyncEvent::SubscriptionFailed { .. }),
                "unexpected event {event:?}"
            );
        }
        let expected = self.ground_truth().await;
        let tree = self.sync.tree();
        let got = tree.comments().iter().map(|c| (**c).clone()).collect::<Vec<_>>();
        assert_eq!(got, expected);

        let mut subscribed = self
            .sync
            .registry()
            .reply_subscriptions()
            .cloned()
            .collect::<Vec<_>>();
        subscribed.sort();
        let mut ids = tree.ids();
        ids.sort();
        assert_eq!(subscribed, ids);
        assert_eq!(self.store.test_num_feeds(), 1 + tree.len());
    }
}

do_tokio_test!(
    sync_converges_to_store,
    bolero::generator::gen::<SyncTest>(),
    |test: SyncTest| async move {
        let mut fuzzer = SyncFuzzer::new(test.cascade);
        for op in test.ops {
            fuzzer.execute(op).await;
        }
        fuzzer.check().await;
        fuzzer.sync.detach();
        assert_eq!(fuzzer.store.test_num_feeds(), 0);
    }
);
