use std::sync::Arc;

use futures::{channel::oneshot, select, FutureExt};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    api::{self, CommentId, LiveStore, TrailId},
    Comment, CommentTree, Delivery, Error, FeedSource, Reply, SubscriptionRegistry, SyncConfig,
};

/// What handling one delivery did to the tree
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SyncEvent {
    TopLevel {
        comments: usize,
        opened: Vec<CommentId>,
        closed: Vec<CommentId>,
    },
    Replies {
        comment: CommentId,
        replies: usize,
    },
    SubscriptionFailed {
        source: FeedSource,
        error: api::Error,
    },
    /// The delivery came from a subscription that was closed since
    Ignored {
        source: FeedSource,
    },
}

/// Keeps a `CommentTree` in sync with the live queries of one trail
pub struct CommentSync<S: LiveStore> {
    registry: SubscriptionRegistry<S>,
    tree: Arc<CommentTree>,
    publisher: watch::Sender<Arc<CommentTree>>,
}

impl<S: LiveStore> CommentSync<S> {
    pub fn new(store: Arc<S>, config: SyncConfig) -> CommentSync<S> {
        let tree = Arc::new(CommentTree::new(config.direction));
        let (publisher, _) = watch::channel(tree.clone());
        CommentSync {
            registry: SubscriptionRegistry::new(store, config),
            tree,
            publisher,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        self.registry.config()
    }

    pub fn registry(&self) -> &SubscriptionRegistry<S> {
        &self.registry
    }

    pub fn tree(&self) -> Arc<CommentTree> {
        self.tree.clone()
    }

    /// Receives the tree each time it changes
    pub fn watch(&self) -> watch::Receiver<Arc<CommentTree>> {
        self.publisher.subscribe()
    }

    fn publish(&mut self, tree: CommentTree) {
        if tree != *self.tree {
            self.tree = Arc::new(tree);
            self.publisher.send_replace(self.tree.clone());
        }
    }

    /// Starts following `trail`, starting over from an empty tree
    pub fn attach(&mut self, trail: TrailId) -> Result<(), Error> {
        self.publish(CommentTree::new(self.config().direction));
        self.registry.attach(trail).map_err(|err| {
            tracing::warn!(?err, "failed subscribing to the comment list");
            Error::Subscription(err)
        })
    }

    /// Stops following the trail; the last tree stays available
    pub fn detach(&mut self) {
        self.registry.detach();
    }

    pub fn handle_delivery(&mut self, d: Delivery) -> SyncEvent {
        if !self.registry.is_live(&d) {
            tracing::debug!(source=?d.source, subscription=?d.subscription, "ignoring stale delivery");
            return SyncEvent::Ignored { source: d.source };
        }
        match (d.source, d.result) {
            (source, Err(error)) => {
                tracing::warn!(err=?error, ?source, "live query failed, keeping stale comments");
                SyncEvent::SubscriptionFailed { source, error }
            }
            (FeedSource::Comments, Ok(snapshot)) => {
                let comments = snapshot
                    .iter()
                    .map(|doc| Comment::from_document(doc, self.config()))
                    .collect::<Vec<_>>();
                let num = comments.len();
                let tree = self.tree.merge_top_level(comments);
                let (opened, closed) = self.registry.reconcile(&tree.ids());
                tracing::debug!(comments = num, ?opened, ?closed, "merged comment list");
                self.publish(tree);
                SyncEvent::TopLevel {
                    comments: num,
                    opened,
                    closed,
                }
            }
            (FeedSource::Replies(comment), Ok(snapshot)) => {
                let replies = snapshot
                    .iter()
                    .map(|doc| Reply::from_document(&comment, doc, self.config()))
                    .collect::<Vec<_>>();
                let num = replies.len();
                let tree = self.tree.merge_replies(&comment, replies);
                tracing::debug!(%comment, replies = num, "merged replies");
                self.publish(tree);
                SyncEvent::Replies {
                    comment,
                    replies: num,
                }
            }
        }
    }

    /// Waits for the next delivery and merges it
    pub async fn next_event(&mut self) -> SyncEvent {
        let d = self.registry.next_delivery().await;
        self.handle_delivery(d)
    }

    /// Merges every delivery that already arrived, including those of reply
    /// subscriptions opened along the way
    pub fn process_pending(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Some(d) = self.registry.try_next_delivery() {
            events.push(self.handle_delivery(d));
        }
        events
    }

    /// Merges deliveries until the receiving end of `cancel` is dropped, then
    /// detaches
    pub async fn run(mut self, mut cancel: oneshot::Sender<()>) {
        let mut cancellation = cancel.cancellation().fuse();
        loop {
            let event = select! {
                _ = cancellation => None,
                event = self.next_event().fuse() => Some(event),
            };
            match event {
                Some(event) => tracing::trace!(?event, "handled delivery"),
                None => break,
            }
        }
        self.detach();
        tracing::debug!("comment sync stopped");
    }

    /// Runs the synchronizer on a tokio task
    pub fn spawn(self) -> SyncHandle
    where
        S: 'static,
    {
        let (cancel, canceller) = oneshot::channel();
        let tree = self.watch();
        let task = tokio::spawn(self.run(cancel));
        SyncHandle {
            canceller,
            task,
            tree,
        }
    }
}

pub struct SyncHandle {
    canceller: oneshot::Receiver<()>,
    task: JoinHandle<()>,
    tree: watch::Receiver<Arc<CommentTree>>,
}

impl SyncHandle {
    pub fn tree(&self) -> Arc<CommentTree> {
        self.tree.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<CommentTree>> {
        self.tree.clone()
    }

    /// Stops the synchronizer, returning once all its subscriptions are closed
    pub async fn detach(self) {
        std::mem::drop(self.canceller);
        if let Err(err) = self.task.await {
            tracing::error!(?err, "comment sync task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use cairn_mock_server::{MockStore, Op};

    use crate::{
        api::{Author, UserId},
        Mutations, Post,
    };

    use super::*;

    fn alice() -> Author {
        Author::new(UserId::from("u1"), String::from("Alice"))
    }

    fn setup() -> (Arc<MockStore>, CommentSync<MockStore>, Mutations<MockStore>) {
        let store = Arc::new(MockStore::new());
        let cfg = SyncConfig::default();
        let trail = TrailId::from("t1");
        let mut sync = CommentSync::new(store.clone(), cfg.clone());
        sync.attach(trail.clone()).unwrap();
        sync.process_pending();
        let mutations = Mutations::new(store.clone(), cfg, trail).with_viewer(alice());
        (store, sync, mutations)
    }

    #[tokio::test]
    async fn new_comments_show_up_empty() {
        let (_store, mut sync, m) = setup();
        let id = m.add_comment("Great trail!").await.unwrap().unwrap();
        sync.process_pending();

        let tree = sync.tree();
        assert_eq!(tree.len(), 1);
        let c = tree.get(&id).unwrap();
        assert_eq!(c.text(), "Great trail!");
        assert_eq!(c.author, alice());
        assert!(c.created_at.is_some());
        assert!(c.replies.is_empty());
        assert!(c.likes.is_empty());
        assert!(sync.registry().has_reply_subscription(&id));
    }

    #[tokio::test]
    async fn reply_subscriptions_open_when_comments_appear() {
        let (store, mut sync, m) = setup();
        let c1 = m.add_comment("Lovely views").await.unwrap().unwrap();
        let bob = m.clone().with_viewer(Author::new(UserId::from("u3"), String::from("Bob")));
        // the reply is written before the comment list was even merged
        let r1 = bob.add_reply(&c1, "Thanks!").await.unwrap().unwrap();
        assert!(!sync.registry().has_reply_subscription(&c1));

        let events = sync.process_pending();
        assert!(events.contains(&SyncEvent::TopLevel {
            comments: 1,
            opened: vec![c1.clone()],
            closed: vec![],
        }));
        assert!(sync.registry().has_reply_subscription(&c1));
        let replies = sync.config().replies_path(&TrailId::from("t1"), &c1);
        assert_eq!(store.test_feeds_on(&replies), 1);

        let tree = sync.tree();
        let reply = tree.reply(&c1, &r1).unwrap();
        assert_eq!(reply.text(), "Thanks!");
        assert_eq!(reply.author.name, "Bob");
    }

    #[tokio::test]
    async fn deleted_comments_lose_their_subscription() {
        let (store, mut sync, m) = setup();
        let c1 = m.add_comment("first").await.unwrap().unwrap();
        let c2 = m.add_comment("second").await.unwrap().unwrap();
        sync.process_pending();
        assert_eq!(sync.tree().ids(), vec![c1.clone(), c2.clone()]);

        m.delete_comment(&c2).await.unwrap();
        let events = sync.process_pending();
        assert!(events.contains(&SyncEvent::TopLevel {
            comments: 1,
            opened: vec![],
            closed: vec![c2.clone()],
        }));
        assert_eq!(sync.tree().ids(), vec![c1.clone()]);
        assert!(!sync.registry().has_reply_subscription(&c2));
        let replies = sync.config().replies_path(&TrailId::from("t1"), &c2);
        assert_eq!(store.test_feeds_on(&replies), 0);
        assert_eq!(store.test_num_feeds(), 2);
    }

    #[tokio::test]
    async fn stale_deliveries_are_ignored() {
        let (store, mut sync, m) = setup();
        m.add_comment("first").await.unwrap();
        sync.process_pending();
        let before = sync.tree();

        let comments = sync.config().comments_path(&TrailId::from("t1"));
        let stale = Delivery {
            epoch: sync.registry().epoch(),
            subscription: api::SubscriptionId::stub(),
            source: FeedSource::Comments,
            result: Ok(vec![]),
        };
        assert_eq!(
            sync.handle_delivery(stale),
            SyncEvent::Ignored {
                source: FeedSource::Comments
            }
        );

        sync.detach();
        sync.detach();
        assert_eq!(store.test_num_feeds(), 0);
        m.add_comment("second").await.unwrap();
        assert!(sync.process_pending().is_empty());
        assert_eq!(sync.tree(), before);
        assert_eq!(store.test_num_documents(&comments), 2);
    }

    #[tokio::test]
    async fn failed_subscriptions_leave_the_tree_stale() {
        let (store, mut sync, m) = setup();
        let c1 = m.add_comment("first").await.unwrap().unwrap();
        m.add_reply(&c1, "reply").await.unwrap();
        sync.process_pending();
        let before = sync.tree();
        assert_eq!(before.get(&c1).unwrap().replies.len(), 1);

        let replies = sync.config().replies_path(&TrailId::from("t1"), &c1);
        let err = api::Error::Unavailable(String::from("listener lost"));
        store.break_feeds(&replies, err.clone());
        let events = sync.process_pending();
        assert_eq!(
            events,
            vec![SyncEvent::SubscriptionFailed {
                source: FeedSource::Replies(c1.clone()),
                error: err,
            }]
        );
        assert_eq!(sync.tree(), before);
        assert!(sync.registry().has_reply_subscription(&c1));
    }

    #[tokio::test]
    async fn attach_failures_are_reported() {
        let store = Arc::new(MockStore::new());
        let mut sync = CommentSync::new(store.clone(), SyncConfig::default());
        store.fail_next(Op::Subscribe, api::Error::PermissionDenied);
        assert_eq!(
            sync.attach(TrailId::from("t1")),
            Err(Error::Subscription(api::Error::PermissionDenied))
        );
        assert_eq!(store.test_num_feeds(), 0);
        assert!(sync.process_pending().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_failures_do_not_stop_detach() {
        let (store, mut sync, m) = setup();
        m.add_comment("first").await.unwrap();
        m.add_comment("second").await.unwrap();
        sync.process_pending();
        assert_eq!(store.test_num_feeds(), 3);
        store.fail_next(Op::Unsubscribe, api::Error::Unknown(String::from("boom")));
        sync.detach();
        // the failed unsubscription leaves one feed behind in the store, but
        // nothing reaches the tree anymore
        assert_eq!(store.test_num_feeds(), 1);
        assert_eq!(sync.registry().num_subscriptions(), 0);
        m.add_comment("third").await.unwrap();
        assert!(sync.process_pending().is_empty());
        assert_eq!(sync.tree().len(), 2);
    }

    #[tokio::test]
    async fn watchers_only_hear_about_changes() {
        let (_store, mut sync, m) = setup();
        let rx = sync.watch();
        let initial = rx.borrow().clone();

        let c1 = m.add_comment("first").await.unwrap().unwrap();
        sync.process_pending();
        let after_add = rx.borrow().clone();
        assert!(!Arc::ptr_eq(&initial, &after_add));
        assert!(after_add.get(&c1).is_some());

        // fields nobody reads change the snapshot, not the tree
        let mut w = api::Writes::new();
        w.insert(String::from("flagged"), api::FieldWrite::Set(api::Value::Bool(true)));
        let doc = sync.config().comment_doc(&TrailId::from("t1"), &c1);
        sync.registry().store().update_document(&doc, w).await.unwrap();
        assert_eq!(sync.process_pending().len(), 1);
        assert!(Arc::ptr_eq(&after_add, &rx.borrow()));

        m.toggle_like(&c1, &Default::default()).await.unwrap();
        sync.process_pending();
        assert!(rx.borrow().get(&c1).unwrap().is_liked_by(&UserId::from("u1")));
    }

    #[tokio::test]
    async fn reattaching_starts_from_scratch() {
        let (store, mut sync, m) = setup();
        m.add_comment("on t1").await.unwrap();
        sync.process_pending();
        assert_eq!(sync.tree().len(), 1);

        sync.attach(TrailId::from("t2")).unwrap();
        assert!(sync.tree().is_empty());
        sync.process_pending();
        assert!(sync.tree().is_empty());
        assert_eq!(store.test_num_feeds(), 1);
    }

    #[tokio::test]
    async fn spawned_sync_follows_writes() {
        let store = Arc::new(MockStore::new());
        let cfg = SyncConfig::default();
        let trail = TrailId::from("t1");
        let mut sync = CommentSync::new(store.clone(), cfg.clone());
        sync.attach(trail.clone()).unwrap();
        let handle = sync.spawn();
        let mut rx = handle.watch();

        let m = Mutations::new(store.clone(), cfg, trail).with_viewer(alice());
        let c1 = m.add_comment("first").await.unwrap().unwrap();
        m.add_reply(&c1, "reply").await.unwrap();
        loop {
            let done = rx
                .borrow()
                .get(&c1)
                .map(|c| c.replies.len() == 1)
                .unwrap_or(false);
            if done {
                break;
            }
            rx.changed().await.unwrap();
        }
        assert_eq!(handle.tree().len(), 1);

        handle.detach().await;
        assert_eq!(store.test_num_feeds(), 0);
    }
}
