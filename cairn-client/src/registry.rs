use std::{collections::HashMap, sync::Arc};

use futures::{
    future,
    stream::{self, AbortHandle, BoxStream, SelectAll},
    FutureExt, StreamExt,
};

use crate::{
    api::{self, CommentId, LiveStore, Query, Snapshot, SubscriptionId, TrailId},
    SyncConfig,
};

/// Which live query a delivery comes from
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FeedSource {
    Comments,
    Replies(CommentId),
}

/// One item pushed by a live query, tagged with everything needed to tell
/// whether it is still wanted
#[derive(Debug)]
pub struct Delivery {
    pub epoch: u64,
    pub subscription: SubscriptionId,
    pub source: FeedSource,
    pub result: Result<Snapshot, api::Error>,
}

#[derive(Debug)]
struct Handle {
    id: SubscriptionId,
    abort: AbortHandle,
}

/// Keeps exactly the live queries a trail's comment tree needs: one on the
/// comment list, and one on the replies of each comment currently known.
pub struct SubscriptionRegistry<S: LiveStore> {
    store: Arc<S>,
    config: SyncConfig,
    trail: Option<TrailId>,

    /// Bumped on every attach and detach; deliveries from older epochs are dead
    epoch: u64,

    comments: Option<Handle>,
    replies: HashMap<CommentId, Handle>,
    feeds: SelectAll<BoxStream<'static, Delivery>>,
}

impl<S: LiveStore> SubscriptionRegistry<S> {
    pub fn new(store: Arc<S>, config: SyncConfig) -> SubscriptionRegistry<S> {
        SubscriptionRegistry {
            store,
            config,
            trail: None,
            epoch: 0,
            comments: None,
            replies: HashMap::new(),
            feeds: SelectAll::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn trail(&self) -> Option<&TrailId> {
        self.trail.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_attached(&self) -> bool {
        self.trail.is_some()
    }

    pub fn has_reply_subscription(&self, comment: &CommentId) -> bool {
        self.replies.contains_key(comment)
    }

    pub fn reply_subscriptions(&self) -> impl Iterator<Item = &CommentId> {
        self.replies.keys()
    }

    pub fn num_subscriptions(&self) -> usize {
        self.comments.iter().count() + self.replies.len()
    }

    /// Starts following the comments of `trail`, dropping whatever was
    /// followed before
    pub fn attach(&mut self, trail: TrailId) -> Result<(), api::Error> {
        self.detach();
        self.epoch += 1;
        let query = self.config.comments_query(&trail);
        self.trail = Some(trail);
        match self.open(FeedSource::Comments, &query) {
            Ok(handle) => {
                self.comments = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.trail = None;
                Err(err)
            }
        }
    }

    fn open(&mut self, source: FeedSource, query: &Query) -> Result<Handle, api::Error> {
        let sub = self.store.subscribe(query)?;
        tracing::debug!(subscription=?sub.id, collection=%query.collection, "opened live query");
        let (feed, abort) = stream::abortable(sub.feed);
        let epoch = self.epoch;
        let id = sub.id;
        self.feeds.push(
            feed.map(move |result| Delivery {
                epoch,
                subscription: id,
                source: source.clone(),
                result,
            })
            .boxed(),
        );
        Ok(Handle { id, abort })
    }

    fn close(&self, handle: Handle) {
        handle.abort.abort();
        match self.store.unsubscribe(handle.id) {
            Ok(()) => tracing::debug!(subscription=?handle.id, "closed live query"),
            Err(err) => {
                tracing::warn!(?err, subscription=?handle.id, "failed closing live query")
            }
        }
    }

    /// Makes reply subscriptions match `present`, the ids of the latest comment
    /// list. Returns the comments whose subscription was opened and closed.
    ///
    /// A reply subscription that fails to open is not registered, and will be
    /// retried on the next call.
    pub fn reconcile(&mut self, present: &[CommentId]) -> (Vec<CommentId>, Vec<CommentId>) {
        let Some(trail) = self.trail.clone() else {
            return (Vec::new(), Vec::new());
        };

        let gone = self
            .replies
            .keys()
            .filter(|id| !present.contains(*id))
            .cloned()
            .collect::<Vec<_>>();
        let mut closed = Vec::with_capacity(gone.len());
        for id in gone {
            if let Some(handle) = self.replies.remove(&id) {
                self.close(handle);
                closed.push(id);
            }
        }

        let mut opened = Vec::new();
        for id in present {
            if self.replies.contains_key(id) {
                continue;
            }
            let query = self.config.replies_query(&trail, id);
            match self.open(FeedSource::Replies(id.clone()), &query) {
                Ok(handle) => {
                    self.replies.insert(id.clone(), handle);
                    opened.push(id.clone());
                }
                Err(err) => {
                    tracing::warn!(?err, comment=%id, "failed opening reply subscription")
                }
            }
        }

        (opened, closed)
    }

    /// Closes every subscription. Calling it again, or before any attach, does
    /// nothing.
    pub fn detach(&mut self) {
        if self.trail.is_none() && self.comments.is_none() && self.replies.is_empty() {
            return;
        }
        let handles = self
            .comments
            .take()
            .into_iter()
            .chain(self.replies.drain().map(|(_, h)| h))
            .collect::<Vec<_>>();
        for handle in handles {
            self.close(handle);
        }
        self.feeds = SelectAll::new();
        self.trail = None;
        self.epoch += 1;
    }

    /// Whether `d` comes from a subscription that is still registered, in the
    /// current epoch
    pub fn is_live(&self, d: &Delivery) -> bool {
        if d.epoch != self.epoch {
            return false;
        }
        let handle = match &d.source {
            FeedSource::Comments => self.comments.as_ref(),
            FeedSource::Replies(c) => self.replies.get(c),
        };
        handle.map(|h| h.id == d.subscription).unwrap_or(false)
    }

    /// Waits for the next delivery of any registered subscription. Never
    /// resolves while nothing is registered.
    pub async fn next_delivery(&mut self) -> Delivery {
        if !self.feeds.is_empty() {
            if let Some(d) = self.feeds.next().await {
                return d;
            }
        }
        future::pending().await
    }

    /// Returns a delivery that is already available, if any
    pub fn try_next_delivery(&mut self) -> Option<Delivery> {
        self.feeds.next().now_or_never().flatten()
    }
}

impl<S: LiveStore> Drop for SubscriptionRegistry<S> {
    fn drop(&mut self) {
        self.detach();
    }
}
