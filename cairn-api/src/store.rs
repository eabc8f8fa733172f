use async_trait::async_trait;
use futures::channel::mpsc;

use crate::{CollectionPath, DocPath, Document, Error, Query, Uuid, Writes, STUB_UUID};

/// Full, ordered result set of a query at one point in time
pub type Snapshot = Vec<Document>;

pub type SnapshotFeed = mpsc::UnboundedReceiver<Result<Snapshot, Error>>;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn stub() -> SubscriptionId {
        SubscriptionId(STUB_UUID)
    }
}

#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,

    /// Receives one snapshot right after registration, then one after each
    /// change to the query's result set. Ends once unsubscribed.
    pub feed: SnapshotFeed,
}

/// A remote document store able to push live query results
#[async_trait]
pub trait LiveStore: Send + Sync {
    fn subscribe(&self, q: &Query) -> Result<Subscription, Error>;
    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), Error>;

    async fn fetch(&self, q: &Query) -> Result<Snapshot, Error>;

    /// Every document of `c`, including those a query would filter out for
    /// lacking its order field
    async fn list(&self, c: &CollectionPath) -> Result<Snapshot, Error>;

    /// Returns the id the store picked for the new document
    async fn add_document(&self, c: &CollectionPath, w: Writes) -> Result<String, Error>;
    async fn update_document(&self, d: &DocPath, w: Writes) -> Result<(), Error>;

    /// Subcollections of the deleted document are left untouched
    async fn delete_document(&self, d: &DocPath) -> Result<(), Error>;
}
