use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use cairn_api::{
    CollectionPath, DocPath, Document, Error, FieldWrite, Fields, LiveStore, OrderType, Query,
    Snapshot, Subscription, SubscriptionId, Time, Uuid, Value, Writes,
};
use chrono::Utc;
use futures::channel::mpsc;
use parking_lot::Mutex;

mod seed;
pub use seed::{Seed, SeedDocument};

/// In-memory document store pushing live query results the way a hosted
/// document database would
pub struct MockStore(Mutex<State>);

#[derive(Default)]
struct State {
    collections: BTreeMap<CollectionPath, Vec<StoredDoc>>,
    feeds: HashMap<SubscriptionId, Feed>,
    last_time: Option<Time>,
    next_seq: u64,
    failures: HashMap<Op, VecDeque<Error>>,
    journal: Vec<WriteRecord>,
}

#[derive(Debug)]
struct StoredDoc {
    id: String,
    // insertion order, breaks ties between equal ordering values
    seq: u64,
    fields: Fields,
}

#[derive(Debug)]
struct Feed {
    query: Query,
    sender: mpsc::UnboundedSender<Result<Snapshot, Error>>,
}

/// Store operations that can be made to fail
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Op {
    Subscribe,
    Unsubscribe,
    Fetch,
    Write,
}

/// Committed write, as recorded in the store's journal
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WriteRecord {
    Add {
        collection: CollectionPath,
        id: String,
        writes: Writes,
    },
    Update {
        doc: DocPath,
        writes: Writes,
    },
    Delete {
        doc: DocPath,
    },
}

impl StoredDoc {
    fn to_document(&self) -> Document {
        Document {
            id: self.id.clone(),
            fields: self.fields.clone(),
        }
    }
}

fn apply_writes(fields: &mut Fields, writes: Writes, now: Time) {
    for (name, w) in writes {
        match w {
            FieldWrite::Set(v) => {
                fields.insert(name, v);
            }
            FieldWrite::ServerTimestamp => {
                fields.insert(name, Value::Timestamp(now));
            }
            FieldWrite::ArrayUnion(values) => {
                let mut array = match fields.remove(&name) {
                    Some(Value::Array(a)) => a,
                    _ => Vec::new(),
                };
                for v in values {
                    if !array.contains(&v) {
                        array.push(v);
                    }
                }
                fields.insert(name, Value::Array(array));
            }
            FieldWrite::ArrayRemove(values) => {
                let mut array = match fields.remove(&name) {
                    Some(Value::Array(a)) => a,
                    _ => Vec::new(),
                };
                array.retain(|v| !values.contains(v));
                fields.insert(name, Value::Array(array));
            }
            FieldWrite::Delete => {
                fields.remove(&name);
            }
        }
    }
}

fn run_query(collections: &BTreeMap<CollectionPath, Vec<StoredDoc>>, q: &Query) -> Snapshot {
    let mut docs = collections
        .get(&q.collection)
        .map(|docs| {
            docs.iter()
                .filter_map(|d| d.fields.get(&q.order_by).map(|v| (v, d.seq, d)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    docs.sort_by(|(va, sa, _), (vb, sb, _)| (va, sa).cmp(&(vb, sb)));
    if q.direction == OrderType::Desc {
        docs.reverse();
    }
    docs.into_iter().map(|(_, _, d)| d.to_document()).collect()
}

impl State {
    fn take_failure(&mut self, op: Op) -> Result<(), Error> {
        match self.failures.get_mut(&op).and_then(|f| f.pop_front()) {
            Some(err) => {
                tracing::debug!(?op, ?err, "injecting store failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Strictly increasing server clock, so that creation order is never ambiguous
    fn now(&mut self) -> Time {
        let mut now = Utc::now();
        if let Some(last) = self.last_time {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_time = Some(now);
        now
    }

    fn bump_clock(&mut self, t: Time) {
        if self.last_time.map(|last| last < t).unwrap_or(true) {
            self.last_time = Some(t);
        }
    }

    fn insert(&mut self, c: &CollectionPath, id: String, fields: Fields) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.collections
            .entry(c.clone())
            .or_insert_with(Vec::new)
            .push(StoredDoc { id, seq, fields });
    }

    fn find_mut(&mut self, d: &DocPath) -> Option<&mut StoredDoc> {
        self.collections
            .get_mut(&d.collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == d.id))
    }

    fn relay(&mut self, c: &CollectionPath) {
        let State {
            collections, feeds, ..
        } = self;
        feeds.retain(|_, f| {
            if f.query.collection != *c {
                return true;
            }
            let snapshot = run_query(collections, &f.query);
            matches!(f.sender.unbounded_send(Ok(snapshot)), Ok(()))
        });
    }
}

impl MockStore {
    pub fn new() -> MockStore {
        MockStore(Mutex::new(State::default()))
    }

    pub fn from_seed(seed: Seed) -> Result<MockStore, Error> {
        let store = MockStore::new();
        store.load_seed(seed)?;
        Ok(store)
    }

    /// Inserts documents as-is, bypassing failure injection and the journal
    pub fn load_seed(&self, seed: Seed) -> Result<(), Error> {
        let mut state = self.0.lock();
        for SeedDocument {
            collection,
            document,
        } in seed.documents
        {
            cairn_api::validate_string(&document.id)?;
            if document.id.is_empty() || document.id.contains('/') {
                return Err(Error::InvalidPath(collection.doc(&document.id).to_string()));
            }
            for t in document.fields.values().filter_map(|v| v.as_time()) {
                state.bump_clock(t);
            }
            state.insert(&collection, document.id, document.fields);
            state.relay(&collection);
        }
        Ok(())
    }

    /// Makes the next `op` fail with `err`; failures queue up in order
    pub fn fail_next(&self, op: Op, err: Error) {
        self.0
            .lock()
            .failures
            .entry(op)
            .or_insert_with(VecDeque::new)
            .push_back(err);
    }

    /// Pushes an error to every live query on `c`, as a backend losing a listener would
    pub fn break_feeds(&self, c: &CollectionPath, err: Error) {
        let mut state = self.0.lock();
        state.feeds.retain(|_, f| {
            f.query.collection != *c || matches!(f.sender.unbounded_send(Err(err.clone())), Ok(()))
        });
    }

    pub fn test_journal(&self) -> Vec<WriteRecord> {
        self.0.lock().journal.clone()
    }

    pub fn test_clear_journal(&self) {
        self.0.lock().journal.clear();
    }

    pub fn test_num_feeds(&self) -> usize {
        self.0.lock().feeds.len()
    }

    pub fn test_feeds_on(&self, c: &CollectionPath) -> usize {
        self.0
            .lock()
            .feeds
            .values()
            .filter(|f| f.query.collection == *c)
            .count()
    }

    pub fn test_document(&self, d: &DocPath) -> Option<Document> {
        self.0
            .lock()
            .find_mut(d)
            .map(|doc| doc.to_document())
    }

    pub fn test_num_documents(&self, c: &CollectionPath) -> usize {
        self.0
            .lock()
            .collections
            .get(c)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }
}

impl Default for MockStore {
    fn default() -> MockStore {
        MockStore::new()
    }
}

#[async_trait]
impl LiveStore for MockStore {
    fn subscribe(&self, q: &Query) -> Result<Subscription, Error> {
        let mut state = self.0.lock();
        state.take_failure(Op::Subscribe)?;
        let (sender, feed) = mpsc::unbounded();
        let id = SubscriptionId(Uuid::new_v4());
        let initial = run_query(&state.collections, q);
        // the receiver is still alive, sending cannot fail
        let _ = sender.unbounded_send(Ok(initial));
        state.feeds.insert(
            id,
            Feed {
                query: q.clone(),
                sender,
            },
        );
        Ok(Subscription { id, feed })
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), Error> {
        let mut state = self.0.lock();
        state.take_failure(Op::Unsubscribe)?;
        // unknown ids are accepted, unsubscribing twice is harmless
        state.feeds.remove(&id);
        Ok(())
    }

    async fn fetch(&self, q: &Query) -> Result<Snapshot, Error> {
        let mut state = self.0.lock();
        state.take_failure(Op::Fetch)?;
        Ok(run_query(&state.collections, q))
    }

    async fn list(&self, c: &CollectionPath) -> Result<Snapshot, Error> {
        let mut state = self.0.lock();
        state.take_failure(Op::Fetch)?;
        Ok(state
            .collections
            .get(c)
            .map(|docs| docs.iter().map(|d| d.to_document()).collect())
            .unwrap_or_default())
    }

    async fn add_document(&self, c: &CollectionPath, w: Writes) -> Result<String, Error> {
        let mut state = self.0.lock();
        state.take_failure(Op::Write)?;
        let id = Uuid::new_v4().simple().to_string();
        let now = state.now();
        let mut fields = Fields::new();
        apply_writes(&mut fields, w.clone(), now);
        state.insert(c, id.clone(), fields);
        state.journal.push(WriteRecord::Add {
            collection: c.clone(),
            id: id.clone(),
            writes: w,
        });
        state.relay(c);
        Ok(id)
    }

    async fn update_document(&self, d: &DocPath, w: Writes) -> Result<(), Error> {
        let mut state = self.0.lock();
        state.take_failure(Op::Write)?;
        let now = state.now();
        let doc = state
            .find_mut(d)
            .ok_or_else(|| Error::NotFound(d.to_string()))?;
        apply_writes(&mut doc.fields, w.clone(), now);
        state.journal.push(WriteRecord::Update {
            doc: d.clone(),
            writes: w,
        });
        state.relay(&d.collection);
        Ok(())
    }

    async fn delete_document(&self, d: &DocPath) -> Result<(), Error> {
        let mut state = self.0.lock();
        state.take_failure(Op::Write)?;
        let docs = state
            .collections
            .get_mut(&d.collection)
            .ok_or_else(|| Error::NotFound(d.to_string()))?;
        let idx = docs
            .iter()
            .position(|doc| doc.id == d.id)
            .ok_or_else(|| Error::NotFound(d.to_string()))?;
        docs.remove(idx);
        state.journal.push(WriteRecord::Delete { doc: d.clone() });
        state.relay(&d.collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cairn_api::field;
    use futures::{executor::block_on, FutureExt, StreamExt};

    use super::*;

    fn comments() -> CollectionPath {
        CollectionPath::root("trails").doc("t1").subcollection("comments")
    }

    fn by_creation(c: CollectionPath) -> Query {
        Query::ordered(c, field::CREATED_AT, OrderType::Asc)
    }

    fn text_writes(text: &str) -> Writes {
        let mut w = Writes::new();
        w.insert(field::TEXT.into(), FieldWrite::Set(Value::from(text)));
        w.insert(field::CREATED_AT.into(), FieldWrite::ServerTimestamp);
        w
    }

    fn texts(s: &Snapshot) -> Vec<&str> {
        s.iter().map(|d| d.get_str(field::TEXT).unwrap()).collect()
    }

    #[test]
    fn feeds_get_initial_and_updated_snapshots() {
        block_on(async {
            let store = MockStore::new();
            store.add_document(&comments(), text_writes("first")).await.unwrap();
            let mut sub = store.subscribe(&by_creation(comments())).unwrap();
            let initial = sub.feed.next().await.unwrap().unwrap();
            assert_eq!(texts(&initial), vec!["first"]);
            assert!(sub.feed.next().now_or_never().is_none());

            store.add_document(&comments(), text_writes("second")).await.unwrap();
            let updated = sub.feed.next().await.unwrap().unwrap();
            assert_eq!(texts(&updated), vec!["first", "second"]);

            // writes to other collections are not relayed
            let other = comments().doc("c1").subcollection("replies");
            store.add_document(&other, text_writes("reply")).await.unwrap();
            assert!(sub.feed.next().now_or_never().is_none());

            store.unsubscribe(sub.id).unwrap();
            assert_eq!(sub.feed.next().await, None);
            assert_eq!(store.test_num_feeds(), 0);
        })
    }

    #[test]
    fn queries_order_and_filter_on_the_order_field() {
        block_on(async {
            let store = MockStore::new();
            let a = store.add_document(&comments(), text_writes("a")).await.unwrap();
            store.add_document(&comments(), text_writes("b")).await.unwrap();
            let mut unordered = Writes::new();
            unordered.insert(field::TEXT.into(), FieldWrite::Set(Value::from("no date")));
            store.add_document(&comments(), unordered).await.unwrap();

            let asc = store.fetch(&by_creation(comments())).await.unwrap();
            assert_eq!(texts(&asc), vec!["a", "b"]);
            let desc = store
                .fetch(&Query::ordered(comments(), field::CREATED_AT, OrderType::Desc))
                .await
                .unwrap();
            assert_eq!(texts(&desc), vec!["b", "a"]);
            assert_eq!(store.test_num_documents(&comments()), 3);

            // editing does not move a document
            store
                .update_document(&comments().doc(&a), text_writes("a, edited"))
                .await
                .unwrap();
            let asc = store.fetch(&by_creation(comments())).await.unwrap();
            assert_eq!(texts(&asc), vec!["b", "a, edited"]);
        })
    }

    #[test]
    fn listing_ignores_the_order_field() {
        block_on(async {
            let store = MockStore::new();
            let mut undated = Writes::new();
            undated.insert(field::TEXT.into(), FieldWrite::Set(Value::from("no date")));
            store.add_document(&comments(), undated).await.unwrap();
            store.add_document(&comments(), text_writes("dated")).await.unwrap();

            let all = store.list(&comments()).await.unwrap();
            assert_eq!(texts(&all), vec!["no date", "dated"]);
            let other = comments().doc("c1").subcollection("replies");
            assert_eq!(store.list(&other).await.unwrap(), Vec::new());

            store.fail_next(Op::Fetch, Error::PermissionDenied);
            assert_eq!(store.list(&comments()).await, Err(Error::PermissionDenied));
        })
    }

    #[test]
    fn array_operations_behave_as_sets() {
        block_on(async {
            let store = MockStore::new();
            let id = store.add_document(&comments(), text_writes("a")).await.unwrap();
            let doc = comments().doc(&id);
            let like = |user: &str, add: bool| {
                let mut w = Writes::new();
                let v = vec![Value::from(user)];
                w.insert(
                    field::LIKES.into(),
                    match add {
                        true => FieldWrite::ArrayUnion(v),
                        false => FieldWrite::ArrayRemove(v),
                    },
                );
                w
            };
            store.update_document(&doc, like("u1", true)).await.unwrap();
            store.update_document(&doc, like("u1", true)).await.unwrap();
            store.update_document(&doc, like("u2", true)).await.unwrap();
            assert_eq!(
                store.test_document(&doc).unwrap().get_strings(field::LIKES),
                vec!["u1", "u2"],
            );
            store.update_document(&doc, like("u1", false)).await.unwrap();
            store.update_document(&doc, like("u3", false)).await.unwrap();
            assert_eq!(
                store.test_document(&doc).unwrap().get_strings(field::LIKES),
                vec!["u2"],
            );
        })
    }

    #[test]
    fn deleting_keeps_subcollections() {
        block_on(async {
            let store = MockStore::new();
            let id = store.add_document(&comments(), text_writes("a")).await.unwrap();
            let replies = comments().doc(&id).subcollection("replies");
            store.add_document(&replies, text_writes("r")).await.unwrap();
            store.delete_document(&comments().doc(&id)).await.unwrap();
            assert_eq!(store.test_num_documents(&comments()), 0);
            assert_eq!(store.test_num_documents(&replies), 1);
            assert_eq!(
                store.delete_document(&comments().doc(&id)).await,
                Err(Error::NotFound(comments().doc(&id).to_string())),
            );
            assert_eq!(
                store
                    .update_document(&comments().doc(&id), text_writes("b"))
                    .await,
                Err(Error::NotFound(comments().doc(&id).to_string())),
            );
        })
    }

    #[test]
    fn injected_failures_are_consumed_in_order() {
        block_on(async {
            let store = MockStore::new();
            store.fail_next(Op::Write, Error::PermissionDenied);
            store.fail_next(Op::Write, Error::Unavailable(String::from("offline")));
            assert_eq!(
                store.add_document(&comments(), text_writes("a")).await,
                Err(Error::PermissionDenied),
            );
            assert_eq!(
                store.add_document(&comments(), text_writes("a")).await,
                Err(Error::Unavailable(String::from("offline"))),
            );
            assert!(store.add_document(&comments(), text_writes("a")).await.is_ok());
            assert_eq!(store.test_journal().len(), 1);

            store.fail_next(Op::Subscribe, Error::PermissionDenied);
            assert!(store.subscribe(&by_creation(comments())).is_err());
            assert!(store.subscribe(&by_creation(comments())).is_ok());
        })
    }

    #[test]
    fn broken_feeds_receive_the_error() {
        block_on(async {
            let store = MockStore::new();
            let mut sub = store.subscribe(&by_creation(comments())).unwrap();
            sub.feed.next().await.unwrap().unwrap();
            store.break_feeds(&comments(), Error::PermissionDenied);
            assert_eq!(sub.feed.next().await, Some(Err(Error::PermissionDenied)));
        })
    }

    #[test]
    fn server_clock_is_strictly_increasing() {
        let mut state = State::default();
        let mut last = state.now();
        for _ in 0..1000 {
            let now = state.now();
            assert!(now > last);
            last = now;
        }
    }
}
