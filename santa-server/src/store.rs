//! Path-addressed document store on top of sled.
//!
//! A JSON value written at `a/b` is flattened into one sled key per leaf
//! (`a/b/name`, `a/b/price`, ...). Arrays, strings, numbers and booleans are
//! leaves; objects only exist through their children, so an empty object or
//! `null` is the same as nothing at all. Reads fold the leaves back into a
//! tree.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use santa_common::keys::{is_valid_segment, push_id};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sled::{Batch, Db};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),
    #[error("overlapping paths in one update: {0} and {1}")]
    OverlappingPaths(StorePath, StorePath),
    #[error("storage failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath(Vec<String>);

impl StorePath {
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = segments
            .into_iter()
            .map(|s| {
                let s = s.as_ref();
                if is_valid_segment(s) {
                    Ok(s.to_string())
                } else {
                    Err(StoreError::InvalidSegment(s.to_string()))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        if segments.is_empty() {
            return Err(StoreError::InvalidSegment(String::new()));
        }
        Ok(Self(segments))
    }

    pub fn child(&self, segment: impl AsRef<str>) -> Result<Self> {
        let segment = segment.as_ref();
        if !is_valid_segment(segment) {
            return Err(StoreError::InvalidSegment(segment.to_string()));
        }
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Ok(Self(segments))
    }

    fn key(&self) -> String {
        self.0.join("/")
    }

    fn subtree_prefix(&self) -> String {
        format!("{}/", self.key())
    }

    fn contains(&self, other: &StorePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    fn ancestors(&self) -> impl Iterator<Item = String> + '_ {
        (1..self.0.len()).map(|n| self.0[..n].join("/"))
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A multi-path write. Applied all-or-nothing by [`Store::apply`].
#[derive(Default, Debug)]
pub struct Update {
    writes: Vec<(StorePath, Option<Value>)>,
}

impl Update {
    pub fn set(mut self, path: StorePath, value: impl Serialize) -> Result<Self> {
        self.writes.push((path, Some(serde_json::to_value(value)?)));
        Ok(self)
    }

    pub fn remove(mut self, path: StorePath) -> Self {
        self.writes.push((path, None));
        self
    }
}

#[derive(Clone)]
pub struct Store {
    db: Db,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { db: sled::open(path)? })
    }

    pub fn temporary() -> Result<Self> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    /// Full value at `path`, `Value::Null` when nothing is stored there.
    pub fn get(&self, path: &StorePath) -> Result<Value> {
        if let Some(leaf) = self.db.get(path.key())? {
            return Ok(serde_json::from_slice(&leaf)?);
        }
        let prefix = path.subtree_prefix();
        let mut root = Map::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, leaf) = entry?;
            let key = String::from_utf8_lossy(&key);
            let relative = &key[prefix.len()..];
            insert_leaf(&mut root, relative.split('/'), serde_json::from_slice(&leaf)?);
        }
        Ok(if root.is_empty() { Value::Null } else { Value::Object(root) })
    }

    pub fn exists(&self, path: &StorePath) -> Result<bool> {
        if self.db.contains_key(path.key())? {
            return Ok(true);
        }
        Ok(self.db.scan_prefix(path.subtree_prefix().as_bytes()).next().transpose()?.is_some())
    }

    pub fn get_as<T: DeserializeOwned>(&self, path: &StorePath) -> Result<Option<T>> {
        match self.get(path)? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Children of `path` keyed by their last segment.
    pub fn children<T: DeserializeOwned>(&self, path: &StorePath) -> Result<BTreeMap<String, T>> {
        Ok(decode_children(self.get(path)?))
    }

    pub fn set(&self, path: StorePath, value: impl Serialize) -> Result<()> {
        self.apply(Update::default().set(path, value)?)
    }

    pub fn remove(&self, path: StorePath) -> Result<()> {
        self.apply(Update::default().remove(path))
    }

    /// Appends `value` under `parent` with a freshly generated key.
    pub fn push(&self, parent: &StorePath, value: impl Serialize) -> Result<String> {
        let id = push_id();
        self.set(parent.child(&id)?, value)?;
        Ok(id)
    }

    pub fn apply(&self, update: Update) -> Result<()> {
        for (i, (a, _)) in update.writes.iter().enumerate() {
            for (b, _) in &update.writes[i + 1..] {
                if a.contains(b) || b.contains(a) {
                    return Err(StoreError::OverlappingPaths(a.clone(), b.clone()));
                }
            }
        }

        let mut batch = Batch::default();
        for (path, value) in &update.writes {
            let key = path.key();
            batch.remove(key.as_bytes());
            for existing in self.db.scan_prefix(path.subtree_prefix().as_bytes()).keys() {
                batch.remove(existing?);
            }
            // a leaf above the path would shadow the new subtree on read
            for ancestor in path.ancestors() {
                batch.remove(ancestor.as_bytes());
            }
            if let Some(value) = value {
                flatten_into(&mut batch, &key, value)?;
            }
        }
        self.db.apply_batch(batch)?;
        debug!(paths = update.writes.len(), "applied update");
        Ok(())
    }

    /// Watches `path`. The subscription yields the current value right away and
    /// again whenever it changes, until it is cancelled or dropped.
    pub fn subscribe(&self, path: StorePath) -> Subscription {
        let (sender, receiver) = watch::channel(None);
        // registered before the first read so no write can slip between them
        let mut events = self.db.watch_prefix(path.key().as_bytes());
        let store = self.clone();
        let task = tokio::spawn(async move {
            let mut last = None;
            loop {
                match store.get(&path) {
                    Ok(snapshot) if last.as_ref() != Some(&snapshot) => {
                        if sender.send(Some(snapshot.clone())).is_err() {
                            break;
                        }
                        last = Some(snapshot);
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%path, %error, "subscription read failed");
                        break;
                    }
                }
                if (&mut events).await.is_none() {
                    break;
                }
            }
            debug!(%path, "subscription closed");
        });
        Subscription { receiver, task }
    }
}

/// Handle on a live query. Owned by whoever opened it.
///
/// Only the latest snapshot is kept; a slow reader skips intermediate states
/// rather than holding up writers.
pub struct Subscription {
    receiver: watch::Receiver<Option<Value>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Next full snapshot; `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Value> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(snapshot) = self.receiver.borrow_and_update().clone() {
                return Some(snapshot);
            }
        }
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Decodes each child of an object snapshot. Children that do not parse are
/// skipped so one bad record cannot hide the rest of a collection.
pub fn decode_children<T: DeserializeOwned>(snapshot: Value) -> BTreeMap<String, T> {
    let Value::Object(children) = snapshot else {
        return BTreeMap::new();
    };
    children
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(decoded) => Some((key, decoded)),
            Err(error) => {
                warn!(%key, %error, "skipping malformed record");
                None
            }
        })
        .collect()
}

fn flatten_into(batch: &mut Batch, key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (child, value) in map {
                if !is_valid_segment(child) {
                    return Err(StoreError::InvalidSegment(child.clone()));
                }
                flatten_into(batch, &format!("{key}/{child}"), value)?;
            }
        }
        leaf => batch.insert(key.as_bytes(), serde_json::to_vec(leaf)?),
    }
    Ok(())
}

fn insert_leaf<'a>(root: &mut Map<String, Value>, mut segments: impl Iterator<Item = &'a str>, leaf: Value) {
    let Some(first) = segments.next() else {
        return;
    };
    let mut node = root;
    let mut current = first;
    for next in segments {
        let slot = node
            .entry(current.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(map) = slot else {
            return;
        };
        node = map;
        current = next;
    }
    node.insert(current.to_string(), leaf);
}
