use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexSet;
use rhizome_reactivity::{IndexBinding, Subscription, Value};

use crate::entity::{Entity, Kind, Uri};

/// A key change for one indexed entity, published to
/// [`crate::store::EntityStore::on_index_changed`] subscribers after
/// the buckets have moved.
pub struct KeyChange {
    pub entity: Entity,
    pub from: Value,
    pub to: Value,
}

/// One store index: `key → ordered set of URIs`, plus the bookkeeping
/// that keeps signal-fed entries honest (current key per URI, one watch
/// per reactive binding).
pub(crate) struct StoreIndex {
    pub(crate) kind: Kind,
    pub(crate) name: Rc<str>,
    getter: Rc<dyn Fn(&Entity) -> IndexBinding>,
    buckets: RefCell<HashMap<Value, IndexSet<Uri>>>,
    current: RefCell<HashMap<Uri, Value>>,
    watches: RefCell<HashMap<Uri, Subscription>>,
}

impl StoreIndex {
    pub(crate) fn new(kind: Kind, name: Rc<str>, getter: Rc<dyn Fn(&Entity) -> IndexBinding>) -> Self {
        Self {
            kind,
            name,
            getter,
            buckets: RefCell::new(HashMap::new()),
            current: RefCell::new(HashMap::new()),
            watches: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn bind(&self, entity: &Entity) -> IndexBinding {
        (self.getter)(entity)
    }

    pub(crate) fn install(&self, uri: Uri, key: Value) {
        self.buckets
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .insert(uri.clone());
        self.current.borrow_mut().insert(uri, key);
    }

    pub(crate) fn store_watch(&self, uri: Uri, sub: Subscription) {
        self.watches.borrow_mut().insert(uri, sub);
    }

    /// Moves `uri` to the `new` bucket. Returns the old key, or `None`
    /// when the entry is absent or the key did not actually change.
    pub(crate) fn apply(&self, uri: &Uri, new: Value) -> Option<Value> {
        let old = self.current.borrow().get(uri).cloned()?;
        if old == new {
            return None;
        }
        {
            let mut buckets = self.buckets.borrow_mut();
            if let Some(bucket) = buckets.get_mut(&old) {
                bucket.shift_remove(uri);
                if bucket.is_empty() {
                    buckets.remove(&old);
                }
            }
            buckets.entry(new.clone()).or_default().insert(uri.clone());
        }
        self.current.borrow_mut().insert(uri.clone(), new);
        Some(old)
    }

    pub(crate) fn uninstall(&self, uri: &str) -> Option<Value> {
        let old = self.current.borrow_mut().remove(uri)?;
        {
            let mut buckets = self.buckets.borrow_mut();
            if let Some(bucket) = buckets.get_mut(&old) {
                bucket.shift_remove(uri);
                if bucket.is_empty() {
                    buckets.remove(&old);
                }
            }
        }
        if let Some(sub) = self.watches.borrow_mut().remove(uri) {
            sub.dispose();
        }
        Some(old)
    }

    pub(crate) fn value_of(&self, uri: &str) -> Option<Value> {
        self.current.borrow().get(uri).cloned()
    }

    pub(crate) fn bucket_uris(&self, key: &Value) -> Vec<Uri> {
        self.buckets
            .borrow()
            .get(key)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn bucket_len(&self, key: &Value) -> usize {
        self.buckets.borrow().get(key).map_or(0, IndexSet::len)
    }

    pub(crate) fn teardown(&self) {
        for (_, sub) in self.watches.borrow_mut().drain() {
            sub.dispose();
        }
        self.buckets.borrow_mut().clear();
        self.current.borrow_mut().clear();
    }
}
