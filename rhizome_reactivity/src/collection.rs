use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::dispose::{Disposable, Subscription};
use crate::listeners::Listeners;
use crate::value::{IndexBinding, Value};

/// Something a [`Collection`] can hold: cheaply clonable, with a stable
/// identity and a lifecycle handle.
pub trait Item: Clone + 'static {
    /// Stable identity shared by all clones of the same underlying item.
    fn item_id(&self) -> usize;

    fn handle(&self) -> &Disposable;
}

/// One item crossing bucket boundaries inside an index. `from: None`
/// means the item just entered the index; `to: None` means it left.
pub struct BucketMove<T> {
    pub item: T,
    pub from: Option<Value>,
    pub to: Option<Value>,
}

struct CollectionIndex<T: Item> {
    getter: Box<dyn Fn(&T) -> IndexBinding>,
    buckets: RefCell<HashMap<Value, IndexMap<usize, T>>>,
    current: RefCell<HashMap<usize, Value>>,
    watches: RefCell<HashMap<usize, Subscription>>,
    moved: Listeners<BucketMove<T>>,
}

impl<T: Item> CollectionIndex<T> {
    fn new(getter: Box<dyn Fn(&T) -> IndexBinding>) -> Self {
        Self {
            getter,
            buckets: RefCell::new(HashMap::new()),
            current: RefCell::new(HashMap::new()),
            watches: RefCell::new(HashMap::new()),
            moved: Listeners::new(),
        }
    }

    fn install(index: &Rc<Self>, item: &T) {
        let binding = (index.getter)(item);
        let key = binding.current();
        let id = item.item_id();

        index
            .buckets
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .insert(id, item.clone());
        index.current.borrow_mut().insert(id, key.clone());

        if let Some(sig) = binding.signal() {
            let weak = Rc::downgrade(index);
            let item = item.clone();
            let sub = sig.watch(move |new, _old| {
                if let Some(index) = weak.upgrade() {
                    index.rebucket(&item, new.clone());
                }
            });
            index.watches.borrow_mut().insert(id, sub);
        }

        index.moved.emit(&BucketMove {
            item: item.clone(),
            from: None,
            to: Some(key),
        });
    }

    fn rebucket(&self, item: &T, new_key: Value) {
        let id = item.item_id();
        let old = self.current.borrow().get(&id).cloned();
        if old.as_ref() == Some(&new_key) {
            return;
        }
        if let Some(old_key) = &old {
            let mut buckets = self.buckets.borrow_mut();
            if let Some(bucket) = buckets.get_mut(old_key) {
                bucket.shift_remove(&id);
                if bucket.is_empty() {
                    buckets.remove(old_key);
                }
            }
        }
        self.buckets
            .borrow_mut()
            .entry(new_key.clone())
            .or_default()
            .insert(id, item.clone());
        self.current.borrow_mut().insert(id, new_key.clone());

        self.moved.emit(&BucketMove {
            item: item.clone(),
            from: old,
            to: Some(new_key),
        });
    }

    fn uninstall(&self, item: &T) {
        let id = item.item_id();
        let old = self.current.borrow_mut().remove(&id);
        if let Some(old_key) = &old {
            let mut buckets = self.buckets.borrow_mut();
            if let Some(bucket) = buckets.get_mut(old_key) {
                bucket.shift_remove(&id);
                if bucket.is_empty() {
                    buckets.remove(old_key);
                }
            }
        }
        if let Some(sub) = self.watches.borrow_mut().remove(&id) {
            sub.dispose();
        }
        if old.is_some() {
            self.moved.emit(&BucketMove {
                item: item.clone(),
                from: old,
                to: None,
            });
        }
    }

    fn bucket_items(&self, key: &Value) -> Vec<T> {
        self.buckets
            .borrow()
            .get(key)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    fn teardown(&self) {
        for (_, sub) in self.watches.borrow_mut().drain() {
            sub.dispose();
        }
        self.buckets.borrow_mut().clear();
        self.current.borrow_mut().clear();
        self.moved.clear();
    }
}

/// An ordered, deduplicating container of disposable items.
///
/// Items are keyed by identity; insertion order is iteration order.
/// `adopt` additionally takes ownership, so disposing the collection
/// disposes adopted items (LIFO). Indexes added with
/// [`Collection::add_index`] are maintained reactively and back the
/// live children returned by [`Collection::where_eq`].
pub struct Collection<T: Item> {
    inner: Rc<CollectionInner<T>>,
}

struct CollectionInner<T: Item> {
    handle: Disposable,
    /// Children produced by `where_eq` reject direct mutation.
    sealed: bool,
    items: RefCell<IndexMap<usize, T>>,
    owned: RefCell<HashSet<usize>>,
    added: Listeners<T>,
    removed: Listeners<T>,
    indexes: RefCell<IndexMap<Rc<str>, Rc<CollectionIndex<T>>>>,
}

impl<T: Item> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Collection<T> {
    pub fn new() -> Self {
        Self::build(false)
    }

    fn build(sealed: bool) -> Self {
        let inner = Rc::new(CollectionInner {
            handle: Disposable::new(),
            sealed,
            items: RefCell::new(IndexMap::new()),
            owned: RefCell::new(HashSet::new()),
            added: Listeners::new(),
            removed: Listeners::new(),
            indexes: RefCell::new(IndexMap::new()),
        });
        let weak = Rc::downgrade(&inner);
        inner.handle.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                CollectionInner::teardown(&inner);
            }
        });
        Self { inner }
    }

    /// Appends without taking ownership. Returns false on duplicates,
    /// on a disposed collection, and on `where_eq` children (mutation
    /// must flow through the parent).
    pub fn add(&self, item: T) -> bool {
        if self.inner.sealed {
            tracing::warn!(target: "rhizome", "direct add to a filtered child collection rejected");
            return false;
        }
        self.insert(item, false)
    }

    /// Appends and takes ownership: the item is disposed with the
    /// collection.
    pub fn adopt(&self, item: T) -> bool {
        if self.inner.sealed {
            tracing::warn!(target: "rhizome", "direct adopt to a filtered child collection rejected");
            return false;
        }
        self.insert(item, true)
    }

    fn insert(&self, item: T, own: bool) -> bool {
        if self.inner.handle.is_disposed() {
            return false;
        }
        let id = item.item_id();
        if self.inner.items.borrow().contains_key(&id) {
            return false;
        }
        self.inner.items.borrow_mut().insert(id, item.clone());
        if own {
            self.inner.owned.borrow_mut().insert(id);
            item.handle().set_parent(&self.inner.handle);
        }
        let indexes: Vec<_> = self.inner.indexes.borrow().values().cloned().collect();
        for index in indexes {
            CollectionIndex::install(&index, &item);
        }
        self.inner.added.emit(&item);
        true
    }

    /// Removes the first item matching `pred` and disposes it.
    pub fn delete(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let item = self.iter().find(|i| pred(i))?;
        self.take(&item);
        item.handle().dispose();
        Some(item)
    }

    /// Removes the first item matching `pred` *without* disposing it —
    /// the move half of a transfer between owners.
    pub fn extract(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let item = self.iter().find(|i| pred(i))?;
        let owned = self.inner.owned.borrow().contains(&item.item_id());
        self.take(&item);
        if owned {
            item.handle().clear_parent();
        }
        Some(item)
    }

    /// Identity-keyed removal without disposal; fires `on_removed`.
    pub fn take_by_id(&self, id: usize) -> Option<T> {
        let item = self.inner.items.borrow().get(&id).cloned()?;
        let owned = self.inner.owned.borrow().contains(&id);
        self.take(&item);
        if owned {
            item.handle().clear_parent();
        }
        Some(item)
    }

    fn take(&self, item: &T) -> bool {
        let id = item.item_id();
        if self.inner.items.borrow_mut().shift_remove(&id).is_none() {
            return false;
        }
        self.inner.owned.borrow_mut().remove(&id);
        let indexes: Vec<_> = self.inner.indexes.borrow().values().cloned().collect();
        for index in indexes {
            index.uninstall(item);
        }
        self.inner.removed.emit(item);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = T> {
        self.inner
            .items
            .borrow()
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    pub fn contains_id(&self, id: usize) -> bool {
        self.inner.items.borrow().contains_key(&id)
    }

    pub fn get_by_id(&self, id: usize) -> Option<T> {
        self.inner.items.borrow().get(&id).cloned()
    }

    pub fn on_added(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.inner.added.subscribe(f)
    }

    pub fn on_removed(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.inner.removed.subscribe(f)
    }

    /// Registers a computed key over the items. A signal-valued binding
    /// is watched per item; key changes move the item between buckets
    /// and update every live `where_eq` child.
    ///
    /// # Panics
    ///
    /// If an index with this name already exists.
    pub fn add_index(&self, name: &str, getter: impl Fn(&T) -> IndexBinding + 'static) {
        let mut indexes = self.inner.indexes.borrow_mut();
        assert!(
            !indexes.contains_key(name),
            "index '{name}' already registered"
        );
        let index = Rc::new(CollectionIndex::new(Box::new(getter)));
        indexes.insert(Rc::from(name), index.clone());
        drop(indexes);

        for item in self.iter() {
            CollectionIndex::install(&index, &item);
        }
    }

    /// A live child restricted to one index bucket. The child follows
    /// the parent (adds, removes, key changes) and is torn down with it.
    ///
    /// # Panics
    ///
    /// If `index` names no registered index.
    pub fn where_eq(&self, index: &str, key: impl Into<Value>) -> Collection<T> {
        let key = key.into();
        let index = self
            .inner
            .indexes
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_else(|| panic!("unknown index '{index}'"));

        let child = Self::build(true);
        child.inner.handle.set_parent(&self.inner.handle);
        for item in index.bucket_items(&key) {
            child.insert(item, false);
        }

        let weak = Rc::downgrade(&child.inner);
        let sub = index.moved.subscribe(move |mv| {
            let Some(inner) = weak.upgrade() else { return };
            let child = Collection { inner };
            if mv.to.as_ref() == Some(&key) {
                child.insert(mv.item.clone(), false);
            } else if mv.from.as_ref() == Some(&key) {
                child.take(&mv.item);
            }
        });
        sub.set_parent(&child.inner.handle);
        child
    }

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.handle.is_disposed()
    }

    /// Disposes adopted items (LIFO), detaches listeners and index
    /// watches, and cascades to `where_eq` children.
    pub fn dispose(&self) {
        self.inner.handle.dispose();
    }
}

impl<T: Item> CollectionInner<T> {
    fn teardown(inner: &Rc<Self>) {
        let indexes: Vec<_> = inner.indexes.borrow_mut().drain(..).collect();
        for (_, index) in indexes {
            index.teardown();
        }
        inner.added.clear();
        inner.removed.clear();

        let items = std::mem::take(&mut *inner.items.borrow_mut());
        let owned = std::mem::take(&mut *inner.owned.borrow_mut());
        for (id, item) in items.iter().rev() {
            if owned.contains(id) {
                item.handle().dispose();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use std::cell::Cell;

    #[derive(Clone)]
    struct Ticket {
        inner: Rc<TicketInner>,
    }

    struct TicketInner {
        name: &'static str,
        state: Signal<Value>,
        handle: Disposable,
    }

    impl Ticket {
        fn new(name: &'static str, state: &str) -> Self {
            Self {
                inner: Rc::new(TicketInner {
                    name,
                    state: Signal::new(Value::from(state)),
                    handle: Disposable::new(),
                }),
            }
        }
    }

    impl Item for Ticket {
        fn item_id(&self) -> usize {
            Rc::as_ptr(&self.inner) as usize
        }

        fn handle(&self) -> &Disposable {
            &self.inner.handle
        }
    }

    #[test]
    fn test_add_dedupes_and_keeps_order() {
        let col: Collection<Ticket> = Collection::new();
        let a = Ticket::new("a", "open");
        let b = Ticket::new("b", "open");

        assert!(col.add(a.clone()));
        assert!(!col.add(a.clone()));
        assert!(col.add(b));
        let names: Vec<_> = col.iter().map(|t| t.inner.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_delete_disposes_extract_does_not() {
        let col: Collection<Ticket> = Collection::new();
        let a = Ticket::new("a", "open");
        let b = Ticket::new("b", "open");
        col.adopt(a.clone());
        col.adopt(b.clone());

        col.delete(|t| t.inner.name == "a");
        assert!(a.handle().is_disposed());

        let moved = col.extract(|t| t.inner.name == "b").unwrap();
        assert!(!moved.handle().is_disposed());
        assert!(col.is_empty());

        // Extracted items survive collection disposal.
        col.dispose();
        assert!(!moved.handle().is_disposed());
    }

    #[test]
    fn test_dispose_owns_adopted_items_lifo() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let col: Collection<Ticket> = Collection::new();
        for name in ["x", "y"] {
            let t = Ticket::new(name, "open");
            let order = order.clone();
            t.handle().on_dispose(move || order.borrow_mut().push(name));
            col.adopt(t);
        }
        col.dispose();
        assert_eq!(*order.borrow(), vec!["y", "x"]);
    }

    #[test]
    fn test_where_eq_tracks_bucket_moves() {
        let col: Collection<Ticket> = Collection::new();
        col.add_index("by_state", |t: &Ticket| {
            IndexBinding::Reactive(t.inner.state.clone())
        });

        let a = Ticket::new("a", "open");
        col.add(a.clone());

        let open = col.where_eq("by_state", "open");
        let closed = col.where_eq("by_state", "closed");
        assert_eq!(open.len(), 1);
        assert_eq!(closed.len(), 0);

        let gained = Rc::new(Cell::new(0));
        let _sub = {
            let gained = gained.clone();
            closed.on_added(move |_| gained.set(gained.get() + 1))
        };

        a.inner.state.set(Value::from("closed"));
        assert_eq!(open.len(), 0);
        assert_eq!(closed.len(), 1);
        assert_eq!(gained.get(), 1);
    }

    #[test]
    fn test_where_child_rejects_direct_mutation() {
        let col: Collection<Ticket> = Collection::new();
        col.add_index("by_state", |t: &Ticket| {
            IndexBinding::Const(t.inner.state.get())
        });
        let child = col.where_eq("by_state", "open");
        assert!(!child.add(Ticket::new("z", "open")));
        assert!(child.is_empty());
    }

    #[test]
    fn test_later_index_covers_existing_items() {
        let col: Collection<Ticket> = Collection::new();
        let a = Ticket::new("a", "open");
        col.add(a);
        col.add_index("by_state", |t: &Ticket| {
            IndexBinding::Reactive(t.inner.state.clone())
        });
        assert_eq!(col.where_eq("by_state", "open").len(), 1);
    }

    #[test]
    fn test_parent_disposal_cascades_to_where_children() {
        let col: Collection<Ticket> = Collection::new();
        col.add_index("by_state", |t: &Ticket| {
            IndexBinding::Const(t.inner.state.get())
        });
        let child = col.where_eq("by_state", "open");
        col.dispose();
        assert!(child.is_disposed());
    }
}
