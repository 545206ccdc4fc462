use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::collection::Item;
use crate::dispose::{Disposable, Subscription};
use crate::listeners::Listeners;

/// Insertion-ordered container, duplicates allowed. The unindexed
/// little sibling of [`crate::collection::Collection`].
pub struct List<T: Item> {
    inner: Rc<ListInner<T>>,
}

struct ListInner<T: 'static> {
    handle: Disposable,
    items: RefCell<Vec<T>>,
    added: Listeners<T>,
    removed: Listeners<T>,
}

impl<T: Item> Clone for List<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> List<T> {
    pub fn new() -> Self {
        let inner = Rc::new(ListInner {
            handle: Disposable::new(),
            items: RefCell::new(Vec::new()),
            added: Listeners::new(),
            removed: Listeners::new(),
        });
        let weak = Rc::downgrade(&inner);
        inner.handle.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                inner.items.borrow_mut().clear();
                inner.added.clear();
                inner.removed.clear();
            }
        });
        Self { inner }
    }

    pub fn push(&self, item: T) {
        if self.inner.handle.is_disposed() {
            return;
        }
        self.inner.items.borrow_mut().push(item.clone());
        self.inner.added.emit(&item);
    }

    /// Removes the first match and disposes it.
    pub fn delete(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let item = self.remove_first(pred)?;
        item.handle().dispose();
        Some(item)
    }

    /// Removes the first match without disposing.
    pub fn extract(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.remove_first(pred)
    }

    fn remove_first(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let idx = self.inner.items.borrow().iter().position(|i| pred(i))?;
        let item = self.inner.items.borrow_mut().remove(idx);
        self.inner.removed.emit(&item);
        Some(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> {
        self.inner.items.borrow().clone().into_iter()
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    pub fn on_added(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.inner.added.subscribe(f)
    }

    pub fn on_removed(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.inner.removed.subscribe(f)
    }

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }

    pub fn dispose(&self) {
        self.inner.handle.dispose();
    }
}

/// Reference-keyed deduplicating container.
pub struct Set<T: Item> {
    inner: Rc<SetInner<T>>,
}

struct SetInner<T: 'static> {
    handle: Disposable,
    items: RefCell<IndexMap<usize, T>>,
    added: Listeners<T>,
    removed: Listeners<T>,
}

impl<T: Item> Clone for Set<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item> Default for Set<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Set<T> {
    pub fn new() -> Self {
        let inner = Rc::new(SetInner {
            handle: Disposable::new(),
            items: RefCell::new(IndexMap::new()),
            added: Listeners::new(),
            removed: Listeners::new(),
        });
        let weak = Rc::downgrade(&inner);
        inner.handle.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                inner.items.borrow_mut().clear();
                inner.added.clear();
                inner.removed.clear();
            }
        });
        Self { inner }
    }

    pub fn insert(&self, item: T) -> bool {
        if self.inner.handle.is_disposed() {
            return false;
        }
        let id = item.item_id();
        if self.inner.items.borrow().contains_key(&id) {
            return false;
        }
        self.inner.items.borrow_mut().insert(id, item.clone());
        self.inner.added.emit(&item);
        true
    }

    pub fn remove(&self, item: &T) -> bool {
        let taken = self.inner.items.borrow_mut().shift_remove(&item.item_id());
        match taken {
            Some(item) => {
                self.inner.removed.emit(&item);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.items.borrow().contains_key(&item.item_id())
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

    pub fn on_added(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.inner.added.subscribe(f)
    }

    pub fn on_removed(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.inner.removed.subscribe(f)
    }

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }

    pub fn dispose(&self) {
        self.inner.handle.dispose();
    }
}
