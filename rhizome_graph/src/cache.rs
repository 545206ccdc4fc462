use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexSet;
use rhizome_reactivity::{Listeners, Value};

use crate::entity::{Entity, Kind, Uri};

/// Canonical filter list: `(index name, key)` pairs sorted by name so
/// equivalent queries share one cache.
pub(crate) type Filters = Vec<(Rc<str>, Value)>;

pub(crate) fn canonical_filters(mut filters: Filters) -> Filters {
    filters.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    filters
}

/// The shared, ref-counted materialization behind every [`crate::view::View`]
/// with the same `(kind, filters)` query. Membership updates always
/// precede listener dispatch.
pub(crate) struct QueryCache {
    pub(crate) kind: Kind,
    pub(crate) filters: Filters,
    uris: RefCell<IndexSet<Uri>>,
    pub(crate) added: Listeners<Entity>,
    pub(crate) removed: Listeners<Entity>,
    refs: Cell<usize>,
}

impl QueryCache {
    pub(crate) fn new(kind: Kind, filters: Filters) -> Self {
        Self {
            kind,
            filters,
            uris: RefCell::new(IndexSet::new()),
            added: Listeners::new(),
            removed: Listeners::new(),
            refs: Cell::new(0),
        }
    }

    /// Initial population; no listener dispatch.
    pub(crate) fn seed(&self, uris: impl IntoIterator<Item = Uri>) {
        let mut set = self.uris.borrow_mut();
        for uri in uris {
            set.insert(uri);
        }
    }

    pub(crate) fn insert(&self, entity: &Entity) -> bool {
        let fresh = self.uris.borrow_mut().insert(entity.uri());
        if fresh {
            self.added.emit(entity);
        }
        fresh
    }

    pub(crate) fn remove(&self, entity: &Entity) -> bool {
        let had = self.uris.borrow_mut().shift_remove(&entity.uri());
        if had {
            self.removed.emit(entity);
        }
        had
    }

    pub(crate) fn contains(&self, uri: &str) -> bool {
        self.uris.borrow().contains(uri)
    }

    pub(crate) fn uris(&self) -> Vec<Uri> {
        self.uris.borrow().iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.uris.borrow().len()
    }

    pub(crate) fn filters_on(&self, name: &str) -> bool {
        self.filters.iter().any(|(n, _)| &**n == name)
    }

    pub(crate) fn acquire(&self) {
        self.refs.set(self.refs.get() + 1);
    }

    /// Returns the remaining reference count.
    pub(crate) fn release(&self) -> usize {
        let next = self.refs.get().saturating_sub(1);
        self.refs.set(next);
        next
    }
}
