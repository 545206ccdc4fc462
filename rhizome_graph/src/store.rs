use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use rhizome_reactivity::{Disposable, IndexBinding, Listeners, Subscription, Value, shielded};

use crate::cache::{Filters, QueryCache, canonical_filters};
use crate::edge::{Edge, PARENT_EDGE, SiblingChain};
use crate::entity::{Entity, Kind, Uri};
use crate::error::StoreError;
use crate::index::{KeyChange, StoreIndex};
use crate::traverse::{Traversal, TraverseOptions};
use crate::view::View;

/// The single mutator of the graph.
///
/// Holds entities by URI, typed directed edges (outgoing, reverse, and
/// a sibling chain per `(to, kind)`), reactive indexes, event listener
/// sets, and the ref-counted query caches that back [`View`]s. All
/// callbacks fire synchronously inside the mutating call; per-listener
/// bookkeeping is snapshotted first, so listeners may re-enter the
/// store.
pub struct EntityStore {
    inner: Rc<StoreInner>,
}

pub(crate) struct StoreInner {
    handle: Disposable,
    entities: RefCell<HashMap<Uri, Entity>>,
    kinds: RefCell<HashMap<Kind, IndexSet<Uri>>>,
    outgoing: RefCell<HashMap<Uri, Vec<Edge>>>,
    incoming: RefCell<HashMap<Uri, Vec<Edge>>>,
    chains: RefCell<HashMap<(Uri, Kind), SiblingChain>>,
    /// Keyed `"kind:name"`.
    indexes: RefCell<HashMap<String, Rc<StoreIndex>>>,
    kind_added: RefCell<HashMap<Kind, Listeners<Entity>>>,
    kind_removed: RefCell<HashMap<Kind, Listeners<Entity>>>,
    any_added: Listeners<Entity>,
    any_removed: Listeners<Entity>,
    edge_added: RefCell<HashMap<Kind, Listeners<Edge>>>,
    edge_removed: RefCell<HashMap<Kind, Listeners<Edge>>>,
    index_changed: RefCell<HashMap<String, Listeners<KeyChange>>>,
    entity_cleanups: RefCell<HashMap<Uri, Vec<Box<dyn FnOnce()>>>>,
    caches: RefCell<HashMap<(Kind, Filters), Rc<QueryCache>>>,
    /// Guards the `parent`-edge cascade against ownership cycles.
    disposing: RefCell<HashSet<Uri>>,
}

impl Clone for EntityStore {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

fn index_key(kind: &str, name: &str) -> String {
    format!("{kind}:{name}")
}

impl EntityStore {
    pub fn new() -> Self {
        let inner = Rc::new(StoreInner {
            handle: Disposable::new(),
            entities: RefCell::new(HashMap::new()),
            kinds: RefCell::new(HashMap::new()),
            outgoing: RefCell::new(HashMap::new()),
            incoming: RefCell::new(HashMap::new()),
            chains: RefCell::new(HashMap::new()),
            indexes: RefCell::new(HashMap::new()),
            kind_added: RefCell::new(HashMap::new()),
            kind_removed: RefCell::new(HashMap::new()),
            any_added: Listeners::new(),
            any_removed: Listeners::new(),
            edge_added: RefCell::new(HashMap::new()),
            edge_removed: RefCell::new(HashMap::new()),
            index_changed: RefCell::new(HashMap::new()),
            entity_cleanups: RefCell::new(HashMap::new()),
            caches: RefCell::new(HashMap::new()),
            disposing: RefCell::new(HashSet::new()),
        });
        let weak = Rc::downgrade(&inner);
        inner.handle.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                let store = EntityStore { inner };
                store.teardown();
            }
        });
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<StoreInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // --- Entity CRUD ---

    /// Inserts an entity under `kind`, wiring indexes and firing add
    /// listeners. The store owns the entity from here on.
    ///
    /// # Panics
    ///
    /// On a duplicate URI or an entity that already joined a store.
    pub fn add(&self, entity: Entity, kind: &str) -> Entity {
        self.try_add(entity, kind).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_add(&self, entity: Entity, kind: &str) -> Result<Entity, StoreError> {
        self.try_add_with_edges(entity, kind, &[])
    }

    /// Insert plus initial edges from the new entity: `(edge_kind, to)`
    /// pairs, created before any add listener fires.
    ///
    /// # Panics
    ///
    /// As [`EntityStore::add`].
    pub fn add_with_edges(&self, entity: Entity, kind: &str, edges: &[(&str, &str)]) -> Entity {
        self.try_add_with_edges(entity, kind, edges)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_add_with_edges(
        &self,
        entity: Entity,
        kind: &str,
        edges: &[(&str, &str)],
    ) -> Result<Entity, StoreError> {
        let uri = entity.uri();
        if self.inner.entities.borrow().contains_key(&uri) {
            return Err(StoreError::DuplicateUri(uri.to_string()));
        }
        let kind: Kind = Rc::from(kind);
        entity.assign_kind(kind.clone())?;

        self.inner
            .entities
            .borrow_mut()
            .insert(uri.clone(), entity.clone());
        self.inner
            .kinds
            .borrow_mut()
            .entry(kind.clone())
            .or_default()
            .insert(uri.clone());

        let indexes: Vec<Rc<StoreIndex>> = self
            .inner
            .indexes
            .borrow()
            .values()
            .filter(|idx| idx.kind == kind)
            .cloned()
            .collect();
        for index in indexes {
            self.install_index_entry(&index, &entity);
        }

        for (edge_kind, to) in edges {
            // The source is the entity we just inserted, so this can
            // only be a duplicate no-op, never a contract violation.
            let _ = self.try_add_edge(&uri, edge_kind, to);
        }

        self.update_caches_on_add(&entity, &kind);

        let kind_listeners = self.inner.kind_added.borrow().get(&kind).cloned();
        if let Some(listeners) = kind_listeners {
            listeners.emit(&entity);
        }
        self.inner.any_added.emit(&entity);
        Ok(entity)
    }

    pub fn get(&self, uri: &str) -> Option<Entity> {
        self.inner.entities.borrow().get(uri).cloned()
    }

    pub fn has(&self, uri: &str) -> bool {
        self.inner.entities.borrow().contains_key(uri)
    }

    pub fn kind_of(&self, uri: &str) -> Option<Kind> {
        self.get(uri).and_then(|e| e.kind())
    }

    pub fn count(&self) -> usize {
        self.inner.entities.borrow().len()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.inner.kinds.borrow().get(kind).map_or(0, IndexSet::len)
    }

    /// Entities of one kind, in insertion order.
    pub fn of_kind(&self, kind: &str) -> Vec<Entity> {
        let uris: Vec<Uri> = self
            .inner
            .kinds
            .borrow()
            .get(kind)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        uris.into_iter().filter_map(|u| self.get(&u)).collect()
    }

    pub fn iter(&self) -> Vec<Entity> {
        self.inner.entities.borrow().values().cloned().collect()
    }

    pub fn iter_kind(&self, kind: &str) -> Vec<Entity> {
        self.of_kind(kind)
    }

    // --- Edges ---

    /// # Panics
    ///
    /// When `from` is not in the store.
    pub fn add_edge(&self, from: &str, kind: &str, to: &str) -> bool {
        self.try_add_edge(from, kind, to)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Returns false (and does nothing) for an exact duplicate edge.
    pub fn try_add_edge(&self, from: &str, kind: &str, to: &str) -> Result<bool, StoreError> {
        self.link_edge(Edge::new(from, kind, to), false)
    }

    /// As [`EntityStore::add_edge`], but the edge lands at the *front*
    /// of the source's outgoing list and of the sibling chain.
    pub fn prepend_edge(&self, from: &str, kind: &str, to: &str) -> bool {
        self.try_prepend_edge(from, kind, to)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_prepend_edge(&self, from: &str, kind: &str, to: &str) -> Result<bool, StoreError> {
        self.link_edge(Edge::new(from, kind, to), true)
    }

    fn link_edge(&self, edge: Edge, front: bool) -> Result<bool, StoreError> {
        if !self.has(&edge.from) {
            return Err(StoreError::MissingEdgeSource(edge.from.to_string()));
        }
        if self
            .inner
            .outgoing
            .borrow()
            .get(&edge.from)
            .is_some_and(|list| list.contains(&edge))
        {
            return Ok(false);
        }

        {
            let mut outgoing = self.inner.outgoing.borrow_mut();
            let list = outgoing.entry(edge.from.clone()).or_default();
            if front {
                list.insert(0, edge.clone());
            } else {
                list.push(edge.clone());
            }
        }
        {
            let mut incoming = self.inner.incoming.borrow_mut();
            let list = incoming.entry(edge.to.clone()).or_default();
            if front {
                list.insert(0, edge.clone());
            } else {
                list.push(edge.clone());
            }
        }
        {
            let mut chains = self.inner.chains.borrow_mut();
            let chain = chains
                .entry((edge.to.clone(), edge.kind.clone()))
                .or_default();
            if front {
                chain.push_front(edge.from.clone());
            } else {
                chain.push_back(edge.from.clone());
            }
        }

        let listeners = self.inner.edge_added.borrow().get(&edge.kind).cloned();
        if let Some(listeners) = listeners {
            listeners.emit(&edge);
        }
        Ok(true)
    }

    /// Removes one edge; restores outgoing, reverse, and sibling-chain
    /// structures exactly as before the matching add. Absent edges are
    /// a no-op.
    pub fn remove_edge(&self, from: &str, kind: &str, to: &str) -> bool {
        self.unlink_edge(&Edge::new(from, kind, to))
    }

    fn unlink_edge(&self, edge: &Edge) -> bool {
        {
            let mut outgoing = self.inner.outgoing.borrow_mut();
            let Some(list) = outgoing.get_mut(&edge.from) else {
                return false;
            };
            let Some(pos) = list.iter().position(|e| e == edge) else {
                return false;
            };
            list.remove(pos);
            if list.is_empty() {
                outgoing.remove(&edge.from);
            }
        }
        {
            let mut incoming = self.inner.incoming.borrow_mut();
            if let Some(list) = incoming.get_mut(&edge.to) {
                if let Some(pos) = list.iter().position(|e| e == edge) {
                    list.remove(pos);
                }
                if list.is_empty() {
                    incoming.remove(&edge.to);
                }
            }
        }
        {
            let mut chains = self.inner.chains.borrow_mut();
            let chain_key = (edge.to.clone(), edge.kind.clone());
            if let Some(chain) = chains.get_mut(&chain_key) {
                chain.unlink(&edge.from);
                if chain.is_empty() {
                    chains.remove(&chain_key);
                }
            }
        }

        let listeners = self.inner.edge_removed.borrow().get(&edge.kind).cloned();
        if let Some(listeners) = listeners {
            listeners.emit(edge);
        }
        true
    }

    pub fn has_edge(&self, from: &str, kind: &str, to: &str) -> bool {
        self.inner
            .outgoing
            .borrow()
            .get(from)
            .is_some_and(|list| {
                list.iter()
                    .any(|e| &*e.kind == kind && &*e.to == to)
            })
    }

    pub fn edges_from(&self, uri: &str) -> Vec<Edge> {
        self.inner
            .outgoing
            .borrow()
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    pub fn edges_to(&self, uri: &str) -> Vec<Edge> {
        self.inner
            .incoming
            .borrow()
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    // --- Indexes ---

    /// Registers a computed key for entities of `kind`. Signal-valued
    /// bindings are watched from insertion to disposal; key changes
    /// move bucket membership and update affected views before the
    /// write returns. Existing entities are indexed immediately.
    ///
    /// # Panics
    ///
    /// If the index is already registered.
    pub fn add_index(
        &self,
        kind: &str,
        name: &str,
        getter: impl Fn(&Entity) -> IndexBinding + 'static,
    ) {
        let key = index_key(kind, name);
        {
            let mut indexes = self.inner.indexes.borrow_mut();
            assert!(
                !indexes.contains_key(&key),
                "index '{key}' already registered"
            );
            indexes.insert(
                key.clone(),
                Rc::new(StoreIndex::new(
                    Rc::from(kind),
                    Rc::from(name),
                    Rc::new(getter),
                )),
            );
        }
        let index = self.index_of(kind, name).expect("just registered");
        for entity in self.of_kind(kind) {
            self.install_index_entry(&index, &entity);
        }
    }

    pub(crate) fn index_of(&self, kind: &str, name: &str) -> Option<Rc<StoreIndex>> {
        self.inner.indexes.borrow().get(&index_key(kind, name)).cloned()
    }

    fn install_index_entry(&self, index: &Rc<StoreIndex>, entity: &Entity) {
        let binding = index.bind(entity);
        index.install(entity.uri(), binding.current());

        if let Some(sig) = binding.signal() {
            let weak_store = self.downgrade();
            let weak_index = Rc::downgrade(index);
            let uri = entity.uri();
            let entity = entity.clone();
            let sub = sig.watch(move |new, _old| {
                if let Some(store) = EntityStore::upgrade(&weak_store)
                    && let Some(index) = weak_index.upgrade()
                {
                    store.reindex(&index, &entity, new.clone());
                }
            });
            index.store_watch(uri, sub);
        }
    }

    fn reindex(&self, index: &Rc<StoreIndex>, entity: &Entity, new: Value) {
        let uri = entity.uri();
        let Some(old) = index.apply(&uri, new.clone()) else {
            return;
        };

        // Views losing the entity hear about it before views gaining it.
        let affected: Vec<Rc<QueryCache>> = self
            .inner
            .caches
            .borrow()
            .values()
            .filter(|c| c.kind == index.kind && c.filters_on(&index.name))
            .cloned()
            .collect();
        let mut joining = Vec::new();
        for cache in affected {
            let matches = self.entity_matches_filters(entity, &cache.filters);
            if cache.contains(&uri) {
                if !matches {
                    cache.remove(entity);
                }
            } else if matches {
                joining.push(cache);
            }
        }
        for cache in joining {
            cache.insert(entity);
        }

        let listeners = self
            .inner
            .index_changed
            .borrow()
            .get(&index_key(&index.kind, &index.name))
            .cloned();
        if let Some(listeners) = listeners {
            listeners.emit(&KeyChange {
                entity: entity.clone(),
                from: old,
                to: new,
            });
        }
    }

    /// Entities of `kind` whose index `name` currently equals `key`.
    ///
    /// # Panics
    ///
    /// On an unknown index.
    pub fn get_by(&self, kind: &str, name: &str, key: impl Into<Value>) -> Vec<Entity> {
        let index = self
            .index_of(kind, name)
            .unwrap_or_else(|| panic!("unknown index '{}'", index_key(kind, name)));
        index
            .bucket_uris(&key.into())
            .into_iter()
            .filter_map(|u| self.get(&u))
            .collect()
    }

    pub fn get_one(&self, kind: &str, name: &str, key: impl Into<Value>) -> Option<Entity> {
        self.get_by(kind, name, key).into_iter().next()
    }

    pub(crate) fn entity_matches_filters(&self, entity: &Entity, filters: &Filters) -> bool {
        let Some(kind) = entity.kind() else {
            return false;
        };
        filters.iter().all(|(name, want)| {
            self.index_of(&kind, name)
                .and_then(|idx| idx.value_of(&entity.uri()))
                .as_ref()
                == Some(want)
        })
    }

    // --- Query caches ---

    pub(crate) fn acquire_cache(&self, kind: &str, filters: Filters) -> Rc<QueryCache> {
        let filters = canonical_filters(filters);
        let kind: Kind = Rc::from(kind);
        let key = (kind.clone(), filters.clone());
        if let Some(cache) = self.inner.caches.borrow().get(&key) {
            cache.acquire();
            return cache.clone();
        }

        for (name, _) in &filters {
            assert!(
                self.index_of(&kind, name).is_some(),
                "unknown index '{}'",
                index_key(&kind, name)
            );
        }

        let cache = Rc::new(QueryCache::new(kind.clone(), filters.clone()));
        if filters.is_empty() {
            let uris: Vec<Uri> = self
                .inner
                .kinds
                .borrow()
                .get(&kind)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            cache.seed(uris);
        } else {
            // Seed from the smallest applicable bucket, then apply the
            // full filter set.
            let (seed_name, seed_key) = filters
                .iter()
                .min_by_key(|(name, key)| {
                    self.index_of(&kind, name)
                        .map_or(usize::MAX, |idx| idx.bucket_len(key))
                })
                .expect("filters are non-empty")
                .clone();
            let candidates = self
                .index_of(&kind, &seed_name)
                .expect("validated above")
                .bucket_uris(&seed_key);
            let matching = candidates.into_iter().filter(|uri| {
                self.get(uri)
                    .is_some_and(|e| self.entity_matches_filters(&e, &filters))
            });
            cache.seed(matching);
        }

        cache.acquire();
        self.inner.caches.borrow_mut().insert(key, cache.clone());
        cache
    }

    pub(crate) fn release_cache(&self, cache: &Rc<QueryCache>) {
        if cache.release() == 0 {
            self.inner
                .caches
                .borrow_mut()
                .remove(&(cache.kind.clone(), cache.filters.clone()));
        }
    }

    fn update_caches_on_add(&self, entity: &Entity, kind: &Kind) {
        let caches: Vec<Rc<QueryCache>> = self
            .inner
            .caches
            .borrow()
            .values()
            .filter(|c| c.kind == *kind)
            .cloned()
            .collect();
        for cache in caches {
            if self.entity_matches_filters(entity, &cache.filters) {
                cache.insert(entity);
            }
        }
    }

    // --- Views ---

    pub fn view(&self, kind: &str) -> View {
        View::new(self, kind, Vec::new())
    }

    pub fn where_eq(&self, kind: &str, index: &str, key: impl Into<Value>) -> View {
        self.view(kind).where_eq(index, key)
    }

    // --- Disposal ---

    /// Removes `uri` and everything it owns.
    ///
    /// Entities connected by an incoming `parent` edge are disposed
    /// first, LIFO. Each disposal runs per-entity cleanups (LIFO),
    /// unindexes, removes every edge in both directions, updates query
    /// caches, then fires kind and global removed listeners before the
    /// entry is deleted. Disposing an absent URI is a no-op.
    pub fn dispose_entity(&self, uri: &str) -> bool {
        let Some(entity) = self.get(uri) else {
            return false;
        };
        let uri = entity.uri();
        if !self.inner.disposing.borrow_mut().insert(uri.clone()) {
            return false;
        }

        let children: Vec<Uri> = self
            .inner
            .incoming
            .borrow()
            .get(&uri)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|e| &*e.kind == PARENT_EDGE)
                    .map(|e| e.from.clone())
                    .collect()
            })
            .unwrap_or_default();
        for child in children.into_iter().rev() {
            self.dispose_entity(&child);
        }

        let cleanups = self
            .inner
            .entity_cleanups
            .borrow_mut()
            .remove(&uri)
            .unwrap_or_default();
        for f in cleanups.into_iter().rev() {
            shielded("entity cleanup", f);
        }

        if let Some(kind) = entity.kind() {
            let indexes: Vec<Rc<StoreIndex>> = self
                .inner
                .indexes
                .borrow()
                .values()
                .filter(|idx| idx.kind == kind)
                .cloned()
                .collect();
            for index in indexes {
                index.uninstall(&uri);
            }
        }

        for edge in self.edges_from(&uri) {
            self.unlink_edge(&edge);
        }
        for edge in self.edges_to(&uri) {
            self.unlink_edge(&edge);
        }

        let kind = entity.kind();
        if let Some(kind) = &kind {
            if let Some(set) = self.inner.kinds.borrow_mut().get_mut(kind) {
                set.shift_remove(&uri);
            }

            let caches: Vec<Rc<QueryCache>> = self
                .inner
                .caches
                .borrow()
                .values()
                .filter(|c| c.kind == *kind)
                .cloned()
                .collect();
            for cache in caches {
                cache.remove(&entity);
            }

            let listeners = self.inner.kind_removed.borrow().get(kind).cloned();
            if let Some(listeners) = listeners {
                listeners.emit(&entity);
            }
        }
        self.inner.any_removed.emit(&entity);

        self.inner.entities.borrow_mut().remove(&uri);
        self.inner.disposing.borrow_mut().remove(&uri);
        entity.handle().dispose();
        true
    }

    /// Registers a cleanup run (LIFO) when `uri` is disposed. For an
    /// absent URI the cleanup runs immediately.
    pub fn on_entity_disposed(&self, uri: &str, f: impl FnOnce() + 'static) {
        if !self.has(uri) {
            shielded("entity cleanup (late)", f);
            return;
        }
        self.inner
            .entity_cleanups
            .borrow_mut()
            .entry(Rc::from(uri))
            .or_default()
            .push(Box::new(f));
    }

    // --- Events ---

    pub fn on_added(&self, kind: &str, f: impl Fn(&Entity) + 'static) -> Subscription {
        self.inner
            .kind_added
            .borrow_mut()
            .entry(Rc::from(kind))
            .or_default()
            .subscribe(f)
    }

    pub fn on_removed(&self, kind: &str, f: impl Fn(&Entity) + 'static) -> Subscription {
        self.inner
            .kind_removed
            .borrow_mut()
            .entry(Rc::from(kind))
            .or_default()
            .subscribe(f)
    }

    pub fn on_any_added(&self, f: impl Fn(&Entity) + 'static) -> Subscription {
        self.inner.any_added.subscribe(f)
    }

    pub fn on_any_removed(&self, f: impl Fn(&Entity) + 'static) -> Subscription {
        self.inner.any_removed.subscribe(f)
    }

    pub fn on_edge_added(&self, kind: &str, f: impl Fn(&Edge) + 'static) -> Subscription {
        self.inner
            .edge_added
            .borrow_mut()
            .entry(Rc::from(kind))
            .or_default()
            .subscribe(f)
    }

    pub fn on_edge_removed(&self, kind: &str, f: impl Fn(&Edge) + 'static) -> Subscription {
        self.inner
            .edge_removed
            .borrow_mut()
            .entry(Rc::from(kind))
            .or_default()
            .subscribe(f)
    }

    /// Fires after an indexed key moved buckets (and the affected views
    /// were updated).
    pub fn on_index_changed(
        &self,
        kind: &str,
        name: &str,
        f: impl Fn(&KeyChange) + 'static,
    ) -> Subscription {
        self.inner
            .index_changed
            .borrow_mut()
            .entry(index_key(kind, name))
            .or_default()
            .subscribe(f)
    }

    // --- Navigation ---

    /// The target of the first outgoing edge of `kind`, O(out-degree).
    pub fn parent_of(&self, uri: &str, kind: &str) -> Option<Entity> {
        let to = self
            .inner
            .outgoing
            .borrow()
            .get(uri)?
            .iter()
            .find(|e| &*e.kind == kind)
            .map(|e| e.to.clone())?;
        self.get(&to)
    }

    /// Siblings preceding `uri` in the chain under its `kind`-parent,
    /// nearest first.
    pub fn siblings_before(&self, uri: &str, kind: &str) -> Vec<Entity> {
        self.sibling_walk(uri, kind, false)
    }

    /// Siblings following `uri`, nearest first.
    pub fn siblings_after(&self, uri: &str, kind: &str) -> Vec<Entity> {
        self.sibling_walk(uri, kind, true)
    }

    fn sibling_walk(&self, uri: &str, kind: &str, forward: bool) -> Vec<Entity> {
        let Some(parent) = self.parent_of(uri, kind) else {
            return Vec::new();
        };
        let uris = {
            let chains = self.inner.chains.borrow();
            match chains.get(&(parent.uri(), Rc::from(kind))) {
                Some(chain) => chain.walk_from(uri, false, forward),
                None => Vec::new(),
            }
        };
        uris.into_iter().filter_map(|u| self.get(&u)).collect()
    }

    /// `uri` first, then each `kind`-parent up to the root. Cycles are
    /// cut at the first repeat.
    pub fn path_to_root(&self, uri: &str, kind: &str) -> Vec<Entity> {
        let mut out = Vec::new();
        let mut seen: HashSet<Uri> = HashSet::new();
        let mut cursor = self.get(uri);
        while let Some(entity) = cursor {
            if !seen.insert(entity.uri()) {
                break;
            }
            cursor = self.parent_of(&entity.uri(), kind);
            out.push(entity);
        }
        out
    }

    // --- Traversal ---

    /// A live, path-aware traversal from `start`. The result stays
    /// synchronized with the graph until disposed.
    pub fn bfs(&self, start: &str, opts: TraverseOptions) -> Traversal {
        Traversal::spawn(self, start, opts)
    }

    /// Same engine as [`EntityStore::bfs`]; emission order is governed
    /// by [`TraverseOptions::order`] (`Pre`/`Post`), not by a separate
    /// queue discipline.
    pub fn dfs(&self, start: &str, opts: TraverseOptions) -> Traversal {
        Traversal::spawn(self, start, opts)
    }

    // --- Internals shared with the traversal engine ---

    pub(crate) fn outgoing_of(&self, uri: &str) -> Vec<Edge> {
        self.edges_from(uri)
    }

    pub(crate) fn incoming_of(&self, uri: &str) -> Vec<Edge> {
        self.edges_to(uri)
    }

    /// Ordered `from` URIs of the sibling chain under `(to, kind)`,
    /// optionally starting at/after a member, optionally reversed.
    pub(crate) fn chain_uris(
        &self,
        to: &str,
        kind: &str,
        window: Option<(&str, bool)>,
        forward: bool,
    ) -> Vec<Uri> {
        let chains = self.inner.chains.borrow();
        let Some(chain) = chains.get(&(Rc::from(to), Rc::from(kind))) else {
            return Vec::new();
        };
        match window {
            Some((start, inclusive)) => chain.walk_from(start, inclusive, forward),
            None => {
                let mut uris = chain.iter();
                if !forward {
                    uris.reverse();
                }
                uris
            }
        }
    }

    // --- Lifecycle ---

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.handle.is_disposed()
    }

    /// Disposes every entity (cascades included), evicts caches, drops
    /// all listeners.
    pub fn dispose(&self) {
        self.inner.handle.dispose();
    }

    fn teardown(&self) {
        loop {
            let next = self.inner.entities.borrow().keys().next().cloned();
            match next {
                Some(uri) => {
                    self.dispose_entity(&uri);
                }
                None => break,
            }
        }
        self.inner.caches.borrow_mut().clear();
        let indexes: Vec<Rc<StoreIndex>> =
            self.inner.indexes.borrow_mut().drain().map(|(_, v)| v).collect();
        for index in indexes {
            index.teardown();
        }
        self.inner.kind_added.borrow_mut().clear();
        self.inner.kind_removed.borrow_mut().clear();
        self.inner.any_added.clear();
        self.inner.any_removed.clear();
        self.inner.edge_added.borrow_mut().clear();
        self.inner.edge_removed.borrow_mut().clear();
        self.inner.index_changed.borrow_mut().clear();
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entities", &self.count())
            .finish()
    }
}
