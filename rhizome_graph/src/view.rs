use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rhizome_reactivity::{
    Cleanup, Collection, Disposable, Item, Signal, Subscription, Value, shielded,
};

use crate::cache::{Filters, QueryCache};
use crate::entity::{Entity, Kind, Uri};
use crate::store::{EntityStore, StoreInner};

/// A predicate result that may be reactive: a plain boolean, or a
/// signal whose truthiness is re-read (and watched) instead.
pub enum Probe {
    Value(bool),
    Signal(Signal<Value>),
}

impl From<bool> for Probe {
    fn from(v: bool) -> Self {
        Self::Value(v)
    }
}

impl From<Signal<Value>> for Probe {
    fn from(sig: Signal<Value>) -> Self {
        Self::Signal(sig)
    }
}

impl Probe {
    fn truthy(&self) -> bool {
        match self {
            Self::Value(b) => *b,
            Self::Signal(sig) => sig.with(Value::truthy),
        }
    }

    fn signal(&self) -> Option<Signal<Value>> {
        match self {
            Self::Value(_) => None,
            Self::Signal(sig) => Some(sig.clone()),
        }
    }
}

/// A query definition over the store: one entity kind plus zero or more
/// `(index, key)` equality filters, backed by a shared ref-counted
/// cache. Views never mutate graph state; they only observe it.
pub struct View {
    inner: Rc<ViewInner>,
}

struct ViewInner {
    store: Weak<StoreInner>,
    kind: Kind,
    filters: Filters,
    cache: Rc<QueryCache>,
    handle: Disposable,
}

impl Clone for View {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl View {
    pub(crate) fn new(store: &EntityStore, kind: &str, filters: Filters) -> Self {
        let cache = store.acquire_cache(kind, filters.clone());
        let handle = Disposable::new();
        {
            let weak = store.downgrade();
            let cache = cache.clone();
            handle.on_dispose(move || {
                if let Some(store) = EntityStore::upgrade(&weak) {
                    store.release_cache(&cache);
                }
            });
        }
        Self {
            inner: Rc::new(ViewInner {
                store: store.downgrade(),
                kind: Rc::from(kind),
                filters: cache.filters.clone(),
                cache,
                handle,
            }),
        }
    }

    fn store(&self) -> Option<EntityStore> {
        EntityStore::upgrade(&self.inner.store)
    }

    pub fn kind(&self) -> Kind {
        self.inner.kind.clone()
    }

    // --- Reads ---

    /// Current members, cache order (insertion order).
    pub fn iter(&self) -> Vec<Entity> {
        let Some(store) = self.store() else {
            return Vec::new();
        };
        self.inner
            .cache
            .uris()
            .into_iter()
            .filter_map(|u| store.get(&u))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.inner.cache.contains(uri)
    }

    pub fn find(&self, pred: impl Fn(&Entity) -> bool) -> Option<Entity> {
        self.iter().into_iter().find(|e| pred(e))
    }

    pub fn first(&self) -> Option<Entity> {
        self.iter().into_iter().next()
    }

    pub fn get_one(&self) -> Option<Entity> {
        self.first()
    }

    /// Applies `f` to every current member, without subscribing.
    pub fn for_each_now(&self, f: impl Fn(&Entity)) {
        for entity in self.iter() {
            f(&entity);
        }
    }

    // --- Subscriptions ---

    pub fn on_added(&self, f: impl Fn(&Entity) + 'static) -> Subscription {
        self.inner.cache.added.subscribe(f)
    }

    pub fn on_removed(&self, f: impl Fn(&Entity) + 'static) -> Subscription {
        self.inner.cache.removed.subscribe(f)
    }

    pub fn subscribe(
        &self,
        on_add: impl Fn(&Entity) + 'static,
        on_remove: impl Fn(&Entity) + 'static,
    ) -> Subscription {
        let a = self.on_added(on_add);
        let r = self.on_removed(on_remove);
        Subscription::new(move || {
            a.dispose();
            r.dispose();
        })
    }

    /// Runs `f` for every existing member and every future one. `f` may
    /// return a per-item cleanup, invoked when the item leaves the view
    /// (including via disposal) and when this subscription ends.
    pub fn each(&self, f: impl FnMut(&Entity) -> Option<Cleanup> + 'static) -> Subscription {
        let f = Rc::new(RefCell::new(f));
        let cleanups: Rc<RefCell<HashMap<Uri, Cleanup>>> = Rc::new(RefCell::new(HashMap::new()));

        let run = {
            let f = f.clone();
            let cleanups = cleanups.clone();
            move |entity: &Entity| {
                let produced = shielded("each body", || (f.borrow_mut())(entity)).flatten();
                if let Some(cleanup) = produced {
                    cleanups.borrow_mut().insert(entity.uri(), cleanup);
                }
            }
        };

        for entity in self.iter() {
            run(&entity);
        }

        let sub_add = self.inner.cache.added.subscribe(run);
        let sub_remove = {
            let cleanups = cleanups.clone();
            self.inner.cache.removed.subscribe(move |entity| {
                if let Some(cleanup) = cleanups.borrow_mut().remove(&entity.uri()) {
                    shielded("each cleanup", cleanup);
                }
            })
        };

        let sub = Subscription::new(move || {
            for (_, cleanup) in cleanups.borrow_mut().drain() {
                shielded("each cleanup", cleanup);
            }
            sub_add.dispose();
            sub_remove.dispose();
        });
        sub.set_parent(&self.inner.handle);
        sub
    }

    // --- Derived queries ---

    /// One more `(index, key)` equality filter; shares or creates the
    /// matching cache. The derived view dies with its parent.
    pub fn where_eq(&self, index: &str, key: impl Into<Value>) -> View {
        let Some(store) = self.store() else {
            return self.clone();
        };
        let mut filters = self.inner.filters.clone();
        filters.push((Rc::from(index), key.into()));
        let derived = View::new(&store, &self.inner.kind, filters);
        derived.inner.handle.set_parent(&self.inner.handle);
        derived
    }

    /// Members whose `index` value equals the ident (`id` attribute,
    /// else URI) of some entity currently in `source`. Live against
    /// both sides.
    pub fn where_in(&self, index: &str, source: &View) -> LiveSet {
        let out = LiveSet::new();
        let Some(store) = self.store() else {
            return out;
        };
        assert!(
            store.index_of(&self.inner.kind, index).is_some(),
            "unknown index '{}:{index}'",
            self.inner.kind
        );

        // Ident refcounts: two source entities may share one ident.
        let valid: Rc<RefCell<IndexMap<Value, usize>>> = Rc::new(RefCell::new(IndexMap::new()));
        for entity in source.iter() {
            *valid.borrow_mut().entry(entity.ident()).or_insert(0) += 1;
        }

        let weak_store = store.downgrade();
        let kind = self.inner.kind.clone();
        let index_name: Rc<str> = Rc::from(index);

        let value_of = {
            let kind = kind.clone();
            let index_name = index_name.clone();
            move |store: &EntityStore, entity: &Entity| -> Option<Value> {
                store
                    .index_of(&kind, &index_name)
                    .and_then(|idx| idx.value_of(&entity.uri()))
            }
        };

        let eval = {
            let valid = valid.clone();
            let out = out.clone();
            let value_of = value_of.clone();
            let weak_store = weak_store.clone();
            move |entity: &Entity, member: bool| {
                let Some(store) = EntityStore::upgrade(&weak_store) else {
                    return;
                };
                let matches = member
                    && value_of(&store, entity)
                        .is_some_and(|v| valid.borrow().contains_key(&v));
                if matches {
                    out.insert(entity.clone());
                } else {
                    out.remove(entity);
                }
            }
        };

        // Parent-side membership.
        let sub_add = {
            let eval = eval.clone();
            self.inner.cache.added.subscribe(move |e| eval(e, true))
        };
        let sub_remove = {
            let eval = eval.clone();
            self.inner.cache.removed.subscribe(move |e| eval(e, false))
        };

        // Parent-side index moves.
        let sub_shift = {
            let eval = eval.clone();
            let cache = self.inner.cache.clone();
            store.on_index_changed(&kind, index, move |change| {
                eval(&change.entity, cache.contains(&change.entity.uri()));
            })
        };

        // Source-side membership: idents entering and leaving.
        let parent_cache = self.inner.cache.clone();
        let rescan = {
            let weak_store = weak_store.clone();
            let value_of = value_of.clone();
            let eval = eval.clone();
            move |ident: &Value| {
                let Some(store) = EntityStore::upgrade(&weak_store) else {
                    return;
                };
                for uri in parent_cache.uris() {
                    if let Some(entity) = store.get(&uri)
                        && value_of(&store, &entity).as_ref() == Some(ident)
                    {
                        eval(&entity, true);
                    }
                }
            }
        };
        let sub_src_add = {
            let valid = valid.clone();
            let rescan = rescan.clone();
            source.on_added(move |e| {
                let ident = e.ident();
                let fresh = {
                    let mut valid = valid.borrow_mut();
                    let count = valid.entry(ident.clone()).or_insert(0);
                    *count += 1;
                    *count == 1
                };
                if fresh {
                    rescan(&ident);
                }
            })
        };
        let sub_src_remove = {
            let valid = valid.clone();
            source.on_removed(move |e| {
                let ident = e.ident();
                let drained = {
                    let mut valid = valid.borrow_mut();
                    match valid.get_mut(&ident) {
                        Some(count) if *count > 1 => {
                            *count -= 1;
                            false
                        }
                        Some(_) => {
                            valid.shift_remove(&ident);
                            true
                        }
                        None => false,
                    }
                };
                if drained {
                    rescan(&ident);
                }
            })
        };

        // Seed.
        for entity in self.iter() {
            eval(&entity, true);
        }

        for sub in [sub_add, sub_remove, sub_shift, sub_src_add, sub_src_remove] {
            sub.set_parent(out.handle());
        }
        out.handle().set_parent(&self.inner.handle);
        {
            let out = out.clone();
            source.inner.handle.on_dispose(move || out.dispose());
        }
        out
    }

    /// Entities one hop along `edge_kind` from current members,
    /// ref-counted by distinct edges so shared targets survive until
    /// the last edge (or member) goes. Edges to a URI not in the store
    /// yet are kept pending and resolve when the target arrives.
    pub fn follow(&self, edge_kind: &str, target_kind: Option<&str>) -> LiveSet {
        let out = LiveSet::new();
        let Some(store) = self.store() else {
            return out;
        };

        let weak_store = store.downgrade();
        let edge_kind: Kind = Rc::from(edge_kind);
        let target_kind: Option<Kind> = target_kind.map(Rc::from);

        struct FollowState {
            counts: HashMap<Uri, usize>,
            counted: HashMap<Uri, Vec<Uri>>,
        }
        let state = Rc::new(RefCell::new(FollowState {
            counts: HashMap::new(),
            counted: HashMap::new(),
        }));

        let kind_ok = {
            let target_kind = target_kind.clone();
            let weak_store = weak_store.clone();
            move |to: &str| -> bool {
                match &target_kind {
                    None => true,
                    Some(want) => EntityStore::upgrade(&weak_store)
                        .and_then(|s| s.kind_of(to))
                        .is_some_and(|k| k == *want),
                }
            }
        };

        // Every edge is counted; `kind_ok` only gates what actually
        // joins the output, so a pending target can still resolve.
        let bump = {
            let state = state.clone();
            let out = out.clone();
            let weak_store = weak_store.clone();
            let kind_ok = kind_ok.clone();
            move |to: &Uri| {
                let first = {
                    let mut state = state.borrow_mut();
                    let count = state.counts.entry(to.clone()).or_insert(0);
                    *count += 1;
                    *count == 1
                };
                if first
                    && kind_ok(to)
                    && let Some(store) = EntityStore::upgrade(&weak_store)
                    && let Some(entity) = store.get(to)
                {
                    out.insert(entity);
                }
            }
        };
        let drop_one = {
            let state = state.clone();
            let out = out.clone();
            let weak_store = weak_store.clone();
            move |to: &Uri| {
                let emptied = {
                    let mut state = state.borrow_mut();
                    match state.counts.get_mut(to) {
                        Some(count) if *count > 1 => {
                            *count -= 1;
                            false
                        }
                        Some(_) => {
                            state.counts.remove(to);
                            true
                        }
                        None => false,
                    }
                };
                if emptied
                    && let Some(store) = EntityStore::upgrade(&weak_store)
                    && let Some(entity) = store.get(to)
                {
                    out.remove(&entity);
                }
            }
        };

        let member_in = {
            let state = state.clone();
            let weak_store = weak_store.clone();
            let edge_kind = edge_kind.clone();
            let bump = bump.clone();
            move |entity: &Entity| {
                let Some(store) = EntityStore::upgrade(&weak_store) else {
                    return;
                };
                let targets: Vec<Uri> = store
                    .outgoing_of(&entity.uri())
                    .into_iter()
                    .filter(|e| e.kind == edge_kind)
                    .map(|e| e.to)
                    .collect();
                for to in &targets {
                    bump(to);
                }
                state.borrow_mut().counted.insert(entity.uri(), targets);
            }
        };
        let member_out = {
            let state = state.clone();
            let drop_one = drop_one.clone();
            move |entity: &Entity| {
                let targets = state.borrow_mut().counted.remove(&entity.uri());
                for to in targets.unwrap_or_default() {
                    drop_one(&to);
                }
            }
        };

        for entity in self.iter() {
            member_in(&entity);
        }

        let sub_add = self.inner.cache.added.subscribe(member_in);
        let sub_remove = self.inner.cache.removed.subscribe(member_out);

        let sub_edge_add = {
            let state = state.clone();
            let cache = self.inner.cache.clone();
            let bump = bump.clone();
            store.on_edge_added(&edge_kind, move |edge| {
                if cache.contains(&edge.from) {
                    bump(&edge.to);
                    state
                        .borrow_mut()
                        .counted
                        .entry(edge.from.clone())
                        .or_default()
                        .push(edge.to.clone());
                }
            })
        };
        let sub_edge_remove = {
            let state = state.clone();
            store.on_edge_removed(&edge_kind, move |edge| {
                let tracked = {
                    let mut state = state.borrow_mut();
                    match state.counted.get_mut(&edge.from) {
                        Some(list) => match list.iter().position(|t| *t == edge.to) {
                            Some(pos) => {
                                list.remove(pos);
                                true
                            }
                            None => false,
                        },
                        None => false,
                    }
                };
                if tracked {
                    drop_one(&edge.to);
                }
            })
        };

        // A target that was counted while absent joins when it arrives,
        // provided its kind matches now that it has one.
        let sub_late = {
            let state = state.clone();
            let out = out.clone();
            store.on_any_added(move |entity| {
                if state.borrow().counts.contains_key(&entity.uri()) && kind_ok(&entity.uri()) {
                    out.insert(entity.clone());
                }
            })
        };

        for sub in [
            sub_add,
            sub_remove,
            sub_edge_add,
            sub_edge_remove,
            sub_late,
        ] {
            sub.set_parent(out.handle());
        }
        out.handle().set_parent(&self.inner.handle);
        out
    }

    // --- Reactive reductions ---

    fn reactive_fold<A: PartialEq + Clone + 'static>(
        &self,
        compute: Rc<dyn Fn(&[Entity]) -> A>,
        watch_of: Rc<dyn Fn(&Entity) -> Option<Signal<Value>>>,
    ) -> Signal<A> {
        let weak_store = self.inner.store.clone();
        let cache = self.inner.cache.clone();

        let members = move || -> Vec<Entity> {
            let Some(store) = EntityStore::upgrade(&weak_store) else {
                return Vec::new();
            };
            cache
                .uris()
                .into_iter()
                .filter_map(|u| store.get(&u))
                .collect()
        };

        let out = Signal::new(compute(&members()));
        let watches: Rc<RefCell<HashMap<Uri, Subscription>>> =
            Rc::new(RefCell::new(HashMap::new()));

        let recompute = {
            let out = out.clone();
            let compute = compute.clone();
            let members = members.clone();
            Rc::new(move || out.set(compute(&members())))
        };

        let resync = {
            let watches = watches.clone();
            let members = members.clone();
            let recompute = recompute.clone();
            move || {
                let current = members();
                let mut keep: HashMap<Uri, Subscription> = HashMap::new();
                let mut old = watches.borrow_mut();
                for entity in &current {
                    let uri = entity.uri();
                    if let Some(sub) = old.remove(&uri) {
                        keep.insert(uri, sub);
                    } else if let Some(sig) = watch_of(entity) {
                        let recompute = recompute.clone();
                        keep.insert(uri, sig.watch(move |_, _| recompute()));
                    }
                }
                for (_, sub) in old.drain() {
                    sub.dispose();
                }
                *old = keep;
            }
        };
        resync();

        let on_change = {
            let resync = Rc::new(resync);
            let recompute = recompute.clone();
            move |_: &Entity| {
                resync();
                recompute();
            }
        };
        let sub_add = self.inner.cache.added.subscribe(on_change.clone());
        let sub_remove = self.inner.cache.removed.subscribe(on_change);

        sub_add.set_parent(out.handle());
        sub_remove.set_parent(out.handle());
        {
            let watches = watches.clone();
            out.handle().on_dispose(move || {
                for (_, sub) in watches.borrow_mut().drain() {
                    sub.dispose();
                }
            });
        }
        out.handle().set_parent(&self.inner.handle);
        out
    }

    /// A live boolean: does any member satisfy `pred`? Signal-valued
    /// probes are watched, so flipping one re-evaluates.
    pub fn some(&self, pred: impl Fn(&Entity) -> Probe + 'static) -> Signal<bool> {
        let pred = Rc::new(pred);
        let p = pred.clone();
        self.reactive_fold(
            Rc::new(move |items: &[Entity]| items.iter().any(|e| p(e).truthy())),
            Rc::new(move |e| pred(e).signal()),
        )
    }

    /// A live boolean: do all members satisfy `pred`?
    pub fn every(&self, pred: impl Fn(&Entity) -> Probe + 'static) -> Signal<bool> {
        let pred = Rc::new(pred);
        let p = pred.clone();
        self.reactive_fold(
            Rc::new(move |items: &[Entity]| items.iter().all(|e| p(e).truthy())),
            Rc::new(move |e| pred(e).signal()),
        )
    }

    /// A live reduction over the membership.
    pub fn aggregate<A: PartialEq + Clone + 'static>(
        &self,
        f: impl Fn(&[Entity]) -> A + 'static,
    ) -> Signal<A> {
        self.reactive_fold(Rc::new(f), Rc::new(|_| None))
    }

    /// As [`View::aggregate`], re-running when any member's watched
    /// signal changes too.
    pub fn aggregate_watched<A: PartialEq + Clone + 'static>(
        &self,
        f: impl Fn(&[Entity]) -> A + 'static,
        watch: impl Fn(&Entity) -> Option<Signal<Value>> + 'static,
    ) -> Signal<A> {
        self.reactive_fold(Rc::new(f), Rc::new(watch))
    }

    /// Signal of the most recently added member; falls back to the
    /// newest remaining member when that one leaves.
    pub fn latest(&self) -> Signal<Option<Entity>> {
        let out = Signal::new(self.iter().into_iter().last());

        let sub_add = {
            let out = out.clone();
            self.inner
                .cache
                .added
                .subscribe(move |e| out.set(Some(e.clone())))
        };
        let sub_remove = {
            let out = out.clone();
            let view = self.clone();
            self.inner.cache.removed.subscribe(move |e| {
                if out.with(|cur| cur.as_ref() == Some(e)) {
                    out.set(view.iter().into_iter().last());
                }
            })
        };
        sub_add.set_parent(out.handle());
        sub_remove.set_parent(out.handle());
        out.handle().set_parent(&self.inner.handle);
        out
    }

    // --- Lifecycle ---

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.handle.is_disposed()
    }

    /// Releases this view's cache reference (evicting the cache at
    /// zero) and everything derived from it.
    pub fn dispose(&self) {
        self.inner.handle.dispose();
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("kind", &self.inner.kind)
            .field("filters", &self.inner.filters.len())
            .field("count", &self.count())
            .finish()
    }
}

/// A read-only live set of entities produced by a derived query
/// ([`View::follow`], [`View::where_in`]). Mutation flows only from the
/// engine; callers observe.
pub struct LiveSet {
    items: Collection<Entity>,
}

impl Clone for LiveSet {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl LiveSet {
    fn new() -> Self {
        Self {
            items: Collection::new(),
        }
    }

    fn insert(&self, entity: Entity) {
        self.items.add(entity);
    }

    fn remove(&self, entity: &Entity) {
        self.items.take_by_id(entity.item_id());
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.items.contains_id(entity.item_id())
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.iter().any(|e| &*e.uri() == uri)
    }

    pub fn on_added(&self, f: impl Fn(&Entity) + 'static) -> Subscription {
        self.items.on_added(f)
    }

    pub fn on_removed(&self, f: impl Fn(&Entity) + 'static) -> Subscription {
        self.items.on_removed(f)
    }

    pub fn handle(&self) -> &Disposable {
        self.items.handle()
    }

    pub fn dispose(&self) {
        self.items.dispose();
    }
}
