//! Path-aware reactive traversal.
//!
//! A traversal walks the graph from a start entity and materializes a
//! live [`Collection`] of [`Wrapper`]s — one per distinct *path* to
//! each reachable entity — that stays synchronized with the graph and
//! with filter/prune state. Five things move it after the initial walk:
//! entity adds, entity removals, edge adds, edge removals, and
//! filter/prune signal flips.

mod options;
mod path;
mod wrapper;

pub use options::{Direction, Order, TraverseOptions};
pub use path::PathCtx;
pub use wrapper::Wrapper;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use rhizome_reactivity::{Collection, Disposable, Item, Subscription, shielded};

use crate::edge::Edge;
use crate::entity::{Entity, Uri};
use crate::store::{EntityStore, StoreInner};
use path::PathNode;

/// A live traversal: the output collection plus the machinery keeping
/// it honest. Dispose it to tear down every subscription and wrapper.
pub struct Traversal {
    engine: Rc<Engine>,
}

struct Engine {
    me: Weak<Engine>,
    store: Weak<StoreInner>,
    opts: TraverseOptions,
    start: Uri,
    out: Collection<Wrapper>,
    /// vuri → node, discovery order.
    nodes: RefCell<IndexMap<Uri, PathNode>>,
    /// entity uri → paths terminating there.
    uri_to_paths: RefCell<HashMap<Uri, IndexSet<Uri>>>,
    /// entity uri → paths holding it as an ancestor.
    prefix_index: RefCell<HashMap<Uri, IndexSet<Uri>>>,
    /// entity uri → emitted wrapper count (unique budget accounting).
    emitted_uris: RefCell<HashMap<Uri, usize>>,
    emitted_count: Cell<usize>,
    /// One filter watch per entity, shared by all of its paths.
    filter_subs: RefCell<HashMap<Uri, Subscription>>,
    handle: Disposable,
}

impl Traversal {
    pub(crate) fn spawn(store: &EntityStore, start: &str, opts: TraverseOptions) -> Self {
        let engine = Rc::new_cyclic(|me| Engine {
            me: me.clone(),
            store: store.downgrade(),
            opts,
            start: Rc::from(start),
            out: Collection::new(),
            nodes: RefCell::new(IndexMap::new()),
            uri_to_paths: RefCell::new(HashMap::new()),
            prefix_index: RefCell::new(HashMap::new()),
            emitted_uris: RefCell::new(HashMap::new()),
            emitted_count: Cell::new(0),
            filter_subs: RefCell::new(HashMap::new()),
            handle: Disposable::new(),
        });

        engine.out.handle().set_parent(&engine.handle);
        {
            let me = engine.me.clone();
            engine.handle.on_dispose(move || {
                if let Some(engine) = me.upgrade() {
                    engine.teardown();
                }
            });
        }

        // Graph subscriptions, torn down with the traversal.
        {
            let me = engine.me.clone();
            let sub = store.on_any_added(move |entity| {
                if let Some(engine) = me.upgrade() {
                    engine.on_entity_added(entity);
                }
            });
            sub.set_parent(&engine.handle);
        }
        {
            let me = engine.me.clone();
            let sub = store.on_any_removed(move |entity| {
                if let Some(engine) = me.upgrade() {
                    engine.on_entity_removed(entity);
                }
            });
            sub.set_parent(&engine.handle);
        }
        for kind in engine.opts.edge_kinds.clone() {
            {
                let me = engine.me.clone();
                let sub = store.on_edge_added(&kind, move |edge| {
                    if let Some(engine) = me.upgrade() {
                        engine.on_edge_added(edge);
                    }
                });
                sub.set_parent(&engine.handle);
            }
            {
                let me = engine.me.clone();
                let sub = store.on_edge_removed(&kind, move |edge| {
                    if let Some(engine) = me.upgrade() {
                        engine.on_edge_removed(edge);
                    }
                });
                sub.set_parent(&engine.handle);
            }
        }

        if let Some(root) = store.get(start) {
            engine.expand(&root, None, None);
        }

        Self { engine }
    }

    /// The live output. One wrapper per tracked-and-visible path.
    pub fn collection(&self) -> &Collection<Wrapper> {
        &self.engine.out
    }

    pub fn iter(&self) -> impl Iterator<Item = Wrapper> {
        self.engine.out.iter()
    }

    pub fn len(&self) -> usize {
        self.engine.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engine.out.is_empty()
    }

    /// Virtual URIs currently emitted, in emission order.
    pub fn virtual_uris(&self) -> Vec<Uri> {
        self.engine.out.iter().map(|w| w.virtual_uri()).collect()
    }

    pub fn find(&self, virtual_uri: &str) -> Option<Wrapper> {
        self.engine
            .nodes
            .borrow()
            .get(virtual_uri)
            .and_then(|n| n.wrapper.clone())
    }

    pub fn on_added(&self, f: impl Fn(&Wrapper) + 'static) -> Subscription {
        self.engine.out.on_added(f)
    }

    pub fn on_removed(&self, f: impl Fn(&Wrapper) + 'static) -> Subscription {
        self.engine.out.on_removed(f)
    }

    pub fn handle(&self) -> &Disposable {
        &self.engine.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.engine.handle.is_disposed()
    }

    pub fn dispose(&self) {
        self.engine.handle.dispose();
    }
}

impl Engine {
    fn store(&self) -> Option<EntityStore> {
        EntityStore::upgrade(&self.store)
    }

    fn edge_kind_tracked(&self, kind: &str) -> bool {
        self.opts.edge_kinds.iter().any(|k| &**k == kind)
    }

    // --- Expansion ---

    /// Tracks the path `parent_vuri → entity` (if depth, cycle, and the
    /// scanning budget allow), emits it per filter/budgets, and walks
    /// its children per order/prune. Idempotent per virtual URI.
    fn expand(&self, entity: &Entity, parent_vuri: Option<&Uri>, via: Option<Edge>) {
        let entity_uri = entity.uri();

        struct Basis {
            depth: usize,
            vuri: Uri,
            path: Rc<[Uri]>,
            pathkeys: Rc<[Uri]>,
            path_set: Rc<HashSet<Uri>>,
            parent: Option<Uri>,
            filtered_path: Rc<[Uri]>,
            filtered_pathkeys: Rc<[Uri]>,
            filtered_depth: usize,
            filtered_parent: Option<Uri>,
        }

        let basis = match parent_vuri {
            None => Basis {
                depth: 0,
                vuri: entity.key(),
                path: Rc::from(Vec::new()),
                pathkeys: Rc::from(Vec::new()),
                path_set: Rc::new(HashSet::from([entity_uri.clone()])),
                parent: None,
                filtered_path: Rc::from(Vec::new()),
                filtered_pathkeys: Rc::from(Vec::new()),
                filtered_depth: 0,
                filtered_parent: None,
            },
            Some(pv) => {
                let nodes = self.nodes.borrow();
                let Some(parent) = nodes.get(pv) else {
                    return;
                };
                if parent.pruned {
                    return;
                }
                if parent.path_set.contains(&entity_uri) {
                    return; // would close a cycle along this path
                }
                let mut path: Vec<Uri> = parent.ctx.path.to_vec();
                path.push(parent.entity.uri());
                let mut pathkeys: Vec<Uri> = parent.ctx.pathkeys.to_vec();
                pathkeys.push(parent.entity.key());
                let mut path_set: HashSet<Uri> = (*parent.path_set).clone();
                path_set.insert(entity_uri.clone());

                let (filtered_path, filtered_pathkeys, filtered_depth, filtered_parent) =
                    if parent.passed_filter {
                        let mut fp: Vec<Uri> = parent.ctx.filtered_path.to_vec();
                        fp.push(parent.entity.uri());
                        let mut fk: Vec<Uri> = parent.ctx.filtered_pathkeys.to_vec();
                        fk.push(parent.entity.key());
                        (
                            Rc::from(fp.as_slice()),
                            Rc::from(fk.as_slice()),
                            parent.ctx.filtered_depth + 1,
                            Some(parent.ctx.uri.clone()),
                        )
                    } else {
                        (
                            parent.ctx.filtered_path.clone(),
                            parent.ctx.filtered_pathkeys.clone(),
                            parent.ctx.filtered_depth,
                            parent.ctx.filtered_parent.clone(),
                        )
                    };

                Basis {
                    depth: parent.ctx.depth + 1,
                    vuri: Rc::from(format!("{}/{}", parent.ctx.uri, entity.key()).as_str()),
                    path: Rc::from(path.as_slice()),
                    pathkeys: Rc::from(pathkeys.as_slice()),
                    path_set: Rc::new(path_set),
                    parent: Some(pv.clone()),
                    filtered_path,
                    filtered_pathkeys,
                    filtered_depth,
                    filtered_parent,
                }
            }
        };

        if let Some(max) = self.opts.max_depth
            && basis.depth > max
        {
            return;
        }
        if self.nodes.borrow().contains_key(&basis.vuri) {
            return;
        }
        if let Some(budget) = self.opts.scanning_budget
            && self.nodes.borrow().len() >= budget
        {
            return;
        }

        let ctx = PathCtx {
            uri: basis.vuri.clone(),
            path: basis.path,
            pathkeys: basis.pathkeys,
            depth: basis.depth,
            parent: basis.parent,
            filtered_path: basis.filtered_path,
            filtered_pathkeys: basis.filtered_pathkeys,
            filtered_depth: basis.filtered_depth,
            filtered_parent: basis.filtered_parent,
        };
        let vuri = basis.vuri;

        let passed_filter = match &self.opts.filter {
            Some(filter) => shielded("traverse filter", || filter(entity, &ctx)).unwrap_or(true),
            None => true,
        };
        let pruned = match &self.opts.prune {
            Some(prune) => shielded("traverse prune", || prune(entity, &ctx)).unwrap_or(false),
            None => false,
        };

        // A filter/prune body may have re-entered the engine.
        if self.nodes.borrow().contains_key(&vuri) {
            return;
        }

        if let Some(filter_watch) = &self.opts.filter_watch {
            let watched_already = self.filter_subs.borrow().contains_key(&entity_uri);
            if !watched_already && let Some(sig) = filter_watch(entity) {
                let me = self.me.clone();
                let watched = entity_uri.clone();
                let sub = sig.watch(move |_, _| {
                    if let Some(engine) = me.upgrade() {
                        engine.refilter(&watched);
                    }
                });
                self.filter_subs.borrow_mut().insert(entity_uri.clone(), sub);
            }
        }
        let prune_sub = self.opts.prune_watch.as_ref().and_then(|prune_watch| {
            prune_watch(entity, &ctx).map(|sig| {
                let me = self.me.clone();
                let watched = vuri.clone();
                sig.watch(move |_, _| {
                    if let Some(engine) = me.upgrade() {
                        engine.reprune(&watched);
                    }
                })
            })
        });

        let node = PathNode {
            entity: entity.clone(),
            ctx,
            path_set: basis.path_set,
            via,
            passed_filter,
            pruned,
            wrapper: None,
            prune_sub,
            hook_fired: false,
            hook_done: false,
        };
        let ancestors: Vec<Uri> = node.ctx.path.to_vec();
        self.nodes.borrow_mut().insert(vuri.clone(), node);
        self.uri_to_paths
            .borrow_mut()
            .entry(entity_uri)
            .or_default()
            .insert(vuri.clone());
        {
            let mut prefix = self.prefix_index.borrow_mut();
            for ancestor in ancestors {
                prefix.entry(ancestor).or_default().insert(vuri.clone());
            }
        }

        match self.opts.order {
            Order::Pre => {
                self.try_emit(&vuri);
                if !pruned {
                    self.expand_children(&vuri);
                }
            }
            Order::Post => {
                if !pruned {
                    self.expand_children(&vuri);
                }
                self.try_emit(&vuri);
            }
        }
    }

    /// Emits the node's wrapper if it is visible and the result/unique
    /// budgets admit it.
    fn try_emit(&self, vuri: &Uri) -> bool {
        let (entity, ctx) = {
            let nodes = self.nodes.borrow();
            let Some(node) = nodes.get(vuri) else {
                return false;
            };
            if node.wrapper.is_some() || !node.passed_filter {
                return false;
            }
            (node.entity.clone(), node.ctx.clone())
        };

        if let Some(budget) = self.opts.result_budget
            && self.emitted_count.get() >= budget
        {
            return false;
        }
        let entity_uri = entity.uri();
        let already_distinct = self.emitted_uris.borrow().contains_key(&entity_uri);
        if !already_distinct
            && let Some(budget) = self.opts.unique_budget
            && self.emitted_uris.borrow().len() >= budget
        {
            return false;
        }

        let wrapper = Wrapper::new(entity, ctx);
        if let Some(node) = self.nodes.borrow_mut().get_mut(vuri) {
            node.wrapper = Some(wrapper.clone());
        } else {
            return false;
        }
        *self.emitted_uris.borrow_mut().entry(entity_uri).or_insert(0) += 1;
        self.emitted_count.set(self.emitted_count.get() + 1);
        self.out.adopt(wrapper);
        true
    }

    /// Takes the wrapper back out (filter flipped false), keeping the
    /// path tracked.
    fn retract(&self, vuri: &Uri) {
        let wrapper = self
            .nodes
            .borrow_mut()
            .get_mut(vuri)
            .and_then(|node| node.wrapper.take());
        let Some(wrapper) = wrapper else {
            return;
        };
        self.forget_emission(&wrapper);
        self.out.take_by_id(wrapper.item_id());
        wrapper.handle().dispose();
    }

    fn forget_emission(&self, wrapper: &Wrapper) {
        self.emitted_count.set(self.emitted_count.get() - 1);
        let entity_uri = wrapper.uri();
        let mut uris = self.emitted_uris.borrow_mut();
        if let Some(count) = uris.get_mut(&entity_uri) {
            *count -= 1;
            if *count == 0 {
                uris.remove(&entity_uri);
            }
        }
    }

    /// Gate before walking a node's children: prune, depth, and the
    /// expand hook.
    fn expand_children(&self, vuri: &Uri) {
        let entity = {
            let nodes = self.nodes.borrow();
            let Some(node) = nodes.get(vuri) else {
                return;
            };
            if node.pruned {
                return;
            }
            if let Some(max) = self.opts.max_depth
                && node.ctx.depth >= max
            {
                return;
            }
            node.entity.clone()
        };

        if let Some(hook) = &self.opts.expand_hook {
            let (fired, done) = {
                let nodes = self.nodes.borrow();
                match nodes.get(vuri) {
                    Some(node) => (node.hook_fired, node.hook_done),
                    None => return,
                }
            };
            if !fired {
                if let Some(node) = self.nodes.borrow_mut().get_mut(vuri) {
                    node.hook_fired = true;
                }
                match shielded("expand hook", || hook(&entity)) {
                    Some(promise) => {
                        let me = self.me.clone();
                        let watched = vuri.clone();
                        promise.then_do(move |_| {
                            if let Some(engine) = me.upgrade() {
                                if let Some(node) =
                                    engine.nodes.borrow_mut().get_mut(&watched)
                                {
                                    node.hook_done = true;
                                }
                                engine.spread(&watched);
                            }
                        });
                        let skipped = vuri.clone();
                        promise.catch_do(move |err| {
                            tracing::warn!(
                                target: "rhizome",
                                path = %skipped,
                                %err,
                                "expand hook failed; subtree skipped"
                            );
                        });
                        return;
                    }
                    None => {
                        // Hook panicked: expand directly.
                    }
                }
            } else if !done {
                return; // hook still pending (or failed)
            }
        }

        self.spread(vuri);
    }

    /// Walks the node's neighbors in order and expands each.
    fn spread(&self, vuri: &Uri) {
        let (entity_uri, at_root, pruned) = {
            let nodes = self.nodes.borrow();
            let Some(node) = nodes.get(vuri) else {
                return;
            };
            (node.entity.uri(), node.ctx.depth == 0, node.pruned)
        };
        if pruned {
            return;
        }
        for (child, edge) in self.neighbors(&entity_uri, at_root) {
            self.expand(&child, Some(vuri), Some(edge));
        }
    }

    /// Neighbor entities with the edge that reaches them, honoring
    /// direction, edge kinds, the depth-0 window, and `reverse`.
    fn neighbors(&self, uri: &Uri, at_root: bool) -> Vec<(Entity, Edge)> {
        let Some(store) = self.store() else {
            return Vec::new();
        };
        let mut out: Vec<(Entity, Edge)> = Vec::new();

        if matches!(self.opts.direction, Direction::Out | Direction::Both) {
            for edge in store.outgoing_of(uri) {
                if self.edge_kind_tracked(&edge.kind)
                    && let Some(entity) = store.get(&edge.to)
                {
                    out.push((entity, edge));
                }
            }
        }
        if matches!(self.opts.direction, Direction::In | Direction::Both) {
            let window = if at_root {
                self.opts
                    .start_at_child
                    .as_ref()
                    .map(|u| (u.clone(), true))
                    .or_else(|| self.opts.start_after_child.as_ref().map(|u| (u.clone(), false)))
            } else {
                None
            };
            for kind in &self.opts.edge_kinds {
                let froms = store.chain_uris(
                    uri,
                    kind,
                    window.as_ref().map(|(u, inc)| (&**u, *inc)),
                    true,
                );
                for from in froms {
                    if let Some(entity) = store.get(&from) {
                        let edge = Edge {
                            from: from.clone(),
                            kind: kind.clone(),
                            to: uri.clone(),
                        };
                        out.push((entity, edge));
                    }
                }
            }
        }

        if self.opts.reverse {
            out.reverse();
        }
        out
    }

    // --- Reactive updates ---

    fn on_entity_added(&self, entity: &Entity) {
        if entity.uri() == self.start {
            self.expand(entity, None, None);
        }
        let Some(store) = self.store() else {
            return;
        };
        let uri = entity.uri();

        if matches!(self.opts.direction, Direction::In | Direction::Both) {
            for edge in store.outgoing_of(&uri) {
                if !self.edge_kind_tracked(&edge.kind) {
                    continue;
                }
                for parent_vuri in self.paths_at(&edge.to) {
                    self.expand(entity, Some(&parent_vuri), Some(edge.clone()));
                }
            }
        }
        if matches!(self.opts.direction, Direction::Out | Direction::Both) {
            for edge in store.incoming_of(&uri) {
                if !self.edge_kind_tracked(&edge.kind) {
                    continue;
                }
                for parent_vuri in self.paths_at(&edge.from) {
                    self.expand(entity, Some(&parent_vuri), Some(edge.clone()));
                }
            }
        }
    }

    fn on_entity_removed(&self, entity: &Entity) {
        let uri = entity.uri();
        let mut affected: IndexSet<Uri> = IndexSet::new();
        if let Some(paths) = self.uri_to_paths.borrow().get(&uri) {
            affected.extend(paths.iter().cloned());
        }
        if let Some(paths) = self.prefix_index.borrow().get(&uri) {
            affected.extend(paths.iter().cloned());
        }
        for vuri in affected {
            self.remove_path(&vuri);
        }
        self.resweep();
    }

    fn on_edge_added(&self, edge: &Edge) {
        let Some(store) = self.store() else {
            return;
        };
        if matches!(self.opts.direction, Direction::In | Direction::Both)
            && let Some(child) = store.get(&edge.from)
        {
            for parent_vuri in self.paths_at(&edge.to) {
                self.expand(&child, Some(&parent_vuri), Some(edge.clone()));
            }
        }
        if matches!(self.opts.direction, Direction::Out | Direction::Both)
            && let Some(child) = store.get(&edge.to)
        {
            for parent_vuri in self.paths_at(&edge.from) {
                self.expand(&child, Some(&parent_vuri), Some(edge.clone()));
            }
        }
    }

    fn on_edge_removed(&self, edge: &Edge) {
        let Some(store) = self.store() else {
            return;
        };
        let terminals: Vec<Uri> = match self.opts.direction {
            Direction::In => vec![edge.from.clone()],
            Direction::Out => vec![edge.to.clone()],
            Direction::Both => vec![edge.from.clone(), edge.to.clone()],
        };
        let mut doomed: Vec<Uri> = Vec::new();
        for terminal in &terminals {
            for vuri in self.paths_at(terminal) {
                let sustained_by_this = self
                    .nodes
                    .borrow()
                    .get(&vuri)
                    .and_then(|n| n.via.as_ref().cloned())
                    .is_some_and(|via| via == *edge);
                if sustained_by_this && !store.has_edge(&edge.from, &edge.kind, &edge.to) {
                    doomed.push(vuri);
                }
            }
        }
        for vuri in doomed {
            self.remove_path(&vuri);
        }
        self.resweep();
    }

    /// Filter signal fired for `entity`: re-evaluate visibility of each
    /// of its paths. Children are never re-walked here.
    fn refilter(&self, entity_uri: &Uri) {
        let Some(filter) = self.opts.filter.clone() else {
            return;
        };
        for vuri in self.paths_at(entity_uri) {
            let Some((entity, ctx, was_emitted)) = ({
                let nodes = self.nodes.borrow();
                nodes
                    .get(&vuri)
                    .map(|n| (n.entity.clone(), n.ctx.clone(), n.wrapper.is_some()))
            }) else {
                continue;
            };
            let passes = shielded("traverse filter", || filter(&entity, &ctx)).unwrap_or(true);
            if let Some(node) = self.nodes.borrow_mut().get_mut(&vuri) {
                node.passed_filter = passes;
            }
            if passes && !was_emitted {
                self.try_emit(&vuri);
            } else if !passes && was_emitted {
                self.retract(&vuri);
            }
        }
        self.resweep();
    }

    /// Prune signal fired for one path. False→true drops the subtree;
    /// true→false expands children as if discovered fresh.
    fn reprune(&self, vuri: &Uri) {
        let Some(prune) = self.opts.prune.clone() else {
            return;
        };
        let Some((entity, ctx, was)) = ({
            let nodes = self.nodes.borrow();
            nodes
                .get(vuri)
                .map(|n| (n.entity.clone(), n.ctx.clone(), n.pruned))
        }) else {
            return;
        };
        let now = shielded("traverse prune", || prune(&entity, &ctx)).unwrap_or(false);
        if now == was {
            return;
        }
        if let Some(node) = self.nodes.borrow_mut().get_mut(vuri) {
            node.pruned = now;
        }
        if now {
            self.remove_descendants(vuri);
            self.resweep();
        } else {
            self.expand_children(vuri);
        }
    }

    // --- Removal ---

    fn paths_at(&self, entity_uri: &str) -> Vec<Uri> {
        self.uri_to_paths
            .borrow()
            .get(entity_uri)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes the path and every descendant path, discovery order.
    fn remove_path(&self, vuri: &Uri) {
        if !self.nodes.borrow().contains_key(vuri) {
            return;
        }
        let prefix = format!("{vuri}/");
        let targets: Vec<Uri> = self
            .nodes
            .borrow()
            .keys()
            .filter(|k| *k == vuri || k.starts_with(&prefix))
            .cloned()
            .collect();
        for target in targets {
            self.drop_node(&target);
        }
    }

    fn remove_descendants(&self, vuri: &Uri) {
        let prefix = format!("{vuri}/");
        let targets: Vec<Uri> = self
            .nodes
            .borrow()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for target in targets {
            self.drop_node(&target);
        }
    }

    fn drop_node(&self, vuri: &Uri) {
        let Some(node) = self.nodes.borrow_mut().shift_remove(vuri) else {
            return;
        };

        if let Some(wrapper) = &node.wrapper {
            self.forget_emission(wrapper);
            self.out.take_by_id(wrapper.item_id());
            wrapper.handle().dispose();
        }
        if let Some(sub) = node.prune_sub {
            sub.dispose();
        }

        let entity_uri = node.entity.uri();
        let last_path_gone = {
            let mut utp = self.uri_to_paths.borrow_mut();
            match utp.get_mut(&entity_uri) {
                Some(set) => {
                    set.shift_remove(vuri);
                    if set.is_empty() {
                        utp.remove(&entity_uri);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if last_path_gone
            && let Some(sub) = self.filter_subs.borrow_mut().remove(&entity_uri)
        {
            sub.dispose();
        }

        {
            let mut prefix = self.prefix_index.borrow_mut();
            for ancestor in node.ctx.path.iter() {
                if let Some(set) = prefix.get_mut(ancestor) {
                    set.shift_remove(vuri);
                    if set.is_empty() {
                        prefix.remove(ancestor);
                    }
                }
            }
        }
    }

    /// After anything freed budget: re-admit blocked emissions in
    /// discovery order, then retry child walks that a scanning budget
    /// may have cut short.
    fn resweep(&self) {
        let vuris: Vec<Uri> = self.nodes.borrow().keys().cloned().collect();
        for vuri in &vuris {
            self.try_emit(vuri);
        }
        if self.opts.scanning_budget.is_some() {
            for vuri in &vuris {
                self.expand_children(vuri);
            }
        }
    }

    fn teardown(&self) {
        let nodes = std::mem::take(&mut *self.nodes.borrow_mut());
        for (_, node) in nodes {
            if let Some(sub) = node.prune_sub {
                sub.dispose();
            }
            if let Some(wrapper) = node.wrapper {
                wrapper.handle().dispose();
            }
        }
        for (_, sub) in self.filter_subs.borrow_mut().drain() {
            sub.dispose();
        }
        self.uri_to_paths.borrow_mut().clear();
        self.prefix_index.borrow_mut().clear();
        self.emitted_uris.borrow_mut().clear();
        self.emitted_count.set(0);
        self.out.dispose();
    }
}

impl std::fmt::Debug for Traversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traversal")
            .field("start", &self.engine.start)
            .field("tracked", &self.engine.nodes.borrow().len())
            .field("emitted", &self.engine.emitted_count.get())
            .finish()
    }
}
