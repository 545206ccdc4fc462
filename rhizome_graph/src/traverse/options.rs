use std::rc::Rc;

use rhizome_reactivity::{Signal, Value};
use rhizome_task::Promise;

use crate::entity::Entity;
use crate::traverse::path::PathCtx;

/// Which edges leave a node during traversal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    /// Follow outgoing edges.
    #[default]
    Out,
    /// Follow incoming edges (tree UIs hang children off their parent
    /// this way).
    In,
    /// Both at once; the path cycle check keeps this from bouncing.
    Both,
}

/// When a node is emitted relative to its children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Pre,
    Post,
}

pub type PathPredicate = Rc<dyn Fn(&Entity, &PathCtx) -> bool>;
pub type EntityWatch = Rc<dyn Fn(&Entity) -> Option<Signal<Value>>>;
pub type PathWatch = Rc<dyn Fn(&Entity, &PathCtx) -> Option<Signal<Value>>>;
pub type ExpandHook = Rc<dyn Fn(&Entity) -> Promise<()>>;

/// Controls for a live traversal. Plain data plus builder setters;
/// everything is optional except the edge kinds to follow.
#[derive(Clone, Default)]
pub struct TraverseOptions {
    pub direction: Direction,
    pub edge_kinds: Vec<Rc<str>>,
    /// Nodes at this depth are still emitted; their children are not
    /// visited. Root is depth 0.
    pub max_depth: Option<usize>,
    pub order: Order,
    /// Iterate every node's neighbors in reverse order, recursively.
    pub reverse: bool,
    /// False hides the wrapper; children are still traversed.
    pub filter: Option<PathPredicate>,
    /// True emits the node but stops traversal below it, per path.
    pub prune: Option<PathPredicate>,
    /// Signal whose change re-evaluates `filter` for the entity (one
    /// watch per entity, shared across its paths).
    pub filter_watch: Option<EntityWatch>,
    /// Signal whose change re-evaluates `prune` for one specific path.
    pub prune_watch: Option<PathWatch>,
    /// Cap on tracked paths.
    pub scanning_budget: Option<usize>,
    /// Cap on emitted wrappers.
    pub result_budget: Option<usize>,
    /// Cap on distinct entity URIs among emitted wrappers.
    pub unique_budget: Option<usize>,
    /// At depth 0, begin neighbor iteration at this sibling.
    pub start_at_child: Option<Rc<str>>,
    /// At depth 0, begin neighbor iteration just after this sibling.
    pub start_after_child: Option<Rc<str>>,
    /// Called once per node before its children expand; expansion
    /// waits for the promise. Rejection skips the subtree.
    pub expand_hook: Option<ExpandHook>,
}

impl TraverseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn edges(mut self, kinds: &[&str]) -> Self {
        self.edge_kinds = kinds.iter().map(|k| Rc::from(*k)).collect();
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn filter(mut self, f: impl Fn(&Entity, &PathCtx) -> bool + 'static) -> Self {
        self.filter = Some(Rc::new(f));
        self
    }

    pub fn prune(mut self, f: impl Fn(&Entity, &PathCtx) -> bool + 'static) -> Self {
        self.prune = Some(Rc::new(f));
        self
    }

    pub fn filter_watch(
        mut self,
        f: impl Fn(&Entity) -> Option<Signal<Value>> + 'static,
    ) -> Self {
        self.filter_watch = Some(Rc::new(f));
        self
    }

    pub fn prune_watch(
        mut self,
        f: impl Fn(&Entity, &PathCtx) -> Option<Signal<Value>> + 'static,
    ) -> Self {
        self.prune_watch = Some(Rc::new(f));
        self
    }

    pub fn scanning_budget(mut self, n: usize) -> Self {
        self.scanning_budget = Some(n);
        self
    }

    pub fn result_budget(mut self, n: usize) -> Self {
        self.result_budget = Some(n);
        self
    }

    pub fn unique_budget(mut self, n: usize) -> Self {
        self.unique_budget = Some(n);
        self
    }

    pub fn start_at_child(mut self, uri: &str) -> Self {
        self.start_at_child = Some(Rc::from(uri));
        self
    }

    pub fn start_after_child(mut self, uri: &str) -> Self {
        self.start_after_child = Some(Rc::from(uri));
        self
    }

    pub fn expand_hook(mut self, f: impl Fn(&Entity) -> Promise<()> + 'static) -> Self {
        self.expand_hook = Some(Rc::new(f));
        self
    }
}
