use std::collections::HashSet;
use std::rc::Rc;

use rhizome_reactivity::Subscription;

use crate::edge::Edge;
use crate::entity::{Entity, Uri};
use crate::traverse::wrapper::Wrapper;

/// Where one path stands in the graph: handed to `filter`/`prune`, and
/// recorded on every emitted wrapper.
///
/// `path`/`pathkeys` are the ancestor chain (root first, terminal
/// entity excluded); `uri` is the virtual URI — the slash-joined
/// ancestor keys plus the entity's own key, so the same entity reached
/// along two routes shows up twice with distinct URIs. The `filtered_*`
/// quartet restricts the chain to ancestors that passed the active
/// filter, which is the parent pointer a tree UI actually hangs rows
/// on.
#[derive(Clone)]
pub struct PathCtx {
    /// Virtual URI of this path.
    pub uri: Uri,
    /// Ancestor entity URIs, root first.
    pub path: Rc<[Uri]>,
    /// Ancestor keys, root first.
    pub pathkeys: Rc<[Uri]>,
    pub depth: usize,
    /// Parent path's virtual URI.
    pub parent: Option<Uri>,
    pub filtered_path: Rc<[Uri]>,
    pub filtered_pathkeys: Rc<[Uri]>,
    pub filtered_depth: usize,
    /// Virtual URI of the nearest emitted ancestor.
    pub filtered_parent: Option<Uri>,
}

/// Engine-side record for one tracked path.
///
/// Lifecycle: tracked (possibly unemitted — filtered out or over
/// budget) → emitted (wrapper present) → possibly pruned below →
/// removed.
pub(crate) struct PathNode {
    pub(crate) entity: Entity,
    pub(crate) ctx: PathCtx,
    /// Ancestors plus self, for O(1) cycle checks.
    pub(crate) path_set: Rc<HashSet<Uri>>,
    /// The edge this path rode in on (`None` for the root).
    pub(crate) via: Option<Edge>,
    pub(crate) passed_filter: bool,
    pub(crate) pruned: bool,
    pub(crate) wrapper: Option<Wrapper>,
    pub(crate) prune_sub: Option<Subscription>,
    /// The expand hook fired for this node.
    pub(crate) hook_fired: bool,
    /// The expand hook settled successfully; children may spread.
    pub(crate) hook_done: bool,
}
