use std::rc::Rc;

use rhizome_reactivity::{Disposable, Item, Signal, Value};

use crate::entity::{Entity, Uri};
use crate::traverse::path::PathCtx;

/// A path-specific handle on an entity.
///
/// One wrapper exists per distinct path to an entity; it carries the
/// path metadata and passes attribute reads through to the entity, so
/// consumers read `name`, reactive state, etc. without caring which
/// route produced the row. Owned by the traversal's output collection.
pub struct Wrapper {
    inner: Rc<WrapperInner>,
}

struct WrapperInner {
    entity: Entity,
    meta: PathCtx,
    handle: Disposable,
}

impl Clone for Wrapper {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Wrapper {
    pub(crate) fn new(entity: Entity, meta: PathCtx) -> Self {
        Self {
            inner: Rc::new(WrapperInner {
                entity,
                meta,
                handle: Disposable::new(),
            }),
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.inner.entity
    }

    /// The underlying entity's URI.
    pub fn uri(&self) -> Uri {
        self.inner.entity.uri()
    }

    /// The virtual URI identifying this path.
    pub fn virtual_uri(&self) -> Uri {
        self.inner.meta.uri.clone()
    }

    pub fn meta(&self) -> &PathCtx {
        &self.inner.meta
    }

    pub fn depth(&self) -> usize {
        self.inner.meta.depth
    }

    /// Attribute read, resolved against the entity.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.entity.get(name)
    }

    pub fn signal(&self, name: &str) -> Option<Signal<Value>> {
        self.inner.entity.signal(name)
    }

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }
}

impl Item for Wrapper {
    fn item_id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    fn handle(&self) -> &Disposable {
        &self.inner.handle
    }
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapper")
            .field("virtual_uri", &self.inner.meta.uri)
            .field("uri", &self.inner.entity.uri())
            .finish()
    }
}
