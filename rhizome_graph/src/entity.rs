use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use rhizome_reactivity::{Disposable, Item, Signal, Value};

use crate::error::StoreError;

/// Globally unique entity identifier.
pub type Uri = Rc<str>;

/// Entity type / edge type name.
pub type Kind = Rc<str>;

/// One payload field: a plain value or a live cell.
#[derive(Clone)]
pub enum Attr {
    Const(Value),
    Reactive(Signal<Value>),
}

/// An application object in the graph: a URI, a short path key, a kind
/// stamped by the store at insertion, and an open attribute map whose
/// fields may be plain values or signals.
///
/// Handles are cheap clones of one shared record; identity and equality
/// are pointer identity.
pub struct Entity {
    inner: Rc<EntityInner>,
}

struct EntityInner {
    uri: Uri,
    key: Uri,
    kind: OnceCell<Kind>,
    attrs: RefCell<HashMap<Rc<str>, Attr>>,
    handle: Disposable,
}

impl Clone for Entity {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entity {}

impl Entity {
    /// The key defaults to the URI tail after the last `/`.
    pub fn new(uri: impl AsRef<str>) -> Self {
        let uri = uri.as_ref();
        let key = uri.rsplit('/').next().unwrap_or(uri);
        Self::with_key(uri, key)
    }

    pub fn with_key(uri: impl AsRef<str>, key: impl AsRef<str>) -> Self {
        Self {
            inner: Rc::new(EntityInner {
                uri: Rc::from(uri.as_ref()),
                key: Rc::from(key.as_ref()),
                kind: OnceCell::new(),
                attrs: RefCell::new(HashMap::new()),
                handle: Disposable::new(),
            }),
        }
    }

    pub fn uri(&self) -> Uri {
        self.inner.uri.clone()
    }

    pub fn key(&self) -> Uri {
        self.inner.key.clone()
    }

    /// The kind stamped at insertion; `None` before the entity joins a
    /// store.
    pub fn kind(&self) -> Option<Kind> {
        self.inner.kind.get().cloned()
    }

    pub(crate) fn assign_kind(&self, kind: Kind) -> Result<(), StoreError> {
        self.inner
            .kind
            .set(kind)
            .map_err(|_| StoreError::KindAlreadyAssigned(self.inner.uri.to_string()))
    }

    /// Sets a plain attribute, returning `self` for chained setup.
    pub fn put(self, name: &str, value: impl Into<Value>) -> Self {
        self.inner
            .attrs
            .borrow_mut()
            .insert(Rc::from(name), Attr::Const(value.into()));
        self
    }

    /// Sets a reactive attribute.
    pub fn put_signal(self, name: &str, signal: Signal<Value>) -> Self {
        self.inner
            .attrs
            .borrow_mut()
            .insert(Rc::from(name), Attr::Reactive(signal));
        self
    }

    /// Reads an attribute, resolving signals to their current value.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.inner.attrs.borrow().get(name)? {
            Attr::Const(v) => Some(v.clone()),
            Attr::Reactive(sig) => Some(sig.get()),
        }
    }

    /// The raw signal behind a reactive attribute.
    pub fn signal(&self, name: &str) -> Option<Signal<Value>> {
        match self.inner.attrs.borrow().get(name)? {
            Attr::Const(_) => None,
            Attr::Reactive(sig) => Some(sig.clone()),
        }
    }

    pub fn attr(&self, name: &str) -> Option<Attr> {
        self.inner.attrs.borrow().get(name).cloned()
    }

    /// The value views key membership on: the `id` attribute when
    /// present, else the URI.
    pub fn ident(&self) -> Value {
        self.get("id")
            .unwrap_or_else(|| Value::Str(self.inner.uri.clone()))
    }

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.handle.is_disposed()
    }
}

impl Item for Entity {
    fn item_id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    fn handle(&self) -> &Disposable {
        &self.inner.handle
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("uri", &self.inner.uri)
            .field("kind", &self.inner.kind.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_defaults_to_uri_tail() {
        assert_eq!(&*Entity::new("dap://session/thread/1").key(), "1");
        assert_eq!(&*Entity::new("root").key(), "root");
        assert_eq!(&*Entity::with_key("dap://t/9", "t9").key(), "t9");
    }

    #[test]
    fn test_kind_is_write_once() {
        let e = Entity::new("a");
        assert!(e.assign_kind(Rc::from("thread")).is_ok());
        assert!(e.assign_kind(Rc::from("frame")).is_err());
        assert_eq!(e.kind().as_deref(), Some("thread"));
    }

    #[test]
    fn test_get_reads_through_signals() {
        let state = Signal::new(Value::from("running"));
        let e = Entity::new("t1")
            .put("name", "main")
            .put_signal("state", state.clone());

        assert_eq!(e.get("name"), Some(Value::from("main")));
        assert_eq!(e.get("state"), Some(Value::from("running")));
        state.set(Value::from("stopped"));
        assert_eq!(e.get("state"), Some(Value::from("stopped")));
        assert!(e.signal("name").is_none());
    }

    #[test]
    fn test_ident_prefers_id_attribute() {
        let plain = Entity::new("dap://s/1");
        assert_eq!(plain.ident(), Value::from("dap://s/1"));
        let tagged = Entity::new("dap://s/1").put("id", 42);
        assert_eq!(tagged.ident(), Value::from(42));
    }
}
