use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::shield::shielded;

/// 清理回调列表，按注册顺序存放，释放时以 LIFO 执行。
#[derive(Default)]
pub(crate) enum CleanupList {
    #[default]
    Empty,
    Single(Box<dyn FnOnce()>),
    Many(Vec<Box<dyn FnOnce()>>),
}

impl CleanupList {
    pub(crate) fn push(&mut self, f: Box<dyn FnOnce()>) {
        if let Self::Many(vec) = self {
            vec.push(f);
            return;
        }

        let old = std::mem::take(self);
        match old {
            Self::Empty => *self = Self::Single(f),
            Self::Single(prev) => *self = Self::Many(vec![prev, f]),
            Self::Many(_) => unreachable!(),
        }
    }

    fn into_vec(self) -> Vec<Box<dyn FnOnce()>> {
        match self {
            Self::Empty => Vec::new(),
            Self::Single(f) => vec![f],
            Self::Many(vec) => vec,
        }
    }
}

/// A lifecycle handle with cascading ownership.
///
/// Cloning shares the same underlying handle (identity is pointer
/// identity). Disposal is idempotent: it runs registered cleanups in
/// LIFO order, then disposes children in LIFO order. A handle adopted
/// via [`Disposable::set_parent`] is disposed when its parent is.
#[derive(Clone)]
pub struct Disposable {
    inner: Rc<Inner>,
}

struct Inner {
    disposed: Cell<bool>,
    cleanups: RefCell<CleanupList>,
    parent: RefCell<Option<Weak<Inner>>>,
    children: RefCell<Vec<Disposable>>,
}

impl Default for Disposable {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                disposed: Cell::new(false),
                cleanups: RefCell::new(CleanupList::Empty),
                parent: RefCell::new(None),
                children: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Stable identity of this handle, shared by all clones.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Appends a cleanup. Cleanups run LIFO at disposal; registering on
    /// an already-disposed handle runs `f` immediately.
    pub fn on_dispose(&self, f: impl FnOnce() + 'static) {
        if self.inner.disposed.get() {
            shielded("on_dispose(late)", f);
            return;
        }
        self.inner.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Links this handle under `parent`, detaching from any previous
    /// parent first. Adopting into a disposed parent disposes `self`.
    pub fn set_parent(&self, parent: &Disposable) {
        if Rc::ptr_eq(&self.inner, &parent.inner) {
            return;
        }
        self.unlink_from_parent();
        if parent.is_disposed() {
            self.dispose();
            return;
        }
        parent.inner.children.borrow_mut().push(self.clone());
        *self.inner.parent.borrow_mut() = Some(Rc::downgrade(&parent.inner));
    }

    /// Detaches from the current parent without disposing (used when an
    /// item is moved between owners).
    pub fn clear_parent(&self) {
        self.unlink_from_parent();
    }

    fn unlink_from_parent(&self) {
        let old = self.inner.parent.borrow_mut().take();
        if let Some(weak) = old
            && let Some(parent) = weak.upgrade()
        {
            let mut children = parent.children.borrow_mut();
            if let Some(idx) = children
                .iter()
                .position(|c| Rc::ptr_eq(&c.inner, &self.inner))
            {
                children.swap_remove(idx);
            }
        }
    }

    /// Idempotent. Unlinks from the parent, runs cleanups LIFO, then
    /// disposes children LIFO. Faulting cleanups are contained.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.unlink_from_parent();

        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut()).into_vec();
        for f in cleanups.into_iter().rev() {
            shielded("dispose cleanup", f);
        }

        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children.into_iter().rev() {
            child.dispose();
        }
    }
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("id", &self.id())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// An undoable registration (a watcher, a listener, an index hook).
///
/// Dropping a `Subscription` does NOT detach it; call
/// [`Subscription::dispose`] or parent it to a [`Disposable`] whose
/// teardown should carry it away.
#[derive(Clone)]
pub struct Subscription {
    handle: Disposable,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        let handle = Disposable::new();
        handle.on_dispose(unsubscribe);
        Self { handle }
    }

    /// A subscription with nothing to undo.
    pub fn empty() -> Self {
        Self {
            handle: Disposable::new(),
        }
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    pub fn set_parent(&self, parent: &Disposable) {
        self.handle.set_parent(parent);
    }

    pub fn handle(&self) -> &Disposable {
        &self.handle
    }
}
