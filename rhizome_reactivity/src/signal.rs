use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::dispose::{Disposable, Subscription};
use crate::shield::shielded;

/// A deferred teardown returned by an effect body.
pub type Cleanup = Box<dyn FnOnce()>;

struct WatcherEntry<T> {
    id: u64,
    f: Rc<dyn Fn(&T, &T)>,
}

/// 响应式值单元。
///
/// A mutable cell with equal-value write suppression: `set` only
/// notifies watchers when the new value is distinct from the old one
/// (`PartialEq`). Watchers fire synchronously, in registration order,
/// with `(new, old)`. The watcher list is snapshotted before each
/// notification so watchers may subscribe, unsubscribe, or write
/// reentrantly — equal-value suppression is what stops fixpoints.
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    value: RefCell<T>,
    watchers: RefCell<Vec<WatcherEntry<T>>>,
    next_id: Cell<u64>,
    handle: Disposable,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Signal<T> {}

impl<T: 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        let inner = Rc::new(SignalInner {
            value: RefCell::new(value),
            watchers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            handle: Disposable::new(),
        });
        let weak = Rc::downgrade(&inner);
        inner.handle.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                inner.watchers.borrow_mut().clear();
            }
        });
        Self { inner }
    }

    /// Reads the current value through a borrow.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Assigns, notifying watchers only when the value actually changed.
    /// Writes to a disposed signal are dropped.
    pub fn set(&self, value: T)
    where
        T: PartialEq + Clone,
    {
        if self.inner.handle.is_disposed() {
            return;
        }
        if *self.inner.value.borrow() == value {
            return;
        }
        let old = std::mem::replace(&mut *self.inner.value.borrow_mut(), value);
        self.notify(&old);
    }

    /// In-place update with the same change-suppression contract.
    pub fn update(&self, f: impl FnOnce(&mut T))
    where
        T: PartialEq + Clone,
    {
        if self.inner.handle.is_disposed() {
            return;
        }
        let old = self.get();
        f(&mut self.inner.value.borrow_mut());
        if *self.inner.value.borrow() != old {
            self.notify(&old);
        }
    }

    fn notify(&self, old: &T)
    where
        T: Clone,
    {
        let new = self.inner.value.borrow().clone();
        let snapshot: Vec<Rc<dyn Fn(&T, &T)>> = self
            .inner
            .watchers
            .borrow()
            .iter()
            .map(|w| w.f.clone())
            .collect();
        for f in snapshot {
            shielded("signal watcher", || f(&new, old));
        }
    }

    /// Fires on future changes only, with `(new, old)`.
    pub fn watch(&self, f: impl Fn(&T, &T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .watchers
            .borrow_mut()
            .push(WatcherEntry { id, f: Rc::new(f) });

        let weak: Weak<SignalInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut watchers = inner.watchers.borrow_mut();
                if let Some(idx) = watchers.iter().position(|w| w.id == id) {
                    watchers.remove(idx);
                }
            }
        })
    }

    /// Fires immediately with the current value, then on every change.
    /// The body may return a cleanup that runs before the next fire and
    /// when the subscription is disposed.
    pub fn effect<F>(&self, f: F) -> Subscription
    where
        T: Clone,
        F: FnMut(&T) -> Option<Cleanup> + 'static,
    {
        let state = Rc::new(RefCell::new(EffectState {
            body: f,
            pending: None,
        }));

        {
            let current = self.get();
            let mut s = state.borrow_mut();
            let produced = shielded("effect body", || (s.body)(&current)).flatten();
            s.pending = produced;
        }

        let st = state.clone();
        let watch = self.watch(move |new, _old| {
            let mut s = st.borrow_mut();
            if let Some(cleanup) = s.pending.take() {
                shielded("effect cleanup", cleanup);
            }
            let produced = shielded("effect body", || (s.body)(new)).flatten();
            s.pending = produced;
        });

        Subscription::new(move || {
            if let Some(cleanup) = state.borrow_mut().pending.take() {
                shielded("effect cleanup", cleanup);
            }
            watch.dispose();
        })
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.handle.is_disposed()
    }

    /// Detaches every watcher and rejects future writes.
    pub fn dispose(&self) {
        self.inner.handle.dispose();
    }
}

struct EffectState<F> {
    body: F,
    pending: Option<Cleanup>,
}

impl<T: 'static> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signal({:p})", Rc::as_ptr(&self.inner))
    }
}

/// The type-erased "tell me when you change" capability, implemented by
/// [`Signal`] and [`crate::computed::Computed`]. This is what lets a
/// derived cell declare dependencies of mixed value types.
pub trait Watch {
    fn on_change(&self, f: Rc<dyn Fn()>) -> Subscription;
}

impl<T: 'static> Watch for Signal<T> {
    fn on_change(&self, f: Rc<dyn Fn()>) -> Subscription {
        self.watch(move |_, _| f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_suppresses_equal_values() {
        let sig = Signal::new(1);
        let count = Rc::new(Cell::new(0));
        let _sub = {
            let count = count.clone();
            sig.watch(move |_, _| count.set(count.get() + 1))
        };

        sig.set(1);
        assert_eq!(count.get(), 0);
        sig.set(2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_watch_sees_new_and_old() {
        let sig = Signal::new("a".to_string());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            sig.watch(move |new, old| seen.borrow_mut().push((new.clone(), old.clone())))
        };

        sig.set("b".to_string());
        assert_eq!(*seen.borrow(), vec![("b".to_string(), "a".to_string())]);
    }

    #[test]
    fn test_watchers_fire_in_registration_order() {
        let sig = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let _a = {
            let log = log.clone();
            sig.watch(move |_, _| log.borrow_mut().push("a"))
        };
        let _b = {
            let log = log.clone();
            sig.watch(move |_, _| log.borrow_mut().push("b"))
        };

        sig.set(1);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_effect_fires_immediately_and_cleans_up() {
        let sig = Signal::new(10);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = {
            let log = log.clone();
            sig.effect(move |v| {
                log.borrow_mut().push(format!("run {v}"));
                let log = log.clone();
                let v = *v;
                Some(Box::new(move || log.borrow_mut().push(format!("undo {v}"))) as Cleanup)
            })
        };

        sig.set(11);
        sub.dispose();
        assert_eq!(
            *log.borrow(),
            vec!["run 10", "undo 10", "run 11", "undo 11"]
        );
    }

    #[test]
    fn test_unsubscribed_watcher_is_silent() {
        let sig = Signal::new(0);
        let count = Rc::new(Cell::new(0));
        let sub = {
            let count = count.clone();
            sig.watch(move |_, _| count.set(count.get() + 1))
        };
        sub.dispose();
        sig.set(5);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_disposed_signal_drops_writes_and_watchers() {
        let sig = Signal::new(0);
        let count = Rc::new(Cell::new(0));
        let _sub = {
            let count = count.clone();
            sig.watch(move |_, _| count.set(count.get() + 1))
        };
        sig.dispose();
        sig.set(9);
        assert_eq!(count.get(), 0);
        assert_eq!(sig.get(), 0);
        assert_eq!(sig.watcher_count(), 0);
    }

    #[test]
    fn test_reentrant_write_converges_via_suppression() {
        let sig = Signal::new(0);
        let echo = sig.clone();
        let _sub = sig.watch(move |new, _| {
            // Writing the same value back must not loop.
            echo.set(*new);
        });
        sig.set(3);
        assert_eq!(sig.get(), 3);
    }
}
