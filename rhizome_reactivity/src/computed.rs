use std::rc::Rc;

use crate::dispose::{Disposable, Subscription};
use crate::shield::shielded;
use crate::signal::{Cleanup, Signal, Watch};

/// A read-only cell derived from an explicit dependency list.
///
/// The body is evaluated once at creation and again whenever any
/// dependency fires; the result is published through an inner signal
/// only when it differs from the previous value. There is no automatic
/// dependency tracking — the caller names what the body reads.
pub struct Computed<T: 'static> {
    out: Signal<T>,
    handle: Disposable,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            out: self.out.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T: PartialEq + Clone + 'static> Computed<T> {
    pub fn new(deps: &[&dyn Watch], body: impl Fn() -> T + 'static) -> Self {
        let out = Signal::new(body());
        let handle = Disposable::new();
        out.handle().set_parent(&handle);

        let body = Rc::new(body);
        for dep in deps {
            let out = out.clone();
            let body = body.clone();
            let sub = dep.on_change(Rc::new(move || {
                // A faulting body keeps the previous value.
                if let Some(next) = shielded("computed body", || body()) {
                    out.set(next);
                }
            }));
            sub.set_parent(&handle);
        }

        Self { out, handle }
    }

    pub fn get(&self) -> T {
        self.out.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.out.with(f)
    }

    pub fn watch(&self, f: impl Fn(&T, &T) + 'static) -> Subscription {
        self.out.watch(f)
    }

    pub fn effect<F>(&self, f: F) -> Subscription
    where
        F: FnMut(&T) -> Option<Cleanup> + 'static,
    {
        self.out.effect(f)
    }

    pub fn handle(&self) -> &Disposable {
        &self.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    /// Releases every dependency subscription and the inner cell.
    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl<T: 'static> Watch for Computed<T> {
    fn on_change(&self, f: Rc<dyn Fn()>) -> Subscription {
        self.out.watch(move |_, _| f())
    }
}
