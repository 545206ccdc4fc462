use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::dispose::Subscription;
use crate::shield::shielded;

struct Entry<A> {
    id: u64,
    f: Rc<dyn Fn(&A)>,
}

impl<A> Clone for Entry<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            f: self.f.clone(),
        }
    }
}

/// Most events have zero or one listener; keep those cases allocation-free.
enum ListenerList<A> {
    Empty,
    Single(Entry<A>),
    Many(Vec<Entry<A>>),
}

impl<A> ListenerList<A> {
    fn push(&mut self, entry: Entry<A>) {
        match std::mem::replace(self, Self::Empty) {
            Self::Empty => *self = Self::Single(entry),
            Self::Single(prev) => *self = Self::Many(vec![prev, entry]),
            Self::Many(mut vec) => {
                vec.push(entry);
                *self = Self::Many(vec);
            }
        }
    }

    fn remove(&mut self, id: u64) {
        match self {
            Self::Empty => {}
            Self::Single(entry) => {
                if entry.id == id {
                    *self = Self::Empty;
                }
            }
            Self::Many(vec) => {
                if let Some(idx) = vec.iter().position(|e| e.id == id) {
                    vec.remove(idx);
                }
                if vec.len() == 1 {
                    let only = vec.pop().unwrap();
                    *self = Self::Single(only);
                } else if vec.is_empty() {
                    *self = Self::Empty;
                }
            }
        }
    }

    fn snapshot(&self) -> Vec<Rc<dyn Fn(&A)>> {
        match self {
            Self::Empty => Vec::new(),
            Self::Single(entry) => vec![entry.f.clone()],
            Self::Many(vec) => vec.iter().map(|e| e.f.clone()).collect(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single(_) => 1,
            Self::Many(vec) => vec.len(),
        }
    }
}

/// A shared registry of callbacks for one event stream.
///
/// Emission snapshots the current list first, so a listener may
/// subscribe, unsubscribe, or mutate reentrantly without corrupting the
/// walk. Faulting listeners are contained; the rest still fire.
pub struct Listeners<A: 'static> {
    inner: Rc<Inner<A>>,
}

struct Inner<A> {
    entries: RefCell<ListenerList<A>>,
    next_id: Cell<u64>,
}

impl<A: 'static> Clone for Listeners<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: 'static> Default for Listeners<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static> Listeners<A> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                entries: RefCell::new(ListenerList::Empty),
                next_id: Cell::new(0),
            }),
        }
    }

    pub fn subscribe(&self, f: impl Fn(&A) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .entries
            .borrow_mut()
            .push(Entry { id, f: Rc::new(f) });

        let weak: Weak<Inner<A>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.entries.borrow_mut().remove(id);
            }
        })
    }

    /// Fires every listener registered at the moment of the call, in
    /// registration order.
    pub fn emit(&self, arg: &A) {
        let snapshot = self.inner.entries.borrow().snapshot();
        for f in snapshot {
            shielded("listener", || f(arg));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every listener at once (terminal teardown).
    pub fn clear(&self) {
        *self.inner.entries.borrow_mut() = ListenerList::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let listeners: Listeners<u32> = Listeners::new();
        for tag in ["a", "b"] {
            let log = log.clone();
            let _keep = listeners.subscribe(move |v| log.borrow_mut().push((tag, *v)));
        }

        listeners.emit(&1);
        assert_eq!(*log.borrow(), vec![("a", 1), ("b", 1)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let count = Rc::new(Cell::new(0));
        let listeners: Listeners<()> = Listeners::new();
        let sub = {
            let count = count.clone();
            listeners.subscribe(move |()| count.set(count.get() + 1))
        };

        listeners.emit(&());
        sub.dispose();
        listeners.emit(&());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_reentrant_unsubscribe_during_emit() {
        let listeners: Listeners<()> = Listeners::new();
        let count = Rc::new(Cell::new(0));

        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let sub = {
            let slot = slot.clone();
            let count = count.clone();
            listeners.subscribe(move |()| {
                count.set(count.get() + 1);
                if let Some(sub) = slot.borrow_mut().take() {
                    sub.dispose();
                }
            })
        };
        *slot.borrow_mut() = Some(sub);

        listeners.emit(&());
        listeners.emit(&());
        assert_eq!(count.get(), 1);
    }
}
