use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use rhizome_reactivity::{Disposable, shielded};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,
    #[error("task failed: {0}")]
    Failed(String),
}

enum State<T> {
    Pending {
        on_fulfill: Vec<Box<dyn FnOnce(&T)>>,
        on_reject: Vec<Box<dyn FnOnce(&TaskError)>>,
        wakers: Vec<Waker>,
    },
    Fulfilled(T),
    Rejected(TaskError),
}

/// A settle-once asynchronous value with synchronous callbacks.
///
/// `then_do`/`catch_do` run immediately when the promise is already
/// settled, otherwise at settlement, inside the `resolve`/`reject`
/// call. Awaiting a promise yields `Result<T, TaskError>` — rejection
/// is a value, not a panic. Disposing a pending promise rejects it
/// with [`TaskError::Cancelled`].
pub struct Promise<T: 'static> {
    inner: Rc<PromiseInner<T>>,
}

struct PromiseInner<T> {
    state: RefCell<State<T>>,
    handle: Disposable,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Promise<T> {
    pub fn new() -> Self {
        let inner = Rc::new(PromiseInner {
            state: RefCell::new(State::Pending {
                on_fulfill: Vec::new(),
                on_reject: Vec::new(),
                wakers: Vec::new(),
            }),
            handle: Disposable::new(),
        });
        let weak = Rc::downgrade(&inner);
        inner.handle.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                PromiseInner::settle_rejected(&inner, TaskError::Cancelled);
            }
        });
        Self { inner }
    }

    pub fn resolved(value: T) -> Self
    where
        T: Clone,
    {
        let p = Self::new();
        p.resolve(value);
        p
    }

    pub fn rejected(err: TaskError) -> Self {
        let p = Self::new();
        p.reject(err);
        p
    }

    /// Fulfills the promise; a second settle attempt is ignored.
    pub fn resolve(&self, value: T)
    where
        T: Clone,
    {
        let taken = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Pending {
                    on_fulfill, wakers, ..
                } => {
                    let callbacks = std::mem::take(on_fulfill);
                    let wakers = std::mem::take(wakers);
                    *state = State::Fulfilled(value.clone());
                    Some((callbacks, wakers))
                }
                _ => None,
            }
        };
        let Some((callbacks, wakers)) = taken else {
            return;
        };
        for f in callbacks {
            shielded("promise fulfill", || f(&value));
        }
        for w in wakers {
            w.wake();
        }
    }

    /// Rejects the promise; a second settle attempt is ignored.
    pub fn reject(&self, err: TaskError) {
        PromiseInner::settle_rejected(&self.inner, err);
    }

    /// Runs `f` with the value — now if already fulfilled, otherwise at
    /// fulfillment. Dropped silently if the promise rejects.
    pub fn then_do(&self, f: impl FnOnce(&T) + 'static)
    where
        T: Clone,
    {
        let ready = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Pending { on_fulfill, .. } => {
                    on_fulfill.push(Box::new(f));
                    return;
                }
                State::Fulfilled(v) => Some(v.clone()),
                State::Rejected(_) => None,
            }
        };
        if let Some(v) = ready {
            shielded("promise fulfill", || f(&v));
        }
    }

    /// Runs `f` with the error — now if already rejected, otherwise at
    /// rejection. Dropped silently if the promise fulfills.
    pub fn catch_do(&self, f: impl FnOnce(&TaskError) + 'static) {
        let ready = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Pending { on_reject, .. } => {
                    on_reject.push(Box::new(f));
                    return;
                }
                State::Rejected(err) => Some(err.clone()),
                State::Fulfilled(_) => None,
            }
        };
        if let Some(err) = ready {
            shielded("promise reject", || f(&err));
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Pending { .. })
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// The settled outcome, if any, without consuming the promise.
    pub fn peek(&self) -> Option<Result<T, TaskError>>
    where
        T: Clone,
    {
        match &*self.inner.state.borrow() {
            State::Pending { .. } => None,
            State::Fulfilled(v) => Some(Ok(v.clone())),
            State::Rejected(err) => Some(Err(err.clone())),
        }
    }

    pub fn handle(&self) -> &Disposable {
        &self.inner.handle
    }

    /// Cancels a pending promise (rejects with [`TaskError::Cancelled`]).
    pub fn dispose(&self) {
        self.inner.handle.dispose();
    }
}

impl<T> PromiseInner<T> {
    fn settle_rejected(inner: &Rc<Self>, err: TaskError) {
        let taken = {
            let mut state = inner.state.borrow_mut();
            match &mut *state {
                State::Pending {
                    on_reject, wakers, ..
                } => {
                    let callbacks = std::mem::take(on_reject);
                    let wakers = std::mem::take(wakers);
                    *state = State::Rejected(err.clone());
                    Some((callbacks, wakers))
                }
                _ => None,
            }
        };
        let Some((callbacks, wakers)) = taken else {
            return;
        };
        for f in callbacks {
            shielded("promise reject", || f(&err));
        }
        for w in wakers {
            w.wake();
        }
    }
}

impl<T: Clone + 'static> Future for Promise<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.borrow_mut();
        match &mut *state {
            State::Pending { wakers, .. } => {
                wakers.push(cx.waker().clone());
                Poll::Pending
            }
            State::Fulfilled(v) => Poll::Ready(Ok(v.clone())),
            State::Rejected(err) => Poll::Ready(Err(err.clone())),
        }
    }
}
