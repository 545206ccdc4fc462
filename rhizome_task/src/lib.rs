//! Promise + cooperative scheduling for the rhizome engine.
//!
//! The engine itself is synchronous; these primitives exist so that
//! user-supplied hooks (lazy child expansion, adapters fetching data)
//! can suspend without blocking graph mutations. One thread, explicit
//! pumping, no locks.

mod promise;
mod scheduler;

pub use promise::{Promise, TaskError};
pub use scheduler::Scheduler;
