//! Rhizome: a reactive entity-graph engine.
//!
//! Typed entities and edges in a single-threaded in-memory store, live
//! indexed views, and path-aware reactive traversals, built on
//! fine-grained signals with cascading disposal. The intended consumer
//! is an embedding front-end (the original one is a debugger UI) that
//! renders live collections and never re-queries.
//!
//! ```
//! use rhizome::prelude::*;
//!
//! let store = EntityStore::new();
//! store.add(Entity::new("session"), "session");
//! store.add_with_edges(Entity::new("t1"), "thread", &[("parent", "session")]);
//!
//! let threads = store.view("thread");
//! assert_eq!(threads.count(), 1);
//!
//! let tree = store.bfs(
//!     "session",
//!     TraverseOptions::new().direction(Direction::In).edges(&["parent"]),
//! );
//! assert_eq!(tree.len(), 2);
//! ```

pub use rhizome_graph as graph;
pub use rhizome_reactivity as reactivity;
pub use rhizome_task as task;

pub mod prelude {
    pub use rhizome_graph::{
        Attr, Direction, Edge, Entity, EntityStore, Kind, LiveSet, Order, PARENT_EDGE, PathCtx,
        Probe, StoreError, Traversal, TraverseOptions, Uri, View, Wrapper,
    };
    pub use rhizome_reactivity::{
        Cleanup, Collection, Computed, Disposable, IndexBinding, Item, List, Listeners, Set,
        Signal, Subscription, Value, Watch,
    };
    pub use rhizome_task::{Promise, Scheduler, TaskError};
}
