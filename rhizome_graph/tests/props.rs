use proptest::prelude::*;

use rhizome_graph::{Entity, EntityStore};
use rhizome_reactivity::{IndexBinding, Signal, Value};

const NODES: [&str; 4] = ["a", "b", "c", "d"];
const KINDS: [&str; 2] = ["x", "y"];

fn seeded() -> EntityStore {
    let store = EntityStore::new();
    for uri in NODES {
        store.add(Entity::new(uri), "node");
    }
    store
}

fn assert_edge_duality(store: &EntityStore) {
    for uri in NODES {
        for edge in store.edges_from(uri) {
            let reverse = store.edges_to(&edge.to);
            assert_eq!(
                reverse.iter().filter(|e| **e == edge).count(),
                1,
                "outgoing edge without exactly one reverse entry"
            );
        }
        for edge in store.edges_to(uri) {
            let forward = store.edges_from(&edge.from);
            assert_eq!(
                forward.iter().filter(|e| **e == edge).count(),
                1,
                "reverse edge without exactly one outgoing entry"
            );
        }
    }
}

proptest! {
    /// Random edge churn keeps outgoing/reverse structures dual, and
    /// removing everything that was added restores the empty state.
    #[test]
    fn prop_edge_churn_preserves_duality(
        ops in proptest::collection::vec((0usize..4, 0usize..4, 0usize..2), 1..48)
    ) {
        let store = seeded();
        let mut live: Vec<(usize, usize, usize)> = Vec::new();

        for (f, t, k) in ops {
            let triple = (f, t, k);
            if live.contains(&triple) {
                prop_assert!(store.remove_edge(NODES[f], KINDS[k], NODES[t]));
                live.retain(|x| *x != triple);
            } else {
                prop_assert!(store.add_edge(NODES[f], KINDS[k], NODES[t]));
                live.push(triple);
            }
            assert_edge_duality(&store);
        }

        for (f, t, k) in live {
            prop_assert!(store.remove_edge(NODES[f], KINDS[k], NODES[t]));
        }
        for uri in NODES {
            prop_assert!(store.edges_from(uri).is_empty());
            prop_assert!(store.edges_to(uri).is_empty());
        }
    }

    /// Random signal writes keep every index bucket consistent with the
    /// getter's current value.
    #[test]
    fn prop_index_tracks_signal_writes(
        writes in proptest::collection::vec((0usize..4, 0usize..3), 1..48)
    ) {
        let states = ["running", "stopped", "exited"];
        let store = EntityStore::new();
        store.add_index("thread", "by_state", |e: &Entity| match e.signal("state") {
            Some(sig) => IndexBinding::Reactive(sig),
            None => IndexBinding::Const(Value::Null),
        });

        let mut signals = Vec::new();
        let mut current = Vec::new();
        for uri in NODES {
            let sig = Signal::new(Value::from("running"));
            store.add(
                Entity::new(uri).put_signal("state", sig.clone()),
                "thread",
            );
            signals.push(sig);
            current.push("running");
        }

        for (who, state_idx) in writes {
            let state = states[state_idx];
            signals[who].set(Value::from(state));
            current[who] = state;

            for (i, uri) in NODES.iter().enumerate() {
                for state in states {
                    let bucket = store.get_by("thread", "by_state", state);
                    let present = bucket.iter().any(|e| &*e.uri() == *uri);
                    prop_assert_eq!(
                        present,
                        current[i] == state,
                        "index bucket diverged from signal value"
                    );
                }
            }
        }
    }
}
