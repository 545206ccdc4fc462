use std::cell::RefCell;
use std::rc::Rc;

use rhizome_graph::{Direction, Entity, EntityStore, Order, TraverseOptions};
use rhizome_reactivity::{Signal, Value};
use rhizome_task::Promise;

fn node(store: &EntityStore, uri: &str) {
    store.add(Entity::new(uri), "node");
}

fn child_edge(store: &EntityStore, child: &str, parent: &str) {
    store.add_edge(child, "child", parent);
}

fn tree_opts() -> TraverseOptions {
    TraverseOptions::new()
        .direction(Direction::In)
        .edges(&["child"])
}

fn sorted_uris(t: &rhizome_graph::Traversal) -> Vec<String> {
    let mut v: Vec<String> = t.virtual_uris().iter().map(|u| u.to_string()).collect();
    v.sort();
    v
}

#[test]
fn test_diamond_paths_and_edge_removal() {
    let store = EntityStore::new();
    for uri in ["root", "A", "B", "leaf"] {
        node(&store, uri);
    }
    child_edge(&store, "A", "root");
    child_edge(&store, "B", "root");
    child_edge(&store, "leaf", "A");
    child_edge(&store, "leaf", "B");

    let tree = store.bfs("root", tree_opts());
    assert_eq!(
        sorted_uris(&tree),
        vec!["root", "root/A", "root/A/leaf", "root/B", "root/B/leaf"]
    );

    store.remove_edge("leaf", "child", "A");
    assert_eq!(
        sorted_uris(&tree),
        vec!["root", "root/A", "root/B", "root/B/leaf"]
    );
}

#[test]
fn test_cycle_is_cut_per_path() {
    let store = EntityStore::new();
    for uri in ["a", "b", "c"] {
        node(&store, uri);
    }
    store.add_edge("a", "next", "b");
    store.add_edge("b", "next", "c");
    store.add_edge("c", "next", "a");

    let walk = store.bfs(
        "a",
        TraverseOptions::new()
            .direction(Direction::Out)
            .edges(&["next"]),
    );
    assert_eq!(sorted_uris(&walk), vec!["a", "a/b", "a/b/c"]);

    for wrapper in walk.iter() {
        let mut seen: Vec<String> = wrapper.meta().path.iter().map(|u| u.to_string()).collect();
        seen.push(wrapper.uri().to_string());
        let before = seen.len();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), before, "a path revisited an entity");
    }
}

#[test]
fn test_collapse_and_expand_round_trip() {
    let store = EntityStore::new();
    let collapsed = Signal::new(Value::from(false));
    store.add(Entity::new("session"), "node");
    store.add(
        Entity::new("thread").put_signal("collapsed", collapsed.clone()),
        "node",
    );
    for uri in ["frame", "scope", "var"] {
        node(&store, uri);
    }
    child_edge(&store, "thread", "session");
    child_edge(&store, "frame", "thread");
    child_edge(&store, "scope", "frame");
    child_edge(&store, "var", "scope");

    let opts = tree_opts()
        .prune(|e, _| e.get("collapsed").is_some_and(|v| v.truthy()))
        .prune_watch(|e, _| e.signal("collapsed"));
    let tree = store.bfs("session", opts);
    assert_eq!(tree.len(), 5);

    let removed = Rc::new(RefCell::new(Vec::new()));
    let added = Rc::new(RefCell::new(Vec::new()));
    let _r = {
        let removed = removed.clone();
        tree.on_removed(move |w| removed.borrow_mut().push(w.uri().to_string()))
    };
    let _a = {
        let added = added.clone();
        tree.on_added(move |w| added.borrow_mut().push(w.uri().to_string()))
    };

    collapsed.set(Value::from(true));
    assert_eq!(*removed.borrow(), vec!["frame", "scope", "var"]);
    assert_eq!(tree.len(), 2);

    collapsed.set(Value::from(false));
    assert_eq!(*added.borrow(), vec!["frame", "scope", "var"]);
    assert_eq!(tree.len(), 5);

    // The collapse/expand cycle restored the exact virtual URI set.
    assert_eq!(
        sorted_uris(&tree),
        vec![
            "session",
            "session/thread",
            "session/thread/frame",
            "session/thread/frame/scope",
            "session/thread/frame/scope/var",
        ]
    );
}

#[test]
fn test_unique_budget_readmits_on_free() {
    let store = EntityStore::new();
    node(&store, "root");
    for i in 1..=10 {
        node(&store, &i.to_string());
        child_edge(&store, &i.to_string(), "root");
    }

    let tree = store.bfs("root", tree_opts().unique_budget(2));
    assert_eq!(sorted_uris(&tree), vec!["root", "root/1"]);

    store.dispose_entity("1");
    assert_eq!(sorted_uris(&tree), vec!["root", "root/2"]);
}

#[test]
fn test_result_budget_readmits_on_free() {
    let store = EntityStore::new();
    node(&store, "root");
    for i in 1..=4 {
        node(&store, &i.to_string());
        child_edge(&store, &i.to_string(), "root");
    }

    let tree = store.bfs("root", tree_opts().result_budget(3));
    assert_eq!(sorted_uris(&tree), vec!["root", "root/1", "root/2"]);

    store.dispose_entity("2");
    assert_eq!(sorted_uris(&tree), vec!["root", "root/1", "root/3"]);
}

#[test]
fn test_scanning_budget_rediscovers_on_free() {
    let store = EntityStore::new();
    node(&store, "root");
    for i in 1..=5 {
        node(&store, &i.to_string());
        child_edge(&store, &i.to_string(), "root");
    }

    let tree = store.bfs("root", tree_opts().scanning_budget(2));
    assert_eq!(sorted_uris(&tree), vec!["root", "root/1"]);

    store.dispose_entity("1");
    assert_eq!(sorted_uris(&tree), vec!["root", "root/2"]);
}

#[test]
fn test_pre_and_post_order_emission() {
    let store = EntityStore::new();
    for uri in ["root", "a", "b"] {
        node(&store, uri);
    }
    child_edge(&store, "a", "root");
    child_edge(&store, "b", "root");

    let pre = store.bfs("root", tree_opts());
    assert_eq!(
        pre.virtual_uris()
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>(),
        vec!["root", "root/a", "root/b"]
    );

    let post = store.dfs("root", tree_opts().order(Order::Post));
    assert_eq!(
        post.virtual_uris()
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>(),
        vec!["root/a", "root/b", "root"]
    );
}

#[test]
fn test_reverse_flips_sibling_order() {
    let store = EntityStore::new();
    for uri in ["root", "a", "b", "c"] {
        node(&store, uri);
    }
    for child in ["a", "b", "c"] {
        child_edge(&store, child, "root");
    }

    let tree = store.bfs("root", tree_opts().reversed(true));
    assert_eq!(
        tree.virtual_uris()
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>(),
        vec!["root", "root/c", "root/b", "root/a"]
    );
}

#[test]
fn test_filter_hides_without_stopping_descent() {
    let store = EntityStore::new();
    let hidden = Signal::new(Value::from(true));
    node(&store, "root");
    store.add(
        Entity::new("mid").put_signal("hidden", hidden.clone()),
        "node",
    );
    node(&store, "leaf");
    child_edge(&store, "mid", "root");
    child_edge(&store, "leaf", "mid");

    let opts = tree_opts()
        .filter(|e, _| !e.get("hidden").is_some_and(|v| v.truthy()))
        .filter_watch(|e| e.signal("hidden"));
    let tree = store.bfs("root", opts);

    // mid is filtered out but its subtree is still walked.
    assert_eq!(sorted_uris(&tree), vec!["root", "root/mid/leaf"]);
    let leaf = tree.find("root/mid/leaf").unwrap();
    assert_eq!(leaf.meta().parent.as_deref(), Some("root/mid"));
    assert_eq!(leaf.meta().filtered_parent.as_deref(), Some("root"));
    assert_eq!(leaf.meta().filtered_depth, 1);

    hidden.set(Value::from(false));
    assert_eq!(
        sorted_uris(&tree),
        vec!["root", "root/mid", "root/mid/leaf"]
    );

    hidden.set(Value::from(true));
    assert_eq!(sorted_uris(&tree), vec!["root", "root/mid/leaf"]);
}

#[test]
fn test_max_depth_stops_descent() {
    let store = EntityStore::new();
    for uri in ["a", "b", "c", "d"] {
        node(&store, uri);
    }
    child_edge(&store, "b", "a");
    child_edge(&store, "c", "b");
    child_edge(&store, "d", "c");

    let tree = store.bfs("a", tree_opts().max_depth(2));
    assert_eq!(sorted_uris(&tree), vec!["a", "a/b", "a/b/c"]);
}

#[test]
fn test_start_after_child_window() {
    let store = EntityStore::new();
    node(&store, "root");
    for i in 1..=5 {
        node(&store, &i.to_string());
        child_edge(&store, &i.to_string(), "root");
    }

    let tree = store.bfs("root", tree_opts().start_after_child("2"));
    assert_eq!(sorted_uris(&tree), vec!["root", "root/3", "root/4", "root/5"]);

    let tree = store.bfs("root", tree_opts().start_at_child("4"));
    assert_eq!(sorted_uris(&tree), vec!["root", "root/4", "root/5"]);
}

#[test]
fn test_entity_added_later_extends_tracked_paths() {
    let store = EntityStore::new();
    node(&store, "root");
    node(&store, "a");
    child_edge(&store, "a", "root");

    let tree = store.bfs("root", tree_opts());
    assert_eq!(tree.len(), 2);

    store.add_with_edges(Entity::new("b"), "node", &[("child", "a")]);
    assert_eq!(sorted_uris(&tree), vec!["root", "root/a", "root/a/b"]);

    // A later edge alone extends too.
    node(&store, "c");
    store.add_edge("c", "child", "root");
    assert_eq!(
        sorted_uris(&tree),
        vec!["root", "root/a", "root/a/b", "root/c"]
    );
}

#[test]
fn test_start_entity_may_arrive_late() {
    let store = EntityStore::new();
    let tree = store.bfs("root", tree_opts());
    assert!(tree.is_empty());

    node(&store, "root");
    assert_eq!(sorted_uris(&tree), vec!["root"]);
}

#[test]
fn test_dispose_detaches_signal_watchers() {
    let store = EntityStore::new();
    let collapsed = Signal::new(Value::from(false));
    node(&store, "root");
    store.add(
        Entity::new("kid").put_signal("collapsed", collapsed.clone()),
        "node",
    );
    child_edge(&store, "kid", "root");

    let tree = store.bfs(
        "root",
        tree_opts()
            .prune(|e, _| e.get("collapsed").is_some_and(|v| v.truthy()))
            .prune_watch(|e, _| e.signal("collapsed")),
    );
    assert!(collapsed.watcher_count() > 0);

    tree.dispose();
    assert_eq!(collapsed.watcher_count(), 0);
    assert!(tree.is_empty());

    // A disposed traversal no longer reacts.
    node(&store, "late");
    child_edge(&store, "late", "root");
    assert!(tree.is_empty());
}

#[test]
fn test_expand_hook_defers_children_until_settled() {
    let store = EntityStore::new();
    node(&store, "root");
    for uri in ["a", "b"] {
        node(&store, uri);
        child_edge(&store, uri, "root");
    }

    let gate: Promise<()> = Promise::new();
    let hook_gate = gate.clone();
    let tree = store.bfs(
        "root",
        tree_opts().expand_hook(move |e| {
            if &*e.uri() == "root" {
                hook_gate.clone()
            } else {
                Promise::resolved(())
            }
        }),
    );

    assert_eq!(sorted_uris(&tree), vec!["root"]);
    gate.resolve(());
    assert_eq!(sorted_uris(&tree), vec!["root", "root/a", "root/b"]);
}

#[test]
fn test_multi_parent_prune_is_path_specific() {
    // The same entity under two parents collapses one path at a time.
    let store = EntityStore::new();
    let fold_a = Signal::new(Value::from(false));
    node(&store, "root");
    store.add(Entity::new("A").put_signal("fold", fold_a.clone()), "node");
    node(&store, "B");
    node(&store, "leaf");
    child_edge(&store, "A", "root");
    child_edge(&store, "B", "root");
    child_edge(&store, "leaf", "A");
    child_edge(&store, "leaf", "B");

    let tree = store.bfs(
        "root",
        tree_opts()
            .prune(|e, _| e.get("fold").is_some_and(|v| v.truthy()))
            .prune_watch(|e, _| e.signal("fold")),
    );
    assert_eq!(tree.len(), 5);

    fold_a.set(Value::from(true));
    assert_eq!(
        sorted_uris(&tree),
        vec!["root", "root/A", "root/B", "root/B/leaf"]
    );

    fold_a.set(Value::from(false));
    assert_eq!(
        sorted_uris(&tree),
        vec!["root", "root/A", "root/A/leaf", "root/B", "root/B/leaf"]
    );
}
