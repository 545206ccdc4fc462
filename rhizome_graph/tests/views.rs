use std::cell::RefCell;
use std::rc::Rc;

use rhizome_graph::{Entity, EntityStore, Probe};
use rhizome_reactivity::{Cleanup, IndexBinding, Signal, Value};

fn thread_store() -> EntityStore {
    let store = EntityStore::new();
    store.add_index("thread", "by_state", |e: &Entity| match e.signal("state") {
        Some(sig) => IndexBinding::Reactive(sig),
        None => IndexBinding::Const(Value::Null),
    });
    store.add_index("thread", "by_session", |e: &Entity| {
        IndexBinding::Const(e.get("session").unwrap_or(Value::Null))
    });
    store
}

fn thread(store: &EntityStore, uri: &str, state: &str) -> Signal<Value> {
    let sig = Signal::new(Value::from(state));
    store.add(
        Entity::new(uri).put_signal("state", sig.clone()),
        "thread",
    );
    sig
}

fn uris(view_entities: Vec<Entity>) -> Vec<String> {
    view_entities.iter().map(|e| e.uri().to_string()).collect()
}

#[test]
fn test_signal_write_moves_entity_between_views() {
    let store = thread_store();
    let state = thread(&store, "t1", "running");

    let running = store.where_eq("thread", "by_state", "running");
    let stopped = store.where_eq("thread", "by_state", "stopped");
    assert_eq!(uris(running.iter()), vec!["t1"]);
    assert!(stopped.is_empty());

    let lost = Rc::new(RefCell::new(Vec::new()));
    let gained = Rc::new(RefCell::new(Vec::new()));
    let _l = {
        let lost = lost.clone();
        running.on_removed(move |e| lost.borrow_mut().push(e.uri().to_string()))
    };
    let _g = {
        let gained = gained.clone();
        stopped.on_added(move |e| gained.borrow_mut().push(e.uri().to_string()))
    };

    state.set(Value::from("stopped"));
    assert_eq!(*lost.borrow(), vec!["t1"]);
    assert_eq!(*gained.borrow(), vec!["t1"]);
    assert!(running.is_empty());
    assert_eq!(uris(stopped.iter()), vec!["t1"]);
}

#[test]
fn test_view_membership_matches_filters() {
    let store = thread_store();
    thread(&store, "t1", "running");
    thread(&store, "t2", "stopped");
    thread(&store, "t3", "running");

    let all = store.view("thread");
    assert_eq!(all.count(), 3);
    assert!(all.contains("t2"));
    assert_eq!(
        uris(store.where_eq("thread", "by_state", "running").iter()),
        vec!["t1", "t3"]
    );
    assert_eq!(
        all.find(|e| e.get("state") == Some(Value::from("stopped")))
            .map(|e| e.uri().to_string()),
        Some("t2".into())
    );
}

#[test]
fn test_derived_where_narrows_further() {
    let store = thread_store();
    let s1 = Signal::new(Value::from("running"));
    store.add(
        Entity::new("t1")
            .put_signal("state", s1.clone())
            .put("session", "s1"),
        "thread",
    );
    store.add(
        Entity::new("t2")
            .put_signal("state", Signal::new(Value::from("running")))
            .put("session", "s2"),
        "thread",
    );

    let narrowed = store
        .view("thread")
        .where_eq("by_state", "running")
        .where_eq("by_session", "s1");
    assert_eq!(uris(narrowed.iter()), vec!["t1"]);

    s1.set(Value::from("stopped"));
    assert!(narrowed.is_empty());
}

#[test]
fn test_cache_shared_and_evicted_by_refcount() {
    let store = thread_store();
    thread(&store, "t1", "running");

    let v1 = store.where_eq("thread", "by_state", "running");
    let v2 = store.where_eq("thread", "by_state", "running");

    v1.dispose();
    // The shared cache must survive v1's release.
    assert_eq!(uris(v2.iter()), vec!["t1"]);
    let hits = Rc::new(RefCell::new(0));
    let _sub = {
        let hits = hits.clone();
        v2.on_added(move |_| *hits.borrow_mut() += 1)
    };
    thread(&store, "t2", "running");
    assert_eq!(*hits.borrow(), 1);

    v2.dispose();
    // Eviction then re-population from the index.
    let v3 = store.where_eq("thread", "by_state", "running");
    assert_eq!(v3.count(), 2);
}

#[test]
fn test_each_runs_for_existing_and_future_with_cleanup() {
    let store = thread_store();
    thread(&store, "t1", "running");

    let log = Rc::new(RefCell::new(Vec::new()));
    let view = store.view("thread");
    let sub = {
        let log = log.clone();
        view.each(move |e| {
            log.borrow_mut().push(format!("in:{}", e.uri()));
            let log = log.clone();
            let uri = e.uri().to_string();
            Some(Box::new(move || log.borrow_mut().push(format!("out:{uri}"))) as Cleanup)
        })
    };

    thread(&store, "t2", "running");
    store.dispose_entity("t1");
    sub.dispose();
    assert_eq!(
        *log.borrow(),
        vec!["in:t1", "in:t2", "out:t1", "out:t2"]
    );
}

#[test]
fn test_latest_follows_additions_and_removals() {
    let store = thread_store();
    thread(&store, "t1", "running");
    let view = store.view("thread");
    let latest = view.latest();
    assert_eq!(
        latest.get().map(|e| e.uri().to_string()),
        Some("t1".into())
    );

    thread(&store, "t2", "running");
    assert_eq!(
        latest.get().map(|e| e.uri().to_string()),
        Some("t2".into())
    );

    store.dispose_entity("t2");
    assert_eq!(
        latest.get().map(|e| e.uri().to_string()),
        Some("t1".into())
    );
    store.dispose_entity("t1");
    assert_eq!(latest.get(), None);
}

#[test]
fn test_some_reacts_to_probe_signals() {
    let store = thread_store();
    let paused1 = Signal::new(Value::from(false));
    store.add(
        Entity::new("t1").put_signal("paused", paused1.clone()),
        "thread",
    );

    let view = store.view("thread");
    let any_paused = view.some(|e| match e.signal("paused") {
        Some(sig) => Probe::Signal(sig),
        None => Probe::Value(false),
    });
    assert!(!any_paused.get());

    paused1.set(Value::from(true));
    assert!(any_paused.get());

    paused1.set(Value::from(false));
    assert!(!any_paused.get());
}

#[test]
fn test_every_reacts_to_membership() {
    let store = thread_store();
    thread(&store, "t1", "stopped");
    let view = store.view("thread");
    let all_stopped = view.every(|e| {
        Probe::Value(e.get("state") == Some(Value::from("stopped")))
    });
    assert!(all_stopped.get());

    thread(&store, "t2", "running");
    assert!(!all_stopped.get());

    store.dispose_entity("t2");
    assert!(all_stopped.get());
}

#[test]
fn test_aggregate_recomputes_on_change() {
    let store = thread_store();
    thread(&store, "t1", "running");
    let view = store.view("thread");
    let count = view.aggregate(|items| items.len() as i64);
    assert_eq!(count.get(), 1);

    thread(&store, "t2", "running");
    assert_eq!(count.get(), 2);
    store.dispose_entity("t1");
    assert_eq!(count.get(), 1);
}

#[test]
fn test_where_in_follows_both_sides() {
    let store = thread_store();
    store.add(Entity::new("s1").put("id", "s1"), "session");
    thread(&store, "t1", "running");
    // by_session is a const index read at insertion; set before add.
    store.add(
        Entity::new("t2")
            .put_signal("state", Signal::new(Value::from("running")))
            .put("session", "s1"),
        "thread",
    );

    let sessions = store.view("session");
    let threads = store.view("thread");
    let in_live_session = threads.where_in("by_session", &sessions);
    assert_eq!(in_live_session.len(), 1);
    assert!(in_live_session.contains_uri("t2"));

    // New thread pointing at a live session joins.
    store.add(
        Entity::new("t3")
            .put_signal("state", Signal::new(Value::from("running")))
            .put("session", "s1"),
        "thread",
    );
    assert!(in_live_session.contains_uri("t3"));

    // Session leaving empties the membership.
    store.dispose_entity("s1");
    assert!(in_live_session.is_empty());

    // Session arriving repopulates.
    store.add(Entity::new("s1b").put("id", "s1"), "session");
    assert_eq!(in_live_session.len(), 2);
}

#[test]
fn test_follow_refcounts_by_distinct_edges() {
    let store = thread_store();
    store.add(Entity::new("s1"), "session");
    thread(&store, "t1", "running");
    thread(&store, "t2", "running");
    store.add_edge("t1", "parent", "s1");
    store.add_edge("t2", "parent", "s1");

    let threads = store.view("thread");
    let sessions = threads.follow("parent", Some("session"));
    assert_eq!(sessions.len(), 1);
    assert!(sessions.contains_uri("s1"));

    // One of two edges going away keeps the shared target.
    store.remove_edge("t1", "parent", "s1");
    assert_eq!(sessions.len(), 1);
    store.remove_edge("t2", "parent", "s1");
    assert!(sessions.is_empty());

    // Re-linking brings it back; dropping the source thread drops it.
    store.add_edge("t1", "parent", "s1");
    assert_eq!(sessions.len(), 1);
    store.dispose_entity("t1");
    assert!(sessions.is_empty());
}

#[test]
fn test_follow_resolves_pending_target_on_arrival() {
    let store = thread_store();
    thread(&store, "t1", "running");
    // The edge points at a session that does not exist yet.
    store.add_edge("t1", "parent", "s1");

    let threads = store.view("thread");
    let sessions = threads.follow("parent", Some("session"));
    assert!(sessions.is_empty());

    // Arrival with the matching kind resolves the pending edge.
    store.add(Entity::new("s1"), "session");
    assert!(sessions.contains_uri("s1"));
    assert_eq!(sessions.len(), 1);

    // A pending target of the wrong kind never joins.
    store.add_edge("t1", "parent", "w1");
    store.add(Entity::new("w1"), "worker");
    assert!(!sessions.contains_uri("w1"));
    assert_eq!(sessions.len(), 1);

    // The forward-resolved edge still drains normally.
    store.remove_edge("t1", "parent", "s1");
    assert!(sessions.is_empty());
}

#[test]
fn test_view_disposal_cascades_to_derived() {
    let store = thread_store();
    thread(&store, "t1", "running");
    let view = store.view("thread");
    let derived = view.where_eq("by_state", "running");
    let followed = view.follow("parent", None);

    view.dispose();
    assert!(derived.is_disposed());
    assert!(followed.handle().is_disposed());
}
