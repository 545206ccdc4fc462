//! A miniature debugger outline: sessions own threads own frames, a
//! collapsed flag prunes subtrees, and the traversal keeps the printed
//! tree current while the graph churns.

use rhizome::prelude::*;

fn outline(tree: &Traversal) {
    for wrapper in tree.iter() {
        let indent = "  ".repeat(wrapper.meta().filtered_depth);
        println!("{indent}{}", wrapper.entity().key());
    }
    println!("---");
}

fn main() {
    let store = EntityStore::new();

    store.add(Entity::new("session-1"), "session");
    let collapsed = Signal::new(Value::from(false));
    store.add_with_edges(
        Entity::new("thread-main").put_signal("collapsed", collapsed.clone()),
        "thread",
        &[("parent", "session-1")],
    );
    for frame in ["frame-0", "frame-1"] {
        store.add_with_edges(Entity::new(frame), "frame", &[("parent", "thread-main")]);
    }

    let tree = store.bfs(
        "session-1",
        TraverseOptions::new()
            .direction(Direction::In)
            .edges(&["parent"])
            .prune(|e, _| e.get("collapsed").is_some_and(|v| v.truthy()))
            .prune_watch(|e, _| e.signal("collapsed")),
    );

    let _added = tree.on_added(|w| println!("+ {}", w.virtual_uri()));
    let _removed = tree.on_removed(|w| println!("- {}", w.virtual_uri()));

    outline(&tree);

    println!("collapsing thread-main");
    collapsed.set(Value::from(true));
    outline(&tree);

    println!("expanding thread-main");
    collapsed.set(Value::from(false));
    outline(&tree);

    println!("a new frame arrives while expanded");
    store.add_with_edges(Entity::new("frame-2"), "frame", &[("parent", "thread-main")]);
    outline(&tree);

    println!("the session dies; the tree empties");
    store.dispose_entity("session-1");
    outline(&tree);
}
