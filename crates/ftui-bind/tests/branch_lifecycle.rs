//! End-to-end tests: roots, branches, and a recording host state.

use std::rc::Rc;

use ftui_bind::memory::{FacetDescriptor, MemoryTree, TreeOptions};
use ftui_bind::testing::RecordingSink;
use ftui_bind::{
    BindConfig, BindError, BindingSpec, Branch, ContextScope, CursorMap, FacetMap, Phase, Props,
    Root, TREE_PROP,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

/// Route binding logs to the test harness; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn talbot() -> Rc<MemoryTree> {
    MemoryTree::new(json!({"name": "John", "surname": "Talbot"}))
}

fn name_spec() -> BindingSpec {
    BindingSpec::new().cursors(
        CursorMap::new()
            .bind("name", ["name"])
            .bind("surname", ["surname"]),
    )
}

fn rendered(sink: &RecordingSink) -> String {
    let state = sink.state();
    format!(
        "{} {}",
        state.str("name").unwrap_or_default(),
        state.str("surname").unwrap_or_default()
    )
}

#[test]
fn renders_then_follows_tree_updates() {
    init_tracing();
    let tree = talbot();
    let root = Root::mount(&Props::new().with(TREE_PROP, tree.handle())).unwrap();
    let sink = RecordingSink::new();
    let mut branch = Branch::new(name_spec());
    branch.mount(&root.scope().child(), &Props::new(), sink.handle()).unwrap();

    assert_eq!(rendered(&sink), "John Talbot");

    tree.write("surname", "the Third").unwrap();
    assert_eq!(rendered(&sink), "John the Third");
    assert_eq!(sink.deliveries(), 2);
    assert_eq!(sink.last().unwrap().len(), 1, "only surname is patched");
}

#[test]
fn snapshot_matches_selected_cursor_values() {
    let tree = MemoryTree::new(json!({"user": {"name": "Ada", "tags": ["a", "b"]}}));
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new().cursors(
        CursorMap::new()
            .bind("name", ["user", "name"])
            .bind("user", ["user"])
            .bind("missing", ["nothing"]),
    );
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();

    for (key, cursor) in branch.cursors() {
        assert_eq!(sink.state().get(&key).cloned(), cursor.get(), "key {key}");
    }
    assert!(sink.state().get("missing").is_none());
}

#[test]
fn dynamic_cursors_follow_props() {
    init_tracing();
    let tree = MemoryTree::new(json!({"name": "John", "alias": "Jack", "surname": "Talbot"}));
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new().cursors_fn(|props| {
        Ok(CursorMap::new()
            .bind("name", props.path("path")?)
            .bind("surname", ["surname"]))
    });
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch
        .mount(
            &root.scope(),
            &Props::new().with("path", json!(["name"])),
            sink.handle(),
        )
        .unwrap();
    assert_eq!(rendered(&sink), "John Talbot");
    let surname = branch.cursor("surname").unwrap();

    let summary = branch
        .update(&Props::new().with("path", json!(["alias"])))
        .unwrap();
    assert_eq!(summary.replaced, vec!["name".to_owned()]);
    assert_eq!(summary.kept, 1);
    assert_eq!(rendered(&sink), "Jack Talbot");
    assert_eq!(branch.cursor("surname").unwrap(), surname);

    tree.write("name", "Johnny").unwrap();
    assert_eq!(rendered(&sink), "Jack Talbot");
    tree.write("alias", "Jacky").unwrap();
    assert_eq!(rendered(&sink), "Jacky Talbot");
}

#[test]
fn direct_cursors_can_be_passed_as_props() {
    let tree = talbot();
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new().cursors_fn(|props| {
        let mut map = CursorMap::new();
        if let Some(cursor) = props.cursor("cursor") {
            map = map.bind("name", cursor.clone());
        }
        Ok(map)
    });
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch
        .mount(
            &root.scope(),
            &Props::new().with("cursor", tree.select("name").unwrap()),
            sink.handle(),
        )
        .unwrap();
    assert_eq!(sink.state().str("name"), Some("John"));

    tree.write("name", "Jane").unwrap();
    assert_eq!(sink.state().str("name"), Some("Jane"));
}

#[test]
fn cursor_from_another_tree_follows_that_tree() {
    let tree = talbot();
    let other = MemoryTree::new(json!({"name": "Mary"}));
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new().cursors_fn(|props| {
        let mut map = CursorMap::new().bind("surname", ["surname"]);
        if let Some(cursor) = props.cursor("cursor") {
            map = map.bind("name", cursor.clone());
        }
        Ok(map)
    });
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch
        .mount(
            &root.scope(),
            &Props::new().with("cursor", other.select("name").unwrap()),
            sink.handle(),
        )
        .unwrap();
    assert_eq!(rendered(&sink), "Mary Talbot");
    assert!(branch.cursor("name").unwrap().same_tree(&other.handle()));

    other.write("name", "Jane").unwrap();
    assert_eq!(rendered(&sink), "Jane Talbot");
    assert_eq!(branch.state().str("name"), Some("Jane"));

    tree.write("name", "Jack").unwrap();
    assert_eq!(sink.deliveries(), 2, "the ambient tree's name is not bound");
    tree.write("surname", "Smith").unwrap();
    assert_eq!(rendered(&sink), "Jane Smith");

    branch.unmount();
    assert_eq!(other.listener_count(), 0);
    assert_eq!(tree.listener_count(), 0);
}

#[test]
fn ready_made_cursor_survives_tree_swap() {
    let first = talbot();
    let second = MemoryTree::new(json!({"name": "Jane", "surname": "Doe"}));
    let mut root = Root::with_tree(first.handle());
    let pinned = first.select("surname").unwrap();
    let spec = BindingSpec::new().cursors(
        CursorMap::new()
            .bind("name", ["name"])
            .bind("surname", pinned.clone()),
    );
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();
    assert_eq!(first.listener_count(), 1);

    root.update(&Props::new().with(TREE_PROP, second.handle())).unwrap();
    let summary = branch.update(&Props::new()).unwrap();
    assert!(summary.removed.is_empty());
    assert_eq!(rendered(&sink), "Jane Talbot");
    assert_eq!(first.listener_count(), 1);
    assert_eq!(second.listener_count(), 1);

    first.write("surname", "the Third").unwrap();
    assert_eq!(rendered(&sink), "Jane the Third");
    assert_eq!(branch.state().get("surname"), pinned.get().as_ref());
    first.write("name", "Jack").unwrap();
    second.write("name", "Joan").unwrap();
    assert_eq!(rendered(&sink), "Joan the Third");
    assert_eq!(branch.cursor("surname"), Some(pinned));

    branch.unmount();
    assert_eq!(first.listener_count(), 0);
    assert_eq!(second.listener_count(), 0);
}

#[test]
fn facets_bind_derived_values() {
    let tree = talbot().with_facet(
        FacetDescriptor::new("fullName")
            .cursor("name", ["name"])
            .cursor("surname", ["surname"])
            .get(|data| {
                let part = |k: &str| {
                    data.get(k)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned()
                };
                json!(format!("{} {}", part("name"), part("surname")))
            }),
    );
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new().facets(FacetMap::new().bind("full", "fullName"));
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();
    assert_eq!(sink.state().str("full"), Some("John Talbot"));

    tree.write("surname", "the Third").unwrap();
    assert_eq!(sink.state().str("full"), Some("John the Third"));
    assert!(branch.cursors().is_empty());
}

#[test]
fn dynamic_facets_follow_props() {
    let part = |data: &serde_json::Map<String, Value>, k: &str| {
        data.get(k)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let tree = talbot()
        .with_facet(
            FacetDescriptor::new("fullName")
                .cursor("name", ["name"])
                .cursor("surname", ["surname"])
                .get(move |data| json!(format!("{} {}", part(data, "name"), part(data, "surname")))),
        )
        .with_facet(
            FacetDescriptor::new("shout")
                .cursor("name", ["name"])
                .get(move |data| json!(part(data, "name").to_uppercase())),
        );
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new()
        .cursors(CursorMap::new().bind("surname", ["surname"]))
        .facets_fn(|props| {
            let name = props
                .value("facet")
                .and_then(Value::as_str)
                .unwrap_or("fullName");
            Ok(FacetMap::new().bind("label", name))
        });
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();
    assert_eq!(sink.state().str("label"), Some("John Talbot"));

    let summary = branch
        .update(&Props::new().with("facet", json!("shout")))
        .unwrap();
    assert_eq!(summary.replaced, vec!["label".to_string()]);
    assert_eq!(summary.kept, 1);
    assert_eq!(sink.state().str("label"), Some("JOHN"));
    assert_eq!(sink.state().str("surname"), Some("Talbot"));
    let last = sink.last().unwrap();
    assert_eq!(last.keys().collect::<Vec<_>>(), vec!["label"]);

    tree.write("name", "Jane").unwrap();
    assert_eq!(sink.state().str("label"), Some("JANE"));
    let before = sink.deliveries();
    tree.write("surname", "Doe").unwrap();
    assert_eq!(sink.deliveries(), before + 1);
    assert_eq!(sink.last().unwrap().keys().collect::<Vec<_>>(), vec!["surname"]);

    let unchanged = branch
        .update(&Props::new().with("facet", json!("shout")))
        .unwrap();
    assert!(unchanged.is_noop());
}

#[test]
fn facet_with_identity_projection() {
    let tree = MemoryTree::new(json!({"user": {"name": "Ada"}})).with_facet(
        FacetDescriptor::new("user")
            .cursor("user", ["user"])
            .get(|data| data.get("user").cloned().unwrap_or(Value::Null)),
    );
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new().facets(FacetMap::new().bind("user", "user"));
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();

    assert_eq!(sink.state().get("user"), tree.read("user").as_ref());
    tree.write(["user", "name"], "Grace").unwrap();
    assert_eq!(sink.state().get("user"), Some(&json!({"name": "Grace"})));
}

#[test]
fn facets_without_cursors_are_constant() {
    let tree = talbot().with_facet(FacetDescriptor::new("greeting").get(|_| json!("hello")));
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new().facets(FacetMap::new().bind("greeting", "greeting"));
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();

    tree.write("name", "Jane").unwrap();
    assert_eq!(sink.state().str("greeting"), Some("hello"));
    assert_eq!(sink.deliveries(), 1);
}

#[test]
fn cursor_takes_precedence_over_facet() {
    let tree = talbot().with_facet(FacetDescriptor::new("name").get(|_| json!("Facet")));
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new()
        .cursors(CursorMap::new().bind("name", ["name"]))
        .facets(FacetMap::new().bind("name", "name"));
    let sink = RecordingSink::new();
    let mut branch = Branch::new(spec);
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();
    assert_eq!(sink.state().str("name"), Some("John"));
}

#[test]
fn cursors_and_tree_are_reachable_from_the_branch() {
    let tree = talbot();
    let root = Root::with_tree(tree.handle());
    let sink = RecordingSink::new();
    let mut branch = Branch::new(name_spec());
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();

    let bound = branch.tree().unwrap();
    assert!(Rc::ptr_eq(&bound, &tree.handle()));
    assert_eq!(bound.get(&"name".into()), Some(json!("John")));

    branch.cursors()["surname"].set("Smith").unwrap();
    assert_eq!(rendered(&sink), "John Smith");
}

#[test]
fn deeply_nested_branch_resolves_context() {
    let tree = talbot();
    let root = Root::with_tree(tree.handle());
    let mut scope = root.scope();
    for _ in 0..5 {
        scope = scope.child();
    }
    let sink = RecordingSink::new();
    let mut branch = Branch::new(name_spec());
    branch.mount(&scope, &Props::new(), sink.handle()).unwrap();
    assert_eq!(rendered(&sink), "John Talbot");
}

#[test]
fn branch_without_root_fails() {
    init_tracing();
    let mut branch = Branch::new(name_spec());
    let err = branch
        .mount(&ContextScope::detached(), &Props::new(), RecordingSink::new().handle())
        .unwrap_err();
    assert!(matches!(err, BindError::MissingTreeContext));
    assert_eq!(branch.phase(), Phase::Deactivated);
}

#[test]
fn root_rejects_non_tree_values() {
    let err = Root::mount(&Props::new().with(TREE_PROP, json!({"hello": "world"}))).unwrap_err();
    assert!(matches!(err, BindError::InvalidTreeHandle { .. }));
}

#[test]
fn unselectable_path_fails_mount() {
    let tree = talbot();
    let root = Root::with_tree(tree.handle());
    let spec = BindingSpec::new().cursors(CursorMap::new().bind("first", ["name", "first"]));
    let mut branch = Branch::new(spec);
    let err = branch
        .mount(&root.scope(), &Props::new(), RecordingSink::new().handle())
        .unwrap_err();
    assert!(err.is_resolution());
    assert_eq!(tree.listener_count(), 0);
}

#[test]
fn no_delivery_after_unmount_sync() {
    let tree = talbot();
    let root = Root::with_tree(tree.handle());
    let sink = RecordingSink::new();
    let mut branch = Branch::new(name_spec());
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();

    branch.unmount();
    tree.write("surname", "the Third").unwrap();
    assert_eq!(sink.deliveries(), 1);
    assert_eq!(rendered(&sink), "John Talbot");
}

#[test]
fn no_delivery_after_unmount_async() {
    init_tracing();
    let tree = MemoryTree::with_options(
        json!({"name": "John", "surname": "Talbot"}),
        TreeOptions::asynchronous(),
    );
    let root = Root::with_tree(tree.handle());
    let sink = RecordingSink::new();
    let mut branch = Branch::new(name_spec());
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();

    tree.write("surname", "the Third").unwrap();
    assert!(tree.has_pending());
    branch.unmount();
    assert!(tree.flush());
    assert_eq!(sink.deliveries(), 1);
}

#[test]
fn async_tree_delivers_once_per_flush() {
    let tree = MemoryTree::with_options(
        json!({"name": "John", "surname": "Talbot"}),
        TreeOptions::asynchronous(),
    );
    let root = Root::with_tree(tree.handle());
    let sink = RecordingSink::new();
    let mut branch = Branch::new(name_spec());
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();

    tree.write("name", "Jane").unwrap();
    tree.write("surname", "Doe").unwrap();
    assert_eq!(sink.deliveries(), 1);
    tree.flush();
    assert_eq!(sink.deliveries(), 2);
    assert_eq!(rendered(&sink), "Jane Doe");
}

#[test]
fn unchanged_values_can_be_suppressed() {
    let tree = talbot();
    let root = Root::with_tree(tree.handle());
    let sink = RecordingSink::new();
    let mut branch = Branch::with_config(
        name_spec(),
        BindConfig::new().with_deliver_unchanged(false),
    );
    branch.mount(&root.scope(), &Props::new(), sink.handle()).unwrap();

    tree.write("name", "John").unwrap();
    assert_eq!(sink.deliveries(), 1);
    tree.write("name", "Jane").unwrap();
    assert_eq!(sink.deliveries(), 2);
}

#[test]
fn sibling_branches_are_independent() {
    let tree = talbot();
    let root = Root::with_tree(tree.handle());
    let first = RecordingSink::new();
    let second = RecordingSink::new();
    let mut a = Branch::new(BindingSpec::new().cursors(CursorMap::new().bind("name", ["name"])));
    let mut b = Branch::new(
        BindingSpec::new().cursors(CursorMap::new().bind("surname", ["surname"])),
    );
    a.mount(&root.scope().child(), &Props::new(), first.handle()).unwrap();
    b.mount(&root.scope().child(), &Props::new(), second.handle()).unwrap();
    assert_eq!(tree.listener_count(), 2);

    tree.write("surname", "Doe").unwrap();
    assert_eq!(first.deliveries(), 1);
    assert_eq!(second.deliveries(), 2);

    a.unmount();
    assert_eq!(tree.listener_count(), 1);
}
