use docpipe::scope::{ScopedContext, DATA_SCOPE, ROOT_SCOPE, VARS_SCOPE};
use serde_json::json;

#[test]
fn test_root_scope_is_visible_without_prefix() {
    let mut ctx = ScopedContext::new();
    ctx.merge(&json!({"title": "Guide"}), ROOT_SCOPE);
    let snapshot = ctx.snapshot();
    assert_eq!(snapshot["title"], json!("Guide"));
}

#[test]
fn test_named_scope_merge_associativity_for_nonconflicting_keys() {
    // merging {A then B} equals merging the deep-merge of A and B
    let a = json!({"site": {"title": "Docs"}});
    let b = json!({"site": {"lang": "en"}, "debug": true});

    let mut sequential = ScopedContext::new();
    sequential.merge(&a, VARS_SCOPE);
    sequential.merge(&b, VARS_SCOPE);

    let mut combined = ScopedContext::new();
    let mut merged = a.clone();
    docpipe::scope::deep_merge(&mut merged, &b);
    combined.merge(&merged, VARS_SCOPE);

    assert_eq!(sequential.snapshot(), combined.snapshot());
}

#[test]
fn test_conflicting_keys_right_wins() {
    let mut ctx = ScopedContext::new();
    ctx.merge(&json!({"x": 1, "nested": {"a": 1}}), VARS_SCOPE);
    ctx.merge(&json!({"x": 2, "nested": {"a": 2, "b": 3}}), VARS_SCOPE);
    assert_eq!(ctx.lookup("vars.x"), Some(&json!(2)));
    assert_eq!(ctx.lookup("vars.nested"), Some(&json!({"a": 2, "b": 3})));
}

#[test]
fn test_second_data_load_appends_to_list_scope() {
    let mut ctx = ScopedContext::new();
    ctx.merge(&json!([{"row": 1}]), DATA_SCOPE);
    ctx.merge(&json!([{"row": 2}]), DATA_SCOPE);
    assert_eq!(ctx.lookup("data"), Some(&json!([{"row": 1}, {"row": 2}])));
}

#[test]
fn test_root_merge_keeps_reserved_scopes_intact() {
    let mut ctx = ScopedContext::new();
    ctx.merge(&json!({"siteTitle": "Docs"}), VARS_SCOPE);

    // a payload may carry keys named after the reserved scopes
    ctx.merge(&json!({"vars": {"x": 1}, "data": "raw", "title": "Guide"}), ROOT_SCOPE);

    assert_eq!(ctx.lookup("vars.siteTitle"), Some(&json!("Docs")));
    assert_eq!(ctx.lookup("vars.x"), None);
    assert_eq!(ctx.lookup("title"), Some(&json!("Guide")));
    assert_eq!(ctx.lookup("data"), None);
}

#[test]
fn test_remove_is_idempotent() {
    let mut ctx = ScopedContext::new();
    ctx.merge(&json!({"a": 1}), VARS_SCOPE);
    ctx.merge(&json!({"b": 2}), "extra");

    ctx.remove("extra");
    let after_once = ctx.snapshot();
    ctx.remove("extra");
    assert_eq!(ctx.snapshot(), after_once);

    // removing a scope that never existed is a no-op, not an error
    ctx.remove("never-there");
    assert_eq!(ctx.snapshot(), after_once);
}

#[test]
fn test_dotted_lookup_tracks_last_state() {
    let mut ctx = ScopedContext::new();
    ctx.merge(&json!({"siteTitle": "One"}), VARS_SCOPE);
    ctx.merge(&json!({"siteTitle": "Two"}), VARS_SCOPE);
    assert_eq!(ctx.lookup("vars.siteTitle"), Some(&json!("Two")));
    ctx.remove(VARS_SCOPE);
    assert_eq!(ctx.lookup("vars.siteTitle"), None);
}
