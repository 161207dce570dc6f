use serde_json::json;
use wtemplate::{ContextStack, Engine};

#[test]
fn test_local_write_does_not_survive_pop() {
    let mut context = ContextStack::new();
    context.push_context();
    context.assign("x", json!(1), false);
    context.pop_context();
    assert_eq!(context.get_var("x"), json!(""));
}

#[test]
fn test_global_survives_push_and_pop() {
    let mut context = ContextStack::new();
    context.assign("g", json!(1), true);
    for _ in 0..3 {
        context.push_context();
        assert_eq!(context.get_var("g"), json!(1));
    }
    for _ in 0..3 {
        context.pop_context();
        assert_eq!(context.get_var("g"), json!(1));
    }
    assert!(context.is_global("g"));
}

#[test]
fn test_global_write_reaches_existing_layers() {
    let mut context = ContextStack::new();
    context.push_context();
    context.push_context();
    context.assign("g", json!("late"), true);
    context.pop_context();
    assert_eq!(context.get_var("g"), json!("late"));
}

#[test]
fn test_clear() {
    let mut context = ContextStack::new();
    context.assign_all([("a".to_string(), json!(1)), ("b".to_string(), json!(2))], false);
    context.clear_all(["a", "missing"]);
    assert_eq!(context.get_var("a"), json!(""));
    assert_eq!(context.get_var("b"), json!(2));
    assert_eq!(context.active().len(), 1);
}

#[test]
fn test_templates_see_only_the_active_layer() {
    let mut engine = Engine::new();
    engine.assign("site", "docs", true);
    engine.assign("page", "intro", false);
    engine.push_context();
    assert_eq!(engine.render_string("{$site}/{$page}").unwrap(), "docs/");
    engine.pop_context();
    assert_eq!(engine.render_string("{$site}/{$page}").unwrap(), "docs/intro");
}

#[test]
fn test_set_updates_globals_everywhere() {
    let mut engine = Engine::new();
    engine.assign("count", 1, true);
    engine.push_context();
    engine.render_string("{set $count = $count + 1}").unwrap();
    engine.pop_context();
    assert_eq!(engine.get_var("count"), json!(2));
}

#[test]
fn test_append() {
    let mut engine = Engine::new();
    engine.append("items", "a");
    engine.append("items", "b");
    assert_eq!(engine.render_string("{for $i in $items}{$i}{/for}").unwrap(), "ab");
}
