use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wtemplate::{
    config::{find_config, get_config, get_variables_from, load_config_file, EngineConfig},
    error::Error,
    Engine,
};

#[test]
fn test_get_config_finds_file_next_to_template() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("page.html"), "{$title}").unwrap();
    fs::write(
        temp_dir.path().join("wtemplate.yml"),
        "max_depth: 3\nstrict_filters: true\n",
    )
    .unwrap();

    let config = get_config(temp_dir.path()).unwrap();
    assert_eq!(config.max_depth, 3);
    assert!(config.strict_filters);
    assert_eq!(config.base_dir, None);
}

#[test]
fn test_get_config_defaults_without_file() {
    let temp_dir = TempDir::new().unwrap();
    assert_eq!(find_config(temp_dir.path()), None);
    assert_eq!(get_config(temp_dir.path()).unwrap(), EngineConfig::default());
}

#[test]
fn test_json_config_takes_precedence() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("wtemplate.json"), r#"{"max_depth": 5}"#).unwrap();
    fs::write(temp_dir.path().join("wtemplate.yaml"), "max_depth: 9\n").unwrap();

    assert_eq!(find_config(temp_dir.path()), Some(temp_dir.path().join("wtemplate.json")));
    assert_eq!(get_config(temp_dir.path()).unwrap().max_depth, 5);
}

#[test]
fn test_invalid_config_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("wtemplate.yml"), "depth: [\n").unwrap();
    assert!(matches!(get_config(temp_dir.path()), Err(Error::ConfigError(_))));

    let missing = temp_dir.path().join("missing.json");
    assert!(matches!(load_config_file(missing), Err(Error::IoError(_))));
}

#[test]
fn test_variables_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let vars_path = temp_dir.path().join("vars.yml");
    fs::write(&vars_path, "title: Home\nitems:\n  - a\n  - b\n").unwrap();

    let vars = get_variables_from(Some(vars_path.as_path()), false).unwrap();
    assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["title", "items"]);

    assert!(get_variables_from(None, false).unwrap().is_empty());
    assert!(matches!(
        get_variables_from(Some(PathBuf::from("/nonexistent/vars.yml").as_path()), false),
        Err(Error::IoError(_))
    ));
}

#[test]
fn test_config_and_variables_drive_rendering() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("wtemplate.yml"), "strict_filters: true\n").unwrap();
    let vars_path = temp_dir.path().join("vars.json");
    fs::write(&vars_path, r#"{"title": "home", "items": ["a", "b"]}"#).unwrap();

    let mut engine = Engine::with_config(get_config(temp_dir.path()).unwrap());
    engine.assign_all(get_variables_from(Some(vars_path.as_path()), false).unwrap(), false);

    let template = engine
        .compile("{$title|upper}:{for $i in $items}{$i}{/for}", Some(temp_dir.path()))
        .unwrap();
    assert_eq!(engine.render(&template).unwrap(), "HOME:ab");

    let template = engine.compile("{$title|shout}", None).unwrap();
    assert!(matches!(engine.render(&template), Err(Error::ExecutionError(_))));
}
