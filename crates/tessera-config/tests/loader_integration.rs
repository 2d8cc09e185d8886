//! Integration tests for loading, resolving, and writing back configuration files.

use std::fs;
use std::path::Path;

use proptest::prelude::*;
use serde_json::{json, Value as Json};
use tessera_config::{
    CommandOverride, ConfigError, ConfigLoader, Field, Primitive, Schema, Shape, Value,
};

fn loader(dir: &Path) -> ConfigLoader {
    ConfigLoader::new()
        .with_base_dir(dir)
        .with_args(Vec::<String>::new())
}

fn read_json(path: &Path) -> Json {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn database_section() -> Schema {
    Schema::new("Database")
        .with_field(Field::new("host", Shape::string()))
        .with_field(Field::new(
            "port",
            CommandOverride::new("port")
                .with_prefix("--")
                .with_kind(Primitive::Integer),
        ))
}

#[test]
fn test_extension_auto_detection() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.json"), r#"{"name": "svc"}"#).unwrap();

    let config = loader(dir.path()).load("config").unwrap();
    assert_eq!(config.get_str("name").as_deref(), Some("svc"));
}

#[test]
fn test_missing_file_names_requested_path() {
    let dir = tempfile::tempdir().unwrap();
    let err = loader(dir.path()).load("absent").unwrap_err();
    match err {
        ConfigError::FileNotFound { path } => assert!(path.ends_with("absent")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_default_fill() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("app.json"), "{}").unwrap();

    let schema = Schema::new("App").with_field(Field::new("x", Shape::integer()).with_default(5));
    let config = loader(dir.path()).with_schema(schema).load("app").unwrap();

    assert_eq!(config.get("x"), Some(Value::Int(5)));
}

#[test]
fn test_override_precedence() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("db.json"),
        r#"{"host": "db.internal", "port": 3306}"#,
    )
    .unwrap();

    let from_file = loader(dir.path())
        .with_schema(database_section())
        .load("db")
        .unwrap();
    assert_eq!(from_file.get_i64("port"), Some(3306));

    let from_args = loader(dir.path())
        .with_schema(database_section())
        .with_args(["--port", "9999"])
        .load("db")
        .unwrap();
    assert_eq!(from_args.get_i64("port"), Some(9999));
}

#[test]
fn test_override_missing_argument_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("db.json"), r#"{"host": "h", "port": 1}"#).unwrap();

    let err = loader(dir.path())
        .with_schema(database_section())
        .with_args(["--port"])
        .load("db")
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingArgument { .. }));
}

#[test]
fn test_integer_product_expression() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("app.json"), r#"{"timeout": "3600 * 8"}"#).unwrap();

    let schema = Schema::new("App").with_field(Field::new("timeout", Shape::integer()));
    let config = loader(dir.path()).with_schema(schema).load("app").unwrap();

    assert_eq!(config.get_i64("timeout"), Some(28800));
}

#[test]
fn test_nested_error_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("app.json"), r#"{"inner": {}}"#).unwrap();

    let inner = Schema::new("Inner").with_field(Field::new("name", Shape::string()));
    let outer = Schema::new("Outer").with_field(Field::new("inner", Shape::nested(inner)));

    let err = loader(dir.path()).with_schema(outer).load("app").unwrap_err();
    let schema_err = err.as_schema().expect("schema error");

    assert_eq!(schema_err.path(), "Outer/Inner");
    assert_eq!(schema_err.field(), "name");
    assert_eq!(schema_err.dotted_field(), "inner.name");
    assert_eq!(schema_err.reason(), "missing config");
}

#[test]
fn test_unknown_keys_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("app.json"),
        r#"{"name": "svc", "extra": {"note": [1, 2]}}"#,
    )
    .unwrap();

    let schema = Schema::new("App").with_field(Field::new("name", Shape::string()));
    let config = loader(dir.path()).with_schema(schema).load("app").unwrap();

    assert_eq!(config.dump(), json!({"name": "svc", "extra": {"note": [1, 2]}}));
}

#[test]
fn test_sync_rewrites_on_nested_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{"section": {"field": 1}, "items": [1]}"#).unwrap();

    let config = loader(dir.path()).with_sync(true).load("app").unwrap();

    config.get_map("section").unwrap().insert("field", 2).unwrap();
    assert_eq!(read_json(&path), json!({"section": {"field": 2}, "items": [1]}));

    config.get_list("items").unwrap().push(3).unwrap();
    assert_eq!(read_json(&path), json!({"section": {"field": 2}, "items": [1, 3]}));
}

#[test]
fn test_sync_follows_reinserted_and_moved_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{"section": {"field": 1}}"#).unwrap();

    let config = loader(dir.path()).with_sync(true).load("app").unwrap();
    let section = config.get("section").unwrap();

    config.insert("section", section.clone()).unwrap();
    section.as_map().unwrap().insert("field", 2).unwrap();
    assert_eq!(read_json(&path), json!({"section": {"field": 2}}));

    config.insert("moved", section.clone()).unwrap();
    config.remove("section").unwrap();
    section.as_map().unwrap().insert("field", 3).unwrap();
    assert_eq!(read_json(&path), json!({"moved": {"field": 3}}));
}

#[test]
fn test_sync_keeps_large_integers_and_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{"id": 18446744073709551615, "x": 1}"#).unwrap();

    let schema = Schema::new("App").with_field(Field::new("x", Shape::integer()));
    let config = loader(dir.path())
        .with_schema(schema)
        .with_sync(true)
        .load("app")
        .unwrap();
    config.insert("x", 2).unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("18446744073709551615"), "{written}");
    assert!(written.find("\"id\"") < written.find("\"x\""), "{written}");
}

#[test]
fn test_detached_child_no_longer_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{"section": {"field": 1}}"#).unwrap();

    let config = loader(dir.path()).with_sync(true).load("app").unwrap();
    let section = config.remove("section").unwrap().unwrap();
    assert_eq!(read_json(&path), json!({}));

    section.as_map().unwrap().insert("field", 2).unwrap();
    assert_eq!(read_json(&path), json!({}));
}

#[cfg(feature = "yaml")]
#[test]
fn test_yaml_file_with_schema_and_sync() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("service.yaml");
    fs::write(&path, "name: billing\nworkers: \"2 * 4\"\n").unwrap();

    let schema = Schema::new("Service")
        .with_field(Field::new("name", Shape::string()))
        .with_field(Field::new("workers", Shape::integer()));
    let config = loader(dir.path())
        .with_schema(schema)
        .with_sync(true)
        .load("service")
        .unwrap();
    assert_eq!(config.get_i64("workers"), Some(8));

    config.insert("name", "ledger").unwrap();
    let written: Json = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, json!({"name": "ledger", "workers": 8}));
}

fn tree() -> impl Strategy<Value = Json> {
    let leaf = prop_oneof![
        Just(Json::Null),
        any::<bool>().prop_map(Json::from),
        any::<i64>().prop_map(Json::from),
        "s_[a-z0-9]{0,8}".prop_map(Json::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Json::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|entries| Json::Object(entries.into_iter().collect())),
        ]
    })
}

fn document() -> impl Strategy<Value = Json> {
    prop::collection::btree_map("[a-z]{1,6}", tree(), 0..5)
        .prop_map(|entries| Json::Object(entries.into_iter().collect()))
}

fn assert_round_trip(file: &str, doc: &Json) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file);
    fs::write(&path, "").unwrap();

    let first = loader(dir.path()).with_sync(true).load(file).unwrap();
    first.update(doc.as_object().unwrap().clone()).unwrap();
    let written = fs::read_to_string(&path).unwrap();

    let second = loader(dir.path()).load(file).unwrap();
    assert_eq!(second.dump(), *doc);
    assert_eq!(second.dump(), first.dump());

    tessera_config::sync(&second, &path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), written);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_json_round_trip(doc in document()) {
        assert_round_trip("doc.json", &doc);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn prop_yaml_round_trip(doc in document()) {
        assert_round_trip("doc.yaml", &doc);
    }
}
