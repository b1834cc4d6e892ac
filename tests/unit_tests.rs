use mongo_extract::command::{ExportCommandFactory, ExportParams};
use mongo_extract::config::{DbConfig, ExportMode, ExportOptions, Protocol};
use mongo_extract::retry::RetryConfig;
use serde_json::json;

#[test]
fn test_export_options_creation() {
    let options = ExportOptions::from_value(&json!({
        "name": "bronx-bakeries",
        "collection": "restaurants",
        "query": r#"{borough: "Bronx"}"#,
        "mapping": {"_id": null},
        "incremental": true,
    }))
    .unwrap();

    assert_eq!(options.name, "bronx-bakeries");
    assert_eq!(options.collection, "restaurants");
    assert_eq!(options.mode, ExportMode::Mapping);
    assert!(options.incremental);
    assert!(options.enabled);
    assert_eq!(options.limit, None);
}

#[test]
fn test_db_config_defaults() {
    let mut db: DbConfig = serde_json::from_value(json!({
        "host": "localhost",
        "port": "27017",
        "database": "test",
    }))
    .unwrap();
    db.validate().unwrap();

    assert_eq!(db.protocol, Protocol::MongoDb);
    assert_eq!(db.host.as_deref(), Some("localhost"));
    assert_eq!(db.port.as_deref(), Some("27017"));
    assert!(!db.tls_enabled());
    assert!(!db.ssh_enabled());
}

#[test]
fn test_export_params_from_options() {
    let options = ExportOptions::from_value(&json!({
        "name": "orders", "collection": "orders", "mode": "raw",
        "sort": r#"{"x": 1}"#, "limit": 100, "skip": 10,
    }))
    .unwrap();
    let params = ExportParams::from(&options);

    assert_eq!(params.collection, "orders");
    assert_eq!(params.sort.as_deref(), Some(r#"{"x": 1}"#));
    assert_eq!(params.limit, Some(100));
    assert_eq!(params.skip, Some(10));
}

#[test]
fn test_retry_config_defaults() {
    let config = RetryConfig::default();
    assert_eq!(config.max_attempts, 5);
    assert!(config.backoff_multiplier > 1.0);
}

#[test]
fn test_command_factory_is_deterministic() {
    let mut db: DbConfig = serde_json::from_value(json!({
        "host": "localhost", "port": 27017, "database": "test",
    }))
    .unwrap();
    db.validate().unwrap();
    let options = ExportOptions::from_value(&json!({
        "name": "orders", "collection": "orders", "mode": "raw",
    }))
    .unwrap();

    let factory = ExportCommandFactory::new(false);
    let first = factory.create(&db, &ExportParams::from(&options)).unwrap();
    let second = factory.create(&db, &ExportParams::from(&options)).unwrap();
    assert_eq!(first, second);
}
