//! Load/save round-trip tests against files on disk.

use std::fs;
use std::path::PathBuf;

use mcp_config::config::{ConfigSource, Document, DocumentFormat};
use mcp_config::ConfigManager;
use serde_json::json;

mod common;

fn expected_server1() -> serde_json::Value {
    json!({
        "command": "node",
        "args": ["server.js"],
        "disabled": false,
        "env": { "PORT": "3000" },
        "dev": {
            "enabled": true,
            "watch": ["src/**/*.js"],
            "cwd": "/path/to/project"
        }
    })
}

#[test]
fn test_load_commented_file() {
    let manager = ConfigManager::new(common::commented_fixture()).unwrap();
    let config = manager.load().unwrap();

    let mut server1 = expected_server1();
    server1["type"] = json!("stdio");
    assert_eq!(config.document().value(), &json!({ "mcpServers": { "server1": server1 } }));
    assert!(config.document().has_formatting());

    let server = manager.get_server_config("server1").unwrap();
    assert_eq!(server.server_type(), "stdio");
    assert!(!server.is_disabled());
    let dev = server.dev().unwrap();
    assert!(dev.enabled);
    assert_eq!(dev.cwd, PathBuf::from("/path/to/project"));
    assert_eq!(dev.watch, vec!["src/**/*.js".to_string()]);
    assert!(manager.get_server_config("missing").is_none());
}

#[test]
fn test_load_commented_json_file() {
    let manager = ConfigManager::new(common::commented_json_fixture()).unwrap();
    let config = manager.load().unwrap();

    let mut server1 = expected_server1();
    server1["type"] = json!("stdio");
    assert_eq!(config.document().value(), &json!({ "mcpServers": { "server1": server1 } }));

    let toml = ConfigManager::new(common::commented_fixture()).unwrap().load().unwrap();
    assert_eq!(config.document(), toml.document());
    assert_eq!(config.servers(), toml.servers());
}

#[test]
fn test_save_loaded_config_keeps_comments() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("temp-config-save.toml");

    let manager = ConfigManager::new(common::commented_fixture()).unwrap();
    let loaded = manager.load().unwrap();
    manager.save_config(loaded.document(), Some(&target)).unwrap();

    let saved = fs::read_to_string(&target).unwrap();
    let reparsed = Document::parse(&saved, DocumentFormat::Toml).unwrap();
    assert_eq!(&reparsed, loaded.document());
    assert_eq!(saved, loaded.document().stringify(DocumentFormat::Toml).unwrap());

    assert!(saved.contains("# MCP servers launched by the supervisor."));
    assert!(saved.contains("# Passed to the child process as-is"));
    assert!(saved.contains("# restart on source edits"));
    assert!(saved.contains("type = \"stdio\""));
}

#[test]
fn test_save_plain_config_to_bound_path() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("temp-config-save.toml");

    let mut server1 = expected_server1();
    server1["type"] = json!("stdio");
    let plain = Document::new(json!({ "mcpServers": { "server1": server1 } }));

    let manager = ConfigManager::new(target.as_path()).unwrap();
    assert_eq!(manager.save_config(&plain, None).unwrap(), target);

    let saved = fs::read_to_string(&target).unwrap();
    assert!(!saved.contains('#'));
    assert_eq!(saved, plain.stringify(DocumentFormat::Toml).unwrap());
    assert_eq!(Document::parse(&saved, DocumentFormat::Toml).unwrap(), plain);

    // And it loads back as a valid configuration.
    let config = manager.load().unwrap();
    assert_eq!(config.document(), &plain);
}

#[test]
fn test_edited_config_keeps_surrounding_comments() {
    let dir = tempfile::tempdir().unwrap();
    let target = common::write_config(
        dir.path(),
        "mcp.toml",
        &fs::read_to_string(common::commented_fixture()).unwrap(),
    );

    let manager = ConfigManager::new(target.as_path()).unwrap();
    let loaded = manager.load().unwrap();

    let mut value = loaded.document().value().clone();
    value["mcpServers"]["server1"]["args"] = json!(["server.js", "--verbose"]);
    value["mcpServers"]["server1"]["env"]["PORT"] = json!("4000");
    manager.save_config(&loaded.document().with_value(value), None).unwrap();

    let saved = fs::read_to_string(&target).unwrap();
    assert!(saved.contains("# Passed to the child process as-is"));
    assert!(saved.contains("# runtime on PATH"));

    let reloaded = manager.load().unwrap();
    let server = reloaded.server("server1").unwrap().as_stdio().unwrap().clone();
    assert_eq!(server.args, vec!["server.js".to_string(), "--verbose".to_string()]);
    assert_eq!(server.env["PORT"], "4000");
}

#[test]
fn test_stripped_config_saves_clean() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("clean.toml");

    let manager = ConfigManager::new(common::commented_fixture()).unwrap();
    let loaded = manager.load().unwrap();
    let plain = loaded.document().clone().without_formatting();
    manager.save_config(&plain, Some(&target)).unwrap();

    let saved = fs::read_to_string(&target).unwrap();
    assert!(!saved.contains('#'));
    assert_eq!(&Document::parse(&saved, DocumentFormat::Toml).unwrap(), loaded.document());
}

#[test]
fn test_json_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_config(
        dir.path(),
        "mcp.json",
        r#"{ "mcpServers": { "test": { "command": "node", "args": ["server.js"], "env": { "PORT": "3000" } } } }"#,
    );

    let manager = ConfigManager::new(path.as_path()).unwrap();
    let config = manager.load().unwrap();
    assert_eq!(
        config.document().value(),
        &json!({
            "mcpServers": {
                "test": { "command": "node", "args": ["server.js"], "env": { "PORT": "3000" }, "type": "stdio" }
            }
        })
    );

    manager.save_config(config.document(), None).unwrap();
    let saved = fs::read_to_string(&path).unwrap();
    assert_eq!(saved, serde_json::to_string_pretty(config.document().value()).unwrap());
}

#[test]
fn test_invalid_save_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("temp-config-save.toml");
    let manager = ConfigManager::new(target.as_path()).unwrap();

    for value in [json!(null), json!("not-an-object")] {
        let err = manager.save_config(&Document::new(value), Some(&target)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration object provided.");
    }

    let unbound = ConfigManager::new(ConfigSource::Unbound).unwrap();
    let err = unbound
        .save_config(&Document::new(json!({ "mcpServers": {} })), None)
        .unwrap_err();
    assert!(err.to_string().starts_with("No config path specified for saving."));
}

#[test]
fn test_update_config_switches_file() {
    let dir = tempfile::tempdir().unwrap();
    let first = common::write_config(dir.path(), "first.toml", &common::stdio_config("node"));
    let second = common::write_config(dir.path(), "second.toml", &common::stdio_config("deno"));

    let manager = ConfigManager::new(first.as_path()).unwrap();
    manager.load().unwrap();
    let config = manager.update_config(&second).unwrap();

    assert_eq!(manager.config_path(), Some(second));
    assert_eq!(config.server("test").unwrap().as_stdio().unwrap().command, "deno");
    assert_eq!(manager.get_config().unwrap().document(), config.document());
}
