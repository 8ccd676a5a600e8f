//! Configuration validation.
//!
//! # Responsibilities
//! - Check the `mcpServers` section and every server entry
//! - Apply defaults (`args`, `type`) to produce the normalized document
//! - Build the typed view the supervisor consumes
//!
//! # Design Decisions
//! - Pure function: `&Document → Result<McpConfig, ValidationError>`
//! - Stops at the first failing rule; rules run in a fixed order so the
//!   same document always reports the same error
//! - Formatting is carried through untouched
//! - A non-table `dev` and a missing `dev.cwd` report the same error
//! - Rules are checked on the raw value; the typed view is deserialized
//!   from the normalized entry once the rules pass

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::document::Document;
use crate::config::schema::{
    debounce_from_millis, env_string, McpConfig, ServerDefinition, DEFAULT_REMOTE_TYPE,
    SERVERS_KEY, STDIO_TYPE,
};

/// A single rule violation. Messages name the server and the rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing or invalid mcpServers configuration")]
    MissingServersSection,

    #[error("Server '{0}' must include either command (for stdio) or url (for sse)")]
    MissingIdentifier(String),

    #[error("Server '{0}' has invalid environment config")]
    InvalidEnv(String),

    #[error("Server '{0}' dev field is only supported for stdio servers")]
    DevNotSupportedOnRemote(String),

    #[error("Server '{0}' dev.cwd must be an absolute path")]
    DevCwdMustBeAbsolute(String),

    #[error("Server '{0}' dev.watch must be an array of strings")]
    DevWatchMustBeStringArray(String),

    #[error("Server '{server}' {field} must be {expected}")]
    InvalidField {
        server: String,
        field: &'static str,
        expected: &'static str,
    },

    #[error("Server '{server}' is malformed: {message}")]
    Malformed { server: String, message: String },
}

impl ValidationError {
    /// Server the error is about, if any.
    pub fn server(&self) -> Option<&str> {
        match self {
            ValidationError::MissingServersSection => None,
            ValidationError::MissingIdentifier(name)
            | ValidationError::InvalidEnv(name)
            | ValidationError::DevNotSupportedOnRemote(name)
            | ValidationError::DevCwdMustBeAbsolute(name)
            | ValidationError::DevWatchMustBeStringArray(name) => Some(name),
            ValidationError::InvalidField { server, .. }
            | ValidationError::Malformed { server, .. } => Some(server),
        }
    }
}

/// Validate a parsed document and normalize it.
pub fn validate_config(document: &Document) -> Result<McpConfig, ValidationError> {
    let servers = document
        .value()
        .get(SERVERS_KEY)
        .and_then(Value::as_object)
        .ok_or(ValidationError::MissingServersSection)?;

    let mut normalized = Map::new();
    let mut typed = BTreeMap::new();
    for (name, raw) in servers {
        let (entry, definition) = validate_server(name, raw)?;
        normalized.insert(name.clone(), entry);
        typed.insert(name.clone(), definition);
    }

    let mut root = document.value().clone();
    if let Some(root) = root.as_object_mut() {
        root.insert(SERVERS_KEY.to_string(), Value::Object(normalized));
    }

    Ok(McpConfig::new(document.with_value(root), typed))
}

fn validate_server(name: &str, raw: &Value) -> Result<(Value, ServerDefinition), ValidationError> {
    let missing = || ValidationError::MissingIdentifier(name.to_string());
    let fields = raw.as_object().ok_or_else(missing)?;

    let present = |key: &str| fields.get(key).is_some_and(|v| !v.is_null());
    if !present("command") && !present("url") {
        return Err(missing());
    }
    let command = string_field(name, fields, "command")?;
    let url = string_field(name, fields, "url")?;

    if let Some(env) = fields.get("env") {
        if !is_env_table(env) {
            return Err(ValidationError::InvalidEnv(name.to_string()));
        }
    }

    if let (Some(_), Some(args)) = (&command, fields.get("args")) {
        if string_array(args).is_none() {
            return Err(ValidationError::InvalidField {
                server: name.to_string(),
                field: "args",
                expected: "an array of strings",
            });
        }
    }

    if let Some(dev) = fields.get("dev") {
        if command.is_none() {
            return Err(ValidationError::DevNotSupportedOnRemote(name.to_string()));
        }
        check_dev(name, dev)?;
    }

    let mut entry = fields.clone();
    let definition = match (command, url) {
        (Some(_), _) => {
            if !fields.contains_key("args") {
                entry.insert("args".to_string(), Value::Array(Vec::new()));
            }
            entry.insert("type".to_string(), Value::String(STDIO_TYPE.to_string()));
            // `type` is implied by the variant, keep it out of `extra`.
            let mut view = entry.clone();
            view.remove("type");
            ServerDefinition::Stdio(typed_view(name, view)?)
        }
        (None, Some(_)) => {
            let server_type = fields
                .get("type")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty() && *t != STDIO_TYPE)
                .unwrap_or(DEFAULT_REMOTE_TYPE)
                .to_string();
            entry.insert("type".to_string(), Value::String(server_type));
            ServerDefinition::Remote(typed_view(name, entry.clone())?)
        }
        (None, None) => return Err(missing()),
    };

    Ok((Value::Object(entry), definition))
}

fn typed_view<T: DeserializeOwned>(name: &str, entry: Map<String, Value>) -> Result<T, ValidationError> {
    serde_json::from_value(Value::Object(entry)).map_err(|e| ValidationError::Malformed {
        server: name.to_string(),
        message: e.to_string(),
    })
}

fn check_dev(name: &str, dev: &Value) -> Result<(), ValidationError> {
    let cwd_is_absolute = dev
        .get("cwd")
        .and_then(Value::as_str)
        .is_some_and(|cwd| Path::new(cwd).is_absolute());
    if !cwd_is_absolute {
        return Err(ValidationError::DevCwdMustBeAbsolute(name.to_string()));
    }

    if let Some(watch) = dev.get("watch") {
        if string_array(watch).is_none() {
            return Err(ValidationError::DevWatchMustBeStringArray(name.to_string()));
        }
    }

    if dev.get("enabled").is_some_and(|enabled| !enabled.is_boolean()) {
        return Err(ValidationError::InvalidField {
            server: name.to_string(),
            field: "dev.enabled",
            expected: "a boolean",
        });
    }

    if let Some(ms) = dev.get("debounce") {
        if ms.as_f64().and_then(debounce_from_millis).is_none() {
            return Err(ValidationError::InvalidField {
                server: name.to_string(),
                field: "dev.debounce",
                expected: "a non-negative number",
            });
        }
    }

    Ok(())
}

fn string_field(
    name: &str,
    fields: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, ValidationError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::InvalidField {
            server: name.to_string(),
            field: key,
            expected: "a string",
        }),
    }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Scalars are accepted and coerced later; nested tables and arrays are not.
fn is_env_table(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|env| env.values().all(|value| env_string(value).is_some()))
}
