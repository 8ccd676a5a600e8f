//! Configuration schema definitions.
//!
//! Typed view over a validated configuration document. The document itself
//! stays the source of truth for persistence; these types are what the
//! supervisor reads.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::document::Document;

/// Root field holding the server map.
pub const SERVERS_KEY: &str = "mcpServers";

/// `type` tag of command-launched servers.
pub const STDIO_TYPE: &str = "stdio";

/// `type` tag given to URL servers that do not name one.
pub const DEFAULT_REMOTE_TYPE: &str = "sse";

/// Restart debounce used when a dev overlay does not set one.
pub const DEFAULT_DEV_DEBOUNCE: Duration = Duration::from_millis(500);

/// A validated, normalized configuration.
#[derive(Debug, Clone)]
pub struct McpConfig {
    document: Document,
    servers: BTreeMap<String, ServerDefinition>,
}

impl McpConfig {
    pub(crate) fn new(document: Document, servers: BTreeMap<String, ServerDefinition>) -> Self {
        Self { document, servers }
    }

    /// The normalized document, formatting included.
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn servers(&self) -> &BTreeMap<String, ServerDefinition> {
        &self.servers
    }

    pub fn server(&self, name: &str) -> Option<&ServerDefinition> {
        self.servers.get(name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl PartialEq for McpConfig {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document
    }
}

/// One configured server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerDefinition {
    /// Launched as a child process speaking over stdio.
    Stdio(StdioServer),
    /// Reached over the network at a URL.
    Remote(RemoteServer),
}

impl ServerDefinition {
    /// Normalized `type` tag.
    pub fn server_type(&self) -> &str {
        match self {
            ServerDefinition::Stdio(_) => STDIO_TYPE,
            ServerDefinition::Remote(remote) => &remote.server_type,
        }
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        match self {
            ServerDefinition::Stdio(stdio) => &stdio.env,
            ServerDefinition::Remote(remote) => &remote.env,
        }
    }

    /// Fields the schema does not interpret, kept as written.
    pub fn extra(&self) -> &Map<String, Value> {
        match self {
            ServerDefinition::Stdio(stdio) => &stdio.extra,
            ServerDefinition::Remote(remote) => &remote.extra,
        }
    }

    /// `disabled = true` asks the supervisor to leave the server stopped.
    pub fn is_disabled(&self) -> bool {
        self.extra()
            .get("disabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn dev(&self) -> Option<&DevOverlay> {
        match self {
            ServerDefinition::Stdio(stdio) => stdio.dev.as_ref(),
            ServerDefinition::Remote(_) => None,
        }
    }

    pub fn as_stdio(&self) -> Option<&StdioServer> {
        match self {
            ServerDefinition::Stdio(stdio) => Some(stdio),
            ServerDefinition::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteServer> {
        match self {
            ServerDefinition::Stdio(_) => None,
            ServerDefinition::Remote(remote) => Some(remote),
        }
    }
}

/// Server started from a local command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StdioServer {
    pub command: String,

    /// Empty when the document has none.
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, deserialize_with = "env_strings")]
    pub env: BTreeMap<String, String>,

    /// Local development auto-restart settings.
    #[serde(default)]
    pub dev: Option<DevOverlay>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server reached over the network.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteServer {
    pub url: String,

    /// Transport tag, `sse` unless the document names another.
    #[serde(rename = "type")]
    pub server_type: String,

    #[serde(default, deserialize_with = "env_strings")]
    pub env: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Development overlay: restart the server when its sources change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DevOverlay {
    #[serde(default)]
    pub enabled: bool,

    /// Absolute working directory the watch patterns are relative to.
    pub cwd: PathBuf,

    /// Glob patterns to watch.
    #[serde(default)]
    pub watch: Vec<String>,

    /// Explicit debounce, `None` when the document leaves it out.
    #[serde(default, deserialize_with = "debounce_millis")]
    pub debounce: Option<Duration>,
}

impl DevOverlay {
    /// Effective debounce.
    pub fn debounce(&self) -> Duration {
        self.debounce.unwrap_or(DEFAULT_DEV_DEBOUNCE)
    }
}

/// An `env` value as the child process sees it. Only scalars qualify.
pub(crate) fn env_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Milliseconds to a `Duration`; `None` when negative, not finite, or too large.
pub(crate) fn debounce_from_millis(ms: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

fn env_strings<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Map::<String, Value>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, value)| match env_string(&value) {
            Some(value) => Ok((key, value)),
            None => Err(de::Error::custom(format!("env `{key}` must be a scalar"))),
        })
        .collect()
}

fn debounce_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = f64::deserialize(deserializer)?;
    debounce_from_millis(ms)
        .map(Some)
        .ok_or_else(|| de::Error::custom("debounce must be a non-negative number of milliseconds"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_debounce_from_millis() {
        assert_eq!(debounce_from_millis(250.0), Some(Duration::from_millis(250)));
        assert_eq!(debounce_from_millis(0.0), Some(Duration::ZERO));
        assert_eq!(debounce_from_millis(-1.0), None);
        assert_eq!(debounce_from_millis(f64::NAN), None);
        assert_eq!(debounce_from_millis(1e300), None);
    }

    #[test]
    fn test_stdio_view_from_value() {
        let server: StdioServer = serde_json::from_value(json!({
            "command": "node",
            "env": { "PORT": 3000 },
            "disabled": true,
            "dev": { "cwd": "/p", "debounce": 100 }
        }))
        .unwrap();
        assert!(server.args.is_empty());
        assert_eq!(server.env["PORT"], "3000");
        assert_eq!(server.extra.get("disabled"), Some(&json!(true)));
        assert_eq!(server.dev.unwrap().debounce(), Duration::from_millis(100));
    }

    #[test]
    fn test_oversized_debounce_is_rejected() {
        let result = serde_json::from_value::<DevOverlay>(json!({ "cwd": "/p", "debounce": 1e300 }));
        assert!(result.is_err());
    }
}
