//! MCP server configuration manager.
//!
//! Loads the `mcpServers` configuration the supervisor launches servers
//! from, validates and normalizes it, reloads it when the file changes and
//! saves it back without losing comments.

pub mod config;
pub mod observability;

pub use config::{ConfigError, ConfigManager, ConfigSource, Document, McpConfig, ServerDefinition};
