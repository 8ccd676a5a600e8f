//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML with comments, or JSON)
//!     → loader.rs (read)
//!     → document.rs (decode, keep formatting)
//!     → validation.rs (rules + defaults)
//!     → McpConfig (validated, immutable)
//!     → held by manager.rs, shared via Arc
//!
//! On file change:
//!     watcher.rs detects change, waits for writes to settle
//!     → manager.rs reloads through the same pipeline
//!     → atomic swap of Arc<McpConfig> on success
//!     → error logged, previous config kept on failure
//!
//! On save:
//!     Document → document.rs (reuse formatting if present)
//!     → loader.rs (write temp file, rename)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - Validation stops at the first error, in a fixed rule order
//! - Comments survive a load/save round-trip

pub mod document;
pub mod loader;
pub mod manager;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use document::{Document, DocumentFormat};
pub use loader::ConfigError;
pub use manager::{ConfigManager, ConfigSource};
pub use schema::{DevOverlay, McpConfig, RemoteServer, ServerDefinition, StdioServer};
pub use validation::ValidationError;
pub use watcher::{NotifyWatchService, WatchEvent, WatchOptions, WatchService};
