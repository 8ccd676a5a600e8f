//! Configuration manager: owns the live configuration.
//!
//! # State
//! ```text
//! Unbound ──new(Path)──▶ Bound ──load()──▶ Loaded ⇄ Loaded (reload ok / reload failed)
//!                                            │
//!                                  watch() / stop_watching()
//! ```
//!
//! # Design Decisions
//! - The current config is replaced with one atomic swap; readers never
//!   see a half-applied document
//! - A failed load leaves the previous config in place
//! - Reloads triggered by the watcher log their errors and carry on
//! - The watch sink holds a weak reference so a forgotten watch cannot keep
//!   the manager alive

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use arc_swap::ArcSwapOption;
use tokio::sync::watch;

use crate::config::document::Document;
use crate::config::loader::{load_config, save_document, ConfigError};
use crate::config::schema::{McpConfig, ServerDefinition};
use crate::config::validation::validate_config;
use crate::config::watcher::{
    NotifyWatchService, WatchEvent, WatchHandle, WatchOptions, WatchService, WatchSink,
};
use crate::observability::metrics::{self, ReloadOutcome};

/// Where the manager's configuration comes from.
#[derive(Debug, Clone, Default)]
pub enum ConfigSource {
    /// No source yet; `save_config` needs an explicit path.
    #[default]
    Unbound,
    /// A file, read on `load()`.
    Path(PathBuf),
    /// An already parsed document, validated at construction.
    Inline(Document),
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        ConfigSource::Path(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        ConfigSource::Path(path.to_path_buf())
    }
}

impl From<&str> for ConfigSource {
    fn from(path: &str) -> Self {
        ConfigSource::Path(PathBuf::from(path))
    }
}

impl From<Document> for ConfigSource {
    fn from(document: Document) -> Self {
        ConfigSource::Inline(document)
    }
}

/// Owns the current configuration and keeps it in sync with its file.
pub struct ConfigManager {
    inner: Arc<Inner>,
}

struct Inner {
    path: ArcSwapOption<PathBuf>,
    current: ArcSwapOption<McpConfig>,
    changes: watch::Sender<Option<Arc<McpConfig>>>,
    watch: Mutex<Option<Box<dyn WatchHandle>>>,
    watch_service: Arc<dyn WatchService>,
    watch_options: WatchOptions,
}

impl ConfigManager {
    /// Create a manager using the `notify` watch service.
    ///
    /// A path source does no I/O; an inline document is validated now.
    pub fn new(source: impl Into<ConfigSource>) -> Result<Self, ConfigError> {
        Self::with_watch_service(source, Arc::new(NotifyWatchService), WatchOptions::default())
    }

    /// Create a manager with a custom watch service.
    pub fn with_watch_service(
        source: impl Into<ConfigSource>,
        watch_service: Arc<dyn WatchService>,
        watch_options: WatchOptions,
    ) -> Result<Self, ConfigError> {
        let (changes, _) = watch::channel(None);
        let inner = Arc::new(Inner {
            path: ArcSwapOption::empty(),
            current: ArcSwapOption::empty(),
            changes,
            watch: Mutex::new(None),
            watch_service,
            watch_options,
        });

        match source.into() {
            ConfigSource::Unbound => {}
            ConfigSource::Path(path) => inner.path.store(Some(Arc::new(path))),
            ConfigSource::Inline(document) => {
                let config = validate_config(&document)?;
                inner.install(Arc::new(config));
            }
        }

        Ok(Self { inner })
    }

    /// Path `load()` and `watch()` use, if bound.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.inner.path.load_full().map(|path| (*path).clone())
    }

    /// Read, decode and validate the bound file, then make it current.
    ///
    /// On any failure the current configuration is left untouched.
    pub fn load(&self) -> Result<Arc<McpConfig>, ConfigError> {
        self.inner.load()
    }

    /// Start reloading on file changes. Calling it again is a no-op.
    pub fn watch(&self) -> Result<(), ConfigError> {
        let mut slot = self.inner.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            tracing::debug!("Config watcher already running");
            return Ok(());
        }
        let path = self
            .inner
            .path
            .load_full()
            .ok_or(ConfigError::NoConfigPathSpecified)?;

        let sink = reload_sink(Arc::downgrade(&self.inner));
        let handle = self
            .inner
            .watch_service
            .watch(&path, self.inner.watch_options, sink)?;
        *slot = Some(handle);
        Ok(())
    }

    /// Stop reloading on file changes. Safe to call when not watching.
    pub fn stop_watching(&self) {
        let handle = self
            .inner
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.close();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.inner
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Rebind to `path` and load it. An active watch follows the new path.
    ///
    /// The load result is returned even when moving the watch fails; that
    /// failure is logged and the manager is left not watching.
    pub fn update_config(&self, path: impl Into<PathBuf>) -> Result<Arc<McpConfig>, ConfigError> {
        let path = path.into();
        tracing::info!(path = %path.display(), "Switching config file");
        self.inner.path.store(Some(Arc::new(path)));

        let loaded = self.load();
        if self.is_watching() {
            self.stop_watching();
            if let Err(e) = self.watch() {
                metrics::record_watch_error();
                tracing::error!("Failed to watch new config file: {}", e);
            }
        }
        loaded
    }

    /// Current configuration, `None` until the first successful load.
    pub fn get_config(&self) -> Option<Arc<McpConfig>> {
        self.inner.current.load_full()
    }

    /// Definition of `name` in the current configuration.
    pub fn get_server_config(&self, name: &str) -> Option<ServerDefinition> {
        self.get_config()?.server(name).cloned()
    }

    /// Observe every configuration that becomes current.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<McpConfig>>> {
        self.inner.changes.subscribe()
    }

    /// Write `document` to `path`, or to the bound path when `None`.
    ///
    /// Documents that came from a load keep their comments and layout;
    /// plain documents are written clean. The document is not validated
    /// and the current configuration does not change. Returns the path
    /// written.
    pub fn save_config(&self, document: &Document, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if !document.value().is_object() {
            return Err(ConfigError::InvalidConfigObject);
        }
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self
                .config_path()
                .ok_or(ConfigError::NoSavePathSpecified)?,
        };

        save_document(document, &target)?;
        tracing::info!(
            path = %target.display(),
            preserved_formatting = document.has_formatting(),
            "Configuration saved"
        );
        Ok(target)
    }
}

impl Drop for ConfigManager {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

impl Inner {
    fn load(&self) -> Result<Arc<McpConfig>, ConfigError> {
        let path = self.path.load_full().ok_or(ConfigError::NoConfigPathSpecified)?;
        let config = Arc::new(load_config(&path)?);
        self.install(config.clone());
        tracing::info!(
            path = %path.display(),
            servers = config.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn install(&self, config: Arc<McpConfig>) {
        metrics::record_server_count(config.len());
        self.current.store(Some(config.clone()));
        self.changes.send_replace(Some(config));
    }

    fn reload(&self) {
        match self.load() {
            Ok(_) => metrics::record_reload(ReloadOutcome::Success),
            Err(e) => {
                metrics::record_reload(ReloadOutcome::Failure);
                tracing::error!("Failed to reload config: {}. Keeping current configuration.", e);
            }
        }
    }
}

fn reload_sink(inner: Weak<Inner>) -> WatchSink {
    Arc::new(move |event: WatchEvent| {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match event {
            WatchEvent::Changed => {
                tracing::info!("Config file change detected, reloading...");
                inner.reload();
            }
            WatchEvent::Error(message) => {
                metrics::record_watch_error();
                tracing::error!("Watch error: {}", message);
            }
        }
    })
}
