//! Configuration file watcher for hot reload.
//!
//! # Responsibilities
//! - Report changes to a single configuration file
//! - Coalesce bursts of writes into one change ("write settled")
//! - Report watcher transport errors without failing
//!
//! # Design Decisions
//! - The parent directory is watched, not the file, so saves that replace
//!   the file through a rename are still seen
//! - Debounce runs on a Tokio task; the notify callback only forwards
//! - The sink runs on the blocking pool, so it may do file I/O, and a panic
//!   in it is logged without ending the watch
//! - Closing the handle drops the notify watcher, which closes the channel
//!   and ends the debounce task; a change already delivered is not cancelled

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Quiet period after the last write before a change is reported.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

/// Poll interval when polling is requested.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Options for a single watch registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Wait this long without further writes before reporting a change.
    pub settle: Duration,
    /// Do not report the file as changed when the watch starts.
    pub ignore_initial: bool,
    /// Poll the file system instead of using native notifications.
    pub polling: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            ignore_initial: true,
            polling: false,
        }
    }
}

/// Something the watch service has to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The file changed and writes have settled.
    Changed,
    /// The underlying watcher reported an error.
    Error(String),
}

/// Receiver of watch events. Called from the watcher's task.
pub type WatchSink = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Error registering a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("a Tokio runtime is required to watch files")]
    NoRuntime,

    #[error("cannot watch {}: not a file path", .0.display())]
    InvalidPath(PathBuf),

    #[error(transparent)]
    Notify(#[from] notify::Error),
}

/// Registers interest in a file and reports its changes.
pub trait WatchService: Send + Sync {
    fn watch(
        &self,
        path: &Path,
        options: WatchOptions,
        sink: WatchSink,
    ) -> Result<Box<dyn WatchHandle>, WatchError>;
}

/// A live registration. Closing it stops future events.
pub trait WatchHandle: Send {
    fn close(self: Box<Self>);
}

/// Watch service backed by `notify`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatchService;

enum Signal {
    Touched,
    Failed(String),
}

impl WatchService for NotifyWatchService {
    fn watch(
        &self,
        path: &Path,
        options: WatchOptions,
        sink: WatchSink,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        let file_name: OsString = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| WatchError::InvalidPath(path.to_path_buf()))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let initial_tx = tx.clone();

        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_change(&event.kind)
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()))
                {
                    let _ = tx.send(Signal::Touched);
                }
            }
            Err(e) => {
                let _ = tx.send(Signal::Failed(e.to_string()));
            }
        };

        let mut watcher: Box<dyn Watcher + Send> = if options.polling {
            Box::new(PollWatcher::new(
                handler,
                Config::default().with_poll_interval(POLL_INTERVAL),
            )?)
        } else {
            Box::new(RecommendedWatcher::new(handler, Config::default())?)
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        if !options.ignore_initial {
            let _ = initial_tx.send(Signal::Touched);
        }
        drop(initial_tx);

        runtime.spawn(settle(rx, options.settle, sink));

        tracing::info!(path = %path.display(), polling = options.polling, "Config watcher started");
        Ok(Box::new(NotifyWatchHandle {
            watcher,
            path: path.to_path_buf(),
        }))
    }
}

fn is_change(kind: &EventKind) -> bool {
    kind.is_modify() || kind.is_create()
}

/// Forward one `Changed` per burst of writes.
async fn settle(mut rx: mpsc::UnboundedReceiver<Signal>, quiet: Duration, sink: WatchSink) {
    while let Some(signal) = rx.recv().await {
        if let Signal::Failed(message) = signal {
            deliver(&sink, WatchEvent::Error(message)).await;
            continue;
        }

        loop {
            match tokio::time::timeout(quiet, rx.recv()).await {
                Ok(Some(Signal::Touched)) => {}
                Ok(Some(Signal::Failed(message))) => deliver(&sink, WatchEvent::Error(message)).await,
                // Closed while waiting: the change belongs to a stopped watch.
                Ok(None) => return,
                Err(_) => break,
            }
        }
        deliver(&sink, WatchEvent::Changed).await;
    }
}

async fn deliver(sink: &WatchSink, event: WatchEvent) {
    let sink = sink.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || sink(event)).await {
        tracing::error!("Watch event handler failed: {}", e);
    }
}

struct NotifyWatchHandle {
    watcher: Box<dyn Watcher + Send>,
    path: PathBuf,
}

impl WatchHandle for NotifyWatchHandle {
    fn close(self: Box<Self>) {
        let NotifyWatchHandle { watcher, path } = *self;
        drop(watcher);
        tracing::info!(path = %path.display(), "Config watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_sink() -> (WatchSink, Arc<Mutex<Vec<WatchEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        let sink: WatchSink = Arc::new(move |event: WatchEvent| recorded.lock().unwrap().push(event));
        (sink, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_coalesced() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sink, events) = recording_sink();
        let task = tokio::spawn(settle(rx, Duration::from_millis(100), sink));

        for _ in 0..5 {
            tx.send(Signal::Touched).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*events.lock().unwrap(), vec![WatchEvent::Changed]);

        tx.send(Signal::Touched).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(events.lock().unwrap().len(), 2);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_forwarded() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sink, events) = recording_sink();
        let task = tokio::spawn(settle(rx, Duration::from_millis(100), sink));

        tx.send(Signal::Failed("boom".into())).unwrap();
        drop(tx);
        task.await.unwrap();
        assert_eq!(*events.lock().unwrap(), vec![WatchEvent::Error("boom".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_change_dropped_on_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sink, events) = recording_sink();
        let task = tokio::spawn(settle(rx, Duration::from_millis(100), sink));

        tx.send(Signal::Touched).unwrap();
        drop(tx);
        task.await.unwrap();
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_panic_does_not_end_watch() {
        let (tx, rx) = mpsc::unbounded_channel();
        let calls = Arc::new(Mutex::new(0));
        let counted = calls.clone();
        let sink: WatchSink = Arc::new(move |_event: WatchEvent| {
            let mut calls = counted.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                drop(calls);
                panic!("handler failed");
            }
        });
        let task = tokio::spawn(settle(rx, Duration::from_millis(100), sink));

        tx.send(Signal::Touched).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(Signal::Touched).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        drop(tx);
        task.await.unwrap();
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_requires_runtime() {
        let (sink, _) = recording_sink();
        let result = NotifyWatchService.watch(Path::new("mcp.toml"), WatchOptions::default(), sink);
        assert!(matches!(result, Err(WatchError::NoRuntime)));
    }

    #[test]
    fn test_default_options() {
        let options = WatchOptions::default();
        assert!(options.ignore_initial);
        assert!(!options.polling);
        assert_eq!(options.settle, DEFAULT_SETTLE);
    }
}
