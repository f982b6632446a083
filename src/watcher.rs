//! Source tree watcher
//!
//! Wraps a recursive `notify` watcher and forwards every create, modify or
//! remove under the root as a [`ChangeEvent`] on a tokio channel. No
//! debouncing happens here; the orchestrator coalesces bursts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::Result;

/// A detected modification under the watched root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub changed_path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(changed_path: impl Into<PathBuf>) -> Self {
        Self {
            changed_path: changed_path.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A closable source of change events
pub trait ChangeSource: Send {
    /// Stop emitting events. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Watch options
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Path prefixes whose events are dropped
    pub ignore: Vec<PathBuf>,
}

impl WatchOptions {
    /// Drop events under `prefix`
    pub fn ignore(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.ignore.push(prefix.into());
        self
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// Persistent recursive watcher over one directory tree
pub struct ChangeWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    closed: Arc<AtomicBool>,
}

impl ChangeWatcher {
    /// Start watching `root`; events arrive on the returned receiver until
    /// [`ChangeSource::close`] is called.
    pub fn watch(root: &Path, options: WatchOptions) -> Result<(Self, mpsc::UnboundedReceiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let closed_flag = Arc::clone(&closed);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if closed_flag.load(Ordering::SeqCst) {
                    return;
                }
                match res {
                    Ok(event) => {
                        if !is_modification(&event.kind) {
                            return;
                        }
                        for path in event.paths {
                            if options.is_ignored(&path) {
                                continue;
                            }
                            debug!("Change: {:?} {}", event.kind, path.display());
                            let _ = tx.send(ChangeEvent::new(path));
                        }
                    }
                    Err(e) => warn!("Watcher error: {}", e),
                }
            },
            Config::default(),
        )?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("Watching {}", root.display());

        Ok((
            Self {
                root: root.to_path_buf(),
                watcher: Some(watcher),
                closed,
            },
            rx,
        ))
    }
}

impl ChangeSource for ChangeWatcher {
    fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut watcher) = self.watcher.take()
            && let Err(e) = watcher.unwatch(&self.root)
        {
            debug!("Unwatch {} failed: {}", self.root.display(), e);
        }
        info!("Stopped watching {}", self.root.display());
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn is_modification(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> Option<ChangeEvent> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten()
    }

    #[test]
    fn test_is_modification() {
        assert!(is_modification(&EventKind::Create(CreateKind::File)));
        assert!(is_modification(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_modification(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn test_watch_options_ignore() {
        let options = WatchOptions::default().ignore("/src/.devloop");
        assert!(options.is_ignored(Path::new("/src/.devloop/index.mjs")));
        assert!(!options.is_ignored(Path::new("/src/agents/index.ts")));
    }

    #[tokio::test]
    async fn test_emits_on_change() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let (mut watcher, mut rx) = ChangeWatcher::watch(&root, WatchOptions::default()).unwrap();

        std::fs::write(root.join("agent.ts"), "export {}").unwrap();

        let event = next_event(&mut rx).await.expect("no change event");
        assert!(event.changed_path.starts_with(&root));
        watcher.close();
    }

    #[tokio::test]
    async fn test_emits_for_nested_paths() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let nested = root.join("tools").join("weather");
        std::fs::create_dir_all(&nested).unwrap();
        let (mut watcher, mut rx) = ChangeWatcher::watch(&root, WatchOptions::default()).unwrap();

        std::fs::write(nested.join("index.ts"), "export {}").unwrap();

        let event = next_event(&mut rx).await.expect("no change event");
        assert!(event.changed_path.starts_with(&nested));
        watcher.close();
    }

    #[tokio::test]
    async fn test_ignored_paths_are_dropped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let ignored = root.join("out");
        std::fs::create_dir_all(&ignored).unwrap();
        let (mut watcher, mut rx) = ChangeWatcher::watch(&root, WatchOptions::default().ignore(&ignored)).unwrap();

        std::fs::write(ignored.join("bundle.mjs"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(root.join("agent.ts"), "x").unwrap();

        let event = next_event(&mut rx).await.expect("no change event");
        assert!(!event.changed_path.starts_with(&ignored));
        watcher.close();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_emission() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let (mut watcher, mut rx) = ChangeWatcher::watch(&root, WatchOptions::default()).unwrap();

        watcher.close();
        watcher.close();
        assert!(watcher.is_closed());

        while rx.try_recv().is_ok() {}
        std::fs::write(root.join("late.ts"), "x").unwrap();

        let late = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(!matches!(late, Ok(Some(_))));
    }
}
