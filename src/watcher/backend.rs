//! OS watch handles behind a trait.
//!
//! A [`WatchBackend`] opens one handle per watched path and forwards raw
//! events, tagged with the path the handle was opened for, into a channel.
//! Dropping a handle closes it.
//!
//! Files are watched through their parent directory. An inotify watch on
//! the file itself follows the inode, and saving through a temp file and
//! a rename (editors, `git checkout`) replaces that inode and silently
//! ends the watch.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::WatchError;

/// A raw filesystem event observed by one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    /// Path the reporting handle was opened for.
    pub watched: PathBuf,
    pub kind: EventKind,
    /// Paths the event names. May be below `watched` for directory handles.
    pub paths: Vec<PathBuf>,
}

/// An open watch. Closed on drop.
pub trait WatchHandle: Send {
    fn path(&self) -> &Path;
}

/// Opens watch handles.
pub trait WatchBackend: Send + Sync {
    fn watch(&self, path: &Path, mode: RecursiveMode) -> Result<Box<dyn WatchHandle>, WatchError>;
}

/// Events that say nothing about content: opens, closes and attribute
/// changes. Reading a watched file produces these, so they are dropped
/// before they can retrigger a read.
pub fn is_noise(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Access(_) | EventKind::Modify(ModifyKind::Metadata(_))
    )
}

/// Backend on `notify`'s recommended watcher.
///
/// Each handle owns its own watcher, so closing a recursive directory
/// watch can never tear down a file watch opened separately beneath it.
#[derive(Debug, Clone)]
pub struct NotifyBackend {
    tx: mpsc::Sender<RawChange>,
}

impl NotifyBackend {
    pub fn new(tx: mpsc::Sender<RawChange>) -> Self {
        Self { tx }
    }

    /// A backend and the receiving end of its event channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RawChange>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

struct NotifyHandle {
    path: PathBuf,
    _watcher: notify::RecommendedWatcher,
}

impl WatchHandle for NotifyHandle {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&self, path: &Path, mode: RecursiveMode) -> Result<Box<dyn WatchHandle>, WatchError> {
        let tx = self.tx.clone();
        let watched = path.to_path_buf();

        // Directories are watched as asked; files through their parent,
        // keeping only events that name the file
        let (target, mode, only) = match path.parent() {
            Some(parent) if !path.is_dir() => {
                (parent.to_path_buf(), RecursiveMode::NonRecursive, Some(watched.clone()))
            }
            _ => (watched.clone(), mode, None),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_noise(&event.kind) {
                    return;
                }
                let names_file = only
                    .as_ref()
                    .is_none_or(|file| event.paths.iter().any(|p| p == file));
                if !names_file {
                    return;
                }
                let _ = tx.blocking_send(RawChange {
                    watched: watched.clone(),
                    kind: event.kind,
                    paths: event.paths,
                });
            }
            Err(e) => {
                tracing::warn!("[watcher] event error for {}: {e}", watched.display());
            }
        })?;

        watcher
            .watch(&target, mode)
            .map_err(|e| WatchError::path(path, e))?;

        crate::debug_event!("watcher", "opened", "{} via {} ({mode:?})", path.display(), target.display());
        Ok(Box::new(NotifyHandle {
            path: path.to_path_buf(),
            _watcher: watcher,
        }))
    }
}
