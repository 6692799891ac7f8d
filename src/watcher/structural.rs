//! Structural watcher: notices skills appearing and disappearing.
//!
//! Watches the skills root and each unit directory non-recursively, so
//! large document trees never reach it. Only directories created or
//! removed directly under the root, and definition files created or
//! removed directly inside a unit directory, count as structural. They
//! share one debounce key: `mkdir` followed by writing `SKILL.md` becomes
//! a single re-scan.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{EventKind, RecursiveMode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::WatchError;
use super::backend::{NotifyBackend, RawChange, WatchBackend, WatchHandle};
use super::debouncer::Debouncer;

/// Receives debounced structural changes.
#[async_trait]
pub trait RescanHandler: Send + Sync {
    /// Re-scan the catalog. Called at most once per quiet period.
    async fn rescan(&self);
}

/// Decides which raw events are structural.
#[derive(Debug, Clone)]
pub struct StructuralFilter {
    root: PathBuf,
    definition_files: Vec<String>,
}

impl StructuralFilter {
    pub fn new(root: PathBuf, definition_files: Vec<String>) -> Self {
        Self {
            root,
            definition_files,
        }
    }

    /// Whether an event of `kind` at `path` can change catalog membership.
    ///
    /// `known_units` are the unit directories currently watched; removed
    /// paths no longer exist, so they are the only way to tell a removed
    /// directory from a removed file when the backend does not say.
    pub fn is_structural(
        &self,
        kind: &EventKind,
        path: &Path,
        known_units: &dyn Fn(&Path) -> bool,
    ) -> bool {
        let membership_kind = matches!(
            kind,
            EventKind::Create(_)
                | EventKind::Remove(_)
                | EventKind::Modify(ModifyKind::Name(_))
                | EventKind::Any
        );
        if !membership_kind {
            return false;
        }
        let Some(parent) = path.parent() else {
            return false;
        };

        if parent == self.root {
            return match kind {
                EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
                    true
                }
                EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => false,
                _ => path.is_dir() || known_units(path),
            };
        }

        if parent.parent() == Some(self.root.as_path()) {
            return path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| self.definition_files.iter().any(|d| d == name));
        }

        false
    }
}

/// Watches the root for structural changes and triggers re-scans.
pub struct StructuralWatcher {
    filter: StructuralFilter,
    root: PathBuf,
    backend: Arc<dyn WatchBackend>,
    events: mpsc::Receiver<RawChange>,
    debouncer: Debouncer<()>,
    handler: Arc<dyn RescanHandler>,
    root_handle: Option<Box<dyn WatchHandle>>,
    unit_handles: HashMap<PathBuf, Box<dyn WatchHandle>>,
}

impl StructuralWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder() -> StructuralWatcherBuilder {
        StructuralWatcherBuilder::new()
    }

    /// Open the root watch and spawn the event loop.
    ///
    /// Fails when the root itself cannot be watched. Unit directories that
    /// cannot be watched are logged and skipped.
    pub fn spawn(mut self, shutdown: CancellationToken) -> Result<JoinHandle<()>, WatchError> {
        self.root_handle = Some(self.backend.watch(&self.root, RecursiveMode::NonRecursive)?);
        self.sync_unit_watches();

        crate::log_event!(
            "structure",
            "watching",
            "{} ({} skill directories)",
            self.root.display(),
            self.unit_handles.len()
        );
        Ok(tokio::spawn(self.run(shutdown)))
    }

    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let deadline = self.debouncer.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,

                change = self.events.recv() => match change {
                    Some(change) => self.handle_change(&change),
                    None => break,
                },

                _ = timer => {
                    if !self.debouncer.take_ready().is_empty() {
                        crate::log_event!("structure", "rescanning");
                        self.handler.rescan().await;
                        self.sync_unit_watches();
                    }
                }
            }
        }

        crate::debug_event!("structure", "stopped");
    }

    fn handle_change(&mut self, change: &RawChange) {
        let units = &self.unit_handles;
        let known = |path: &Path| units.contains_key(path);

        let structural = change
            .paths
            .iter()
            .any(|path| self.filter.is_structural(&change.kind, path, &known));
        if !structural {
            return;
        }

        crate::debug_event!("structure", "change", "{:?} {:?}", change.kind, change.paths);
        self.debouncer.record(());
        // Watch new unit directories right away so their definition file
        // is seen even if it is written before the re-scan
        self.sync_unit_watches();
    }

    /// Watch every directory directly under the root, and nothing else.
    fn sync_unit_watches(&mut self) {
        let current: Vec<PathBuf> = match fs::read_dir(&self.root) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect(),
            Err(e) => {
                tracing::warn!("[structure] cannot list {}: {e}", self.root.display());
                Vec::new()
            }
        };

        self.unit_handles.retain(|path, _| current.contains(path));
        for dir in current {
            if self.unit_handles.contains_key(&dir) {
                continue;
            }
            match self.backend.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(handle) => {
                    self.unit_handles.insert(dir, handle);
                }
                Err(e) => tracing::warn!("[structure] {e}"),
            }
        }
    }

    /// Unit directories currently watched, sorted.
    pub fn watched_units(&self) -> Vec<PathBuf> {
        let mut units: Vec<PathBuf> = self.unit_handles.keys().cloned().collect();
        units.sort();
        units
    }
}

/// Builder for constructing a StructuralWatcher.
pub struct StructuralWatcherBuilder {
    root: Option<PathBuf>,
    definition_files: Vec<String>,
    handler: Option<Arc<dyn RescanHandler>>,
    backend: Option<(Arc<dyn WatchBackend>, mpsc::Receiver<RawChange>)>,
    debounce_ms: u64,
    channel_capacity: usize,
}

impl Default for StructuralWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralWatcherBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            root: None,
            definition_files: vec!["SKILL.md".to_string(), "skill.md".to_string()],
            handler: None,
            backend: None,
            debounce_ms: 300,
            channel_capacity: 256,
        }
    }

    /// Set the skills root. Should be the resolved root of the catalog so
    /// event paths compare equal.
    pub fn root(mut self, root: PathBuf) -> Self {
        self.root = Some(root);
        self
    }

    pub fn definition_files(mut self, names: Vec<String>) -> Self {
        self.definition_files = names;
        self
    }

    /// Set the handler run after each quiet period.
    pub fn handler(mut self, handler: Arc<dyn RescanHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Use a custom backend together with the receiver of its events.
    pub fn backend(mut self, backend: Arc<dyn WatchBackend>, events: mpsc::Receiver<RawChange>) -> Self {
        self.backend = Some((backend, events));
        self
    }

    /// Set the debounce duration in milliseconds.
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<StructuralWatcher, WatchError> {
        let root = self.root.ok_or_else(|| WatchError::InitFailed {
            reason: "structural watcher needs a root".to_string(),
        })?;
        let handler = self.handler.ok_or_else(|| WatchError::InitFailed {
            reason: "structural watcher needs a rescan handler".to_string(),
        })?;
        let (backend, events) = match self.backend {
            Some(pair) => pair,
            None => {
                let (backend, events) = NotifyBackend::channel(self.channel_capacity);
                (Arc::new(backend) as Arc<dyn WatchBackend>, events)
            }
        };

        Ok(StructuralWatcher {
            filter: StructuralFilter::new(root.clone(), self.definition_files),
            root,
            backend,
            events,
            debouncer: Debouncer::new(self.debounce_ms),
            handler,
            root_handle: None,
            unit_handles: HashMap::new(),
        })
    }
}
