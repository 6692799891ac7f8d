//! Subscription manager: identifiers in, debounced update events out.
//!
//! ```text
//! subscribe(uri) -> resolve paths -> SubscriptionTable (one handle per path)
//!                                            |
//!                       backend events (RawChange) via mpsc
//!                                            |
//!                  dependents of the path -> Debouncer<uri>
//!                                            |
//!          ready -> refresh handler (re-scan) -> still subscribed?
//!                                            |
//!                               CatalogEvent::ResourceUpdated
//! ```
//!
//! Table, debouncer and the closed flag live under one mutex. Unsubscribe
//! cancels the pending key under it, and firing re-checks liveness under
//! it right before publishing, so an identifier unsubscribed inside its
//! debounce window is never reported.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use notify::RecursiveMode;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, CatalogHandle};
use crate::mcp::notifications::{CatalogEvent, NotificationBroadcaster};
use crate::resources::{UriScheme, resolve_watch_paths};

use super::WatchError;
use super::backend::{NotifyBackend, RawChange, WatchBackend, WatchHandle};
use super::debouncer::Debouncer;
use super::path_registry::SubscriptionTable;
use super::structural::RescanHandler;

struct State {
    table: SubscriptionTable,
    debouncer: Debouncer<String>,
    closed: bool,
    refresh: Option<Weak<dyn RescanHandler>>,
}

/// Tracks subscribed identifiers and reports their changes.
pub struct SubscriptionManager {
    state: Arc<Mutex<State>>,
    backend: Arc<dyn WatchBackend>,
    catalog: CatalogHandle,
    scheme: UriScheme,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionManager {
    /// Create a builder for configuring the manager.
    pub fn builder() -> SubscriptionManagerBuilder {
        SubscriptionManagerBuilder::new()
    }

    /// Run `handler` before every batch of updates is published, so reads
    /// made in response see a catalog that includes the change.
    pub fn set_refresh_handler(&self, handler: Weak<dyn RescanHandler>) {
        self.state.lock().refresh = Some(handler);
    }

    /// Start tracking `uri`. Subscribing twice is a no-op.
    ///
    /// Identifiers that resolve to no paths are accepted and never fire.
    /// A handle that cannot be opened fails the whole call and leaves
    /// `uri` unsubscribed.
    pub fn subscribe(&self, uri: &str) -> Result<(), WatchError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(WatchError::Closed);
        }
        if state.table.is_subscribed(uri) {
            return Ok(());
        }

        let paths = resolve_watch_paths(uri, &self.scheme, &self.catalog.snapshot());
        let path_count = paths.len();
        state.table.attach(uri, paths, |path| self.open(path))?;

        crate::debug_event!("subscriptions", "subscribed", "{uri} ({path_count} paths)");
        Ok(())
    }

    /// Stop tracking `uri` and cancel its pending notification. No-op when
    /// not subscribed.
    pub fn unsubscribe(&self, uri: &str) {
        let released = {
            let mut state = self.state.lock();
            state.debouncer.cancel(&uri.to_string());
            state.table.detach(uri)
        };
        Self::close_handles(released);
    }

    /// Unsubscribe every identifier starting with `prefix`. Returns how many.
    pub fn unsubscribe_by_prefix(&self, prefix: &str) -> usize {
        let (count, released) = {
            let mut state = self.state.lock();
            let matching: Vec<String> = state
                .table
                .uris()
                .filter(|uri| uri.starts_with(prefix))
                .map(str::to_string)
                .collect();

            let mut released = Vec::new();
            for uri in &matching {
                state.debouncer.cancel(uri);
                released.extend(state.table.detach(uri));
            }
            (matching.len(), released)
        };
        Self::close_handles(released);

        if count > 0 {
            crate::log_event!("subscriptions", "released", "{count} under {prefix}");
        }
        count
    }

    /// Install a new catalog snapshot and release every identifier that
    /// belongs to one of the `removed` skills.
    ///
    /// Both happen under the lock `subscribe` resolves under, so a racing
    /// subscribe either lands first and is released here, or resolves
    /// against the new snapshot. Ownership is decided on the parsed
    /// identifier, so `skill://my skill/SKILL.md` and
    /// `skill://my%20skill/SKILL.md` both belong to `my skill`. Returns the
    /// number released per removed skill, in the order given.
    pub fn install(&self, catalog: Catalog, removed: &[String]) -> Vec<(String, usize)> {
        let (counts, released) = {
            let mut state = self.state.lock();
            self.catalog.replace(catalog);

            let mut counts: Vec<(String, usize)> =
                removed.iter().map(|name| (name.clone(), 0)).collect();
            let owned: Vec<(String, usize)> = state
                .table
                .uris()
                .filter_map(|uri| {
                    let position = counts.iter().position(|(name, _)| self.owns(name, uri))?;
                    Some((uri.to_string(), position))
                })
                .collect();

            let mut released = Vec::new();
            for (uri, position) in owned {
                state.debouncer.cancel(&uri);
                released.extend(state.table.detach(&uri));
                counts[position].1 += 1;
            }
            (counts, released)
        };
        Self::close_handles(released);
        counts
    }

    /// Whether `uri` lies in the identifier namespace of skill `name`.
    fn owns(&self, name: &str, uri: &str) -> bool {
        match self.scheme.parse(uri) {
            Ok(parsed) => parsed.skill() == Some(name),
            Err(_) => uri.starts_with(&self.scheme.skill_prefix(name)),
        }
    }

    /// Re-resolve every subscription against the current snapshot.
    ///
    /// Identifiers whose path set changed are moved onto the new paths,
    /// keeping handles for paths in both sets. Identifiers that no longer
    /// resolve stay subscribed with no paths. When a new handle cannot be
    /// opened the identifier keeps its old paths. Returns the identifiers
    /// that moved.
    pub fn retarget(&self) -> Vec<String> {
        let catalog = self.catalog.snapshot();
        let mut moved = Vec::new();
        let mut released = Vec::new();

        {
            let mut state = self.state.lock();
            if state.closed {
                return moved;
            }

            let uris: Vec<String> = state.table.uris().map(str::to_string).collect();
            for uri in uris {
                let paths = resolve_watch_paths(&uri, &self.scheme, &catalog);
                let unchanged = state
                    .table
                    .paths_of(&uri)
                    .is_some_and(|current| same_paths(current, &paths));
                if unchanged {
                    continue;
                }

                match state.table.replace(&uri, paths, |path| self.open(path)) {
                    Ok(previous) => released.extend(previous),
                    Err(e) => {
                        tracing::warn!("[subscriptions] cannot retarget {uri}: {e}");
                        continue;
                    }
                }
                moved.push(uri);
            }
        }

        Self::close_handles(released);
        if !moved.is_empty() {
            crate::log_event!("subscriptions", "retargeted", "{}", moved.len());
        }
        moved
    }

    /// Release every handle, cancel every pending notification and stop
    /// the event loop. Later subscribes fail with [`WatchError::Closed`].
    pub fn close(&self) {
        let released = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.debouncer.clear();
            state.table.clear()
        };
        let count = released.len();
        Self::close_handles(released);
        self.shutdown.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        crate::log_event!("subscriptions", "closed", "{count} handles released");
    }

    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.state.lock().table.is_subscribed(uri)
    }

    /// Subscribed identifiers, sorted.
    pub fn subscribed(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.state.lock().table.uris().map(str::to_string).collect();
        uris.sort();
        uris
    }

    /// Paths with an open handle, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .state
            .lock()
            .table
            .watched_paths()
            .map(Path::to_path_buf)
            .collect();
        paths.sort();
        paths
    }

    pub fn handle_count(&self) -> usize {
        self.state.lock().table.handle_count()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn open(&self, path: &Path) -> Result<Box<dyn WatchHandle>, WatchError> {
        let mode = if path.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.backend.watch(path, mode)
    }

    fn close_handles(handles: Vec<Box<dyn WatchHandle>>) {
        for handle in handles {
            crate::debug_event!("subscriptions", "closed handle", "{}", handle.path().display());
        }
    }

    /// Map a raw change onto dependent identifiers and restart their timers.
    fn record_change(state: &Mutex<State>, change: &RawChange) {
        let mut state = state.lock();
        if state.closed {
            return;
        }

        let mut dependents = state.table.dependents_of(&change.watched);
        for path in &change.paths {
            dependents.extend(state.table.dependents_of(path));
        }
        // Events can name a path outside the handle's own (rename targets);
        // the reporting handle still owns them
        dependents.extend(
            state
                .table
                .dependents_of_handle(&change.watched)
                .map(str::to_string),
        );

        for uri in dependents {
            crate::debug_event!("subscriptions", "changed", "{uri} ({:?})", change.kind);
            state.debouncer.record(uri);
        }
    }

    /// Emit updates for every identifier that is ready and still subscribed.
    ///
    /// Liveness is checked after the refresh, which may itself release
    /// identifiers of a skill that no longer scans.
    async fn fire_ready(state: &Mutex<State>, broadcaster: &NotificationBroadcaster) {
        let (ready, refresh) = {
            let mut state = state.lock();
            (state.debouncer.take_ready(), state.refresh.clone())
        };
        if ready.is_empty() {
            return;
        }

        if let Some(handler) = refresh.and_then(|weak| weak.upgrade()) {
            handler.rescan().await;
        }

        let ready: Vec<String> = {
            let state = state.lock();
            ready
                .into_iter()
                .filter(|uri| state.table.is_subscribed(uri))
                .collect()
        };

        for uri in ready {
            crate::debug_event!("subscriptions", "fired", "{uri}");
            broadcaster.send(CatalogEvent::ResourceUpdated { uri });
        }
    }

    async fn run(
        state: Arc<Mutex<State>>,
        broadcaster: Arc<NotificationBroadcaster>,
        mut events: mpsc::Receiver<RawChange>,
        shutdown: CancellationToken,
    ) {
        crate::debug_event!("subscriptions", "started");

        loop {
            let deadline = state.lock().debouncer.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,

                change = events.recv() => match change {
                    Some(change) => Self::record_change(&state, &change),
                    None => break,
                },

                _ = timer => Self::fire_ready(&state, &broadcaster).await,
            }
        }

        crate::debug_event!("subscriptions", "stopped");
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn same_paths(current: &[PathBuf], resolved: &[PathBuf]) -> bool {
    current.len() == resolved.len() && resolved.iter().all(|path| current.contains(path))
}

/// Builder for constructing a SubscriptionManager.
pub struct SubscriptionManagerBuilder {
    catalog: Option<CatalogHandle>,
    scheme: UriScheme,
    broadcaster: Option<Arc<NotificationBroadcaster>>,
    backend: Option<(Arc<dyn WatchBackend>, mpsc::Receiver<RawChange>)>,
    debounce_ms: u64,
    channel_capacity: usize,
}

impl Default for SubscriptionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManagerBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            catalog: None,
            scheme: UriScheme::default(),
            broadcaster: None,
            backend: None,
            debounce_ms: 100,
            channel_capacity: 256,
        }
    }

    /// Set the catalog identifiers resolve against.
    pub fn catalog(mut self, catalog: CatalogHandle) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn scheme(mut self, scheme: UriScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the notification broadcaster.
    pub fn broadcaster(mut self, broadcaster: Arc<NotificationBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
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

    /// Capacity of the event channel of the default backend.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Build the manager and spawn its event loop on the current runtime.
    pub fn build(self) -> SubscriptionManager {
        let (backend, events) = match self.backend {
            Some(pair) => pair,
            None => {
                let (backend, events) = NotifyBackend::channel(self.channel_capacity);
                (Arc::new(backend) as Arc<dyn WatchBackend>, events)
            }
        };
        let broadcaster = self
            .broadcaster
            .unwrap_or_else(|| Arc::new(NotificationBroadcaster::new(100)));

        let state = Arc::new(Mutex::new(State {
            table: SubscriptionTable::new(),
            debouncer: Debouncer::new(self.debounce_ms),
            closed: false,
            refresh: None,
        }));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(SubscriptionManager::run(
            state.clone(),
            broadcaster,
            events,
            shutdown.clone(),
        ));

        SubscriptionManager {
            state,
            backend,
            catalog: self.catalog.unwrap_or_default(),
            scheme: self.scheme,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Scanner;
    use crate::watcher::backend::testing::MemoryBackend;
    use notify::EventKind;
    use notify::event::{DataChange, ModifyKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        catalog: CatalogHandle,
        backend: Arc<MemoryBackend>,
        tx: mpsc::Sender<RawChange>,
        events: broadcast::Receiver<CatalogEvent>,
        manager: SubscriptionManager,
    }

    fn fixture(debounce_ms: u64) -> Fixture {
        let dir = TempDir::new().unwrap();
        for name in ["alpha", "beta"] {
            let skill = dir.path().join(name);
            fs::create_dir_all(skill.join("refs")).unwrap();
            fs::write(
                skill.join("SKILL.md"),
                format!("---\nname: {name}\ndescription: d\n---\n"),
            )
            .unwrap();
            fs::write(skill.join("refs/r.md"), "r").unwrap();
        }
        let scanned = Scanner::default().scan(dir.path());
        let root = scanned.root().to_path_buf();
        let catalog = CatalogHandle::new(scanned);

        let backend = MemoryBackend::new();
        let (tx, rx) = mpsc::channel(64);
        let broadcaster = Arc::new(NotificationBroadcaster::new(64));
        let events = broadcaster.subscribe();

        let manager = SubscriptionManager::builder()
            .catalog(catalog.clone())
            .broadcaster(broadcaster)
            .backend(backend.clone(), rx)
            .debounce_ms(debounce_ms)
            .build();

        Fixture {
            _dir: dir,
            root,
            catalog,
            backend,
            tx,
            events,
            manager,
        }
    }

    fn modified(watched: &Path, path: &Path) -> RawChange {
        RawChange {
            watched: watched.to_path_buf(),
            kind: EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            paths: vec![path.to_path_buf()],
        }
    }

    async fn next_update(events: &mut broadcast::Receiver<CatalogEvent>) -> Option<String> {
        match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Ok(CatalogEvent::ResourceUpdated { uri })) => Some(uri),
            _ => None,
        }
    }

    async fn no_update_within(events: &mut broadcast::Receiver<CatalogEvent>, ms: u64) -> bool {
        tokio::time::timeout(Duration::from_millis(ms), events.recv())
            .await
            .is_err()
    }

    #[tokio::test]
    async fn test_subscribe_opens_one_handle_per_path() {
        let f = fixture(20);
        let alpha = f.root.join("alpha/SKILL.md");

        f.manager.subscribe("skill://index").unwrap();
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();

        assert_eq!(f.manager.handle_count(), 2);
        assert_eq!(f.backend.open_count(&alpha), 1);
        assert_eq!(
            f.manager.subscribed(),
            vec!["skill://alpha/SKILL.md", "skill://index"]
        );
    }

    #[tokio::test]
    async fn test_unknown_identifier_subscribes_with_no_handles() {
        let f = fixture(20);
        f.manager.subscribe("skill://ghost/SKILL.md").unwrap();
        f.manager.subscribe("nonsense").unwrap();
        assert!(f.manager.is_subscribed("skill://ghost/SKILL.md"));
        assert_eq!(f.manager.handle_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_unshared_handles() {
        let f = fixture(20);
        let alpha = f.root.join("alpha/SKILL.md");
        f.manager.subscribe("skill://index").unwrap();
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();

        f.manager.unsubscribe("skill://index");
        assert_eq!(f.manager.watched_paths(), vec![alpha.clone()]);

        f.manager.unsubscribe("skill://alpha/SKILL.md");
        f.manager.unsubscribe("skill://alpha/SKILL.md");
        assert!(f.backend.open_paths().is_empty());
    }

    #[tokio::test]
    async fn test_watch_failure_is_surfaced() {
        let f = fixture(20);
        f.backend.fail_on(&f.root.join("beta/SKILL.md"));

        let result = f.manager.subscribe("skill://index");
        assert!(matches!(result, Err(WatchError::PathWatchFailed { .. })));
        assert!(!f.manager.is_subscribed("skill://index"));
        assert!(f.backend.open_paths().is_empty());
    }

    #[tokio::test]
    async fn test_burst_fires_once_per_identifier() {
        let mut f = fixture(30);
        let alpha = f.root.join("alpha/SKILL.md");
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();
        f.manager.subscribe("skill://index").unwrap();

        for _ in 0..5 {
            f.tx.send(modified(&alpha, &alpha)).await.unwrap();
        }

        let mut fired = vec![
            next_update(&mut f.events).await.unwrap(),
            next_update(&mut f.events).await.unwrap(),
        ];
        fired.sort();
        assert_eq!(fired, vec!["skill://alpha/SKILL.md", "skill://index"]);
        assert!(no_update_within(&mut f.events, 150).await);
    }

    #[tokio::test]
    async fn test_notification_waits_for_quiet_period() {
        let mut f = fixture(100);
        let alpha = f.root.join("alpha/SKILL.md");
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();

        let sent_at = std::time::Instant::now();
        f.tx.send(modified(&alpha, &alpha)).await.unwrap();

        assert_eq!(
            next_update(&mut f.events).await.as_deref(),
            Some("skill://alpha/SKILL.md")
        );
        assert!(sent_at.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_unsubscribe_inside_window_suppresses_notification() {
        let mut f = fixture(80);
        let alpha = f.root.join("alpha/SKILL.md");
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();

        f.tx.send(modified(&alpha, &alpha)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.manager.unsubscribe("skill://alpha/SKILL.md");

        assert!(no_update_within(&mut f.events, 250).await);
    }

    #[tokio::test]
    async fn test_manifest_fires_for_nested_document_change() {
        let mut f = fixture(20);
        let dir = f.root.join("alpha");
        f.manager.subscribe("skill://alpha/_manifest").unwrap();

        f.tx
            .send(modified(&dir, &dir.join("refs/r.md")))
            .await
            .unwrap();
        assert_eq!(
            next_update(&mut f.events).await.as_deref(),
            Some("skill://alpha/_manifest")
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_by_prefix() {
        let f = fixture(20);
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();
        f.manager.subscribe("skill://alpha/_manifest").unwrap();
        f.manager.subscribe("skill://alpha/refs/r.md").unwrap();
        f.manager.subscribe("skill://beta/SKILL.md").unwrap();

        assert_eq!(f.manager.unsubscribe_by_prefix("skill://alpha/"), 3);
        assert_eq!(f.manager.subscribed(), vec!["skill://beta/SKILL.md"]);
        assert_eq!(
            f.backend.open_paths(),
            [f.root.join("beta/SKILL.md")].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn test_retarget_follows_catalog() {
        let f = fixture(20);
        f.manager.subscribe("skill://index").unwrap();
        f.manager.subscribe("skill://beta/SKILL.md").unwrap();
        assert_eq!(f.manager.handle_count(), 2);

        fs::remove_dir_all(f.root.join("beta")).unwrap();
        f.catalog.replace(Scanner::default().scan(&f.root));

        let mut moved = f.manager.retarget();
        moved.sort();
        assert_eq!(moved, vec!["skill://beta/SKILL.md", "skill://index"]);
        assert!(f.manager.is_subscribed("skill://beta/SKILL.md"));
        assert_eq!(f.manager.watched_paths(), vec![f.root.join("alpha/SKILL.md")]);
        assert!(f.manager.retarget().is_empty());
    }

    #[tokio::test]
    async fn test_install_swaps_snapshot_and_releases_owned_identifiers() {
        let f = fixture(20);
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();
        f.manager.subscribe("skill://alpha").unwrap();
        f.manager.subscribe("skill://alpha/refs/r.md").unwrap();
        f.manager.subscribe("skill://index").unwrap();

        fs::remove_dir_all(f.root.join("alpha")).unwrap();
        let released = f
            .manager
            .install(Scanner::default().scan(&f.root), &["alpha".to_string()]);

        assert_eq!(released, vec![("alpha".to_string(), 3)]);
        assert!(!f.catalog.snapshot().contains("alpha"));
        assert_eq!(f.manager.subscribed(), vec!["skill://index"]);

        // Resolves against the new snapshot
        f.manager.subscribe("skill://alpha/_manifest").unwrap();
        assert!(!f.backend.open_paths().contains(&f.root.join("alpha")));
    }

    #[tokio::test]
    async fn test_install_matches_unencoded_names() {
        let f = fixture(20);
        fs::create_dir_all(f.root.join("my skill")).unwrap();
        fs::write(
            f.root.join("my skill/SKILL.md"),
            "---\nname: my skill\ndescription: d\n---\n",
        )
        .unwrap();
        f.catalog.replace(Scanner::default().scan(&f.root));
        f.manager.subscribe("skill://my skill/SKILL.md").unwrap();
        f.manager.subscribe("skill://my%20skill/_manifest").unwrap();
        assert_eq!(f.manager.handle_count(), 2);

        fs::remove_dir_all(f.root.join("my skill")).unwrap();
        let released = f
            .manager
            .install(Scanner::default().scan(&f.root), &["my skill".to_string()]);

        assert_eq!(released, vec![("my skill".to_string(), 2)]);
        assert!(f.manager.subscribed().is_empty());
        assert_eq!(f.manager.handle_count(), 0);
    }

    struct RecordingRefresh {
        catalog: CatalogHandle,
        runs: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl RescanHandler for RecordingRefresh {
        async fn rescan(&self) {
            *self.runs.lock() += 1;
            let root = self.catalog.snapshot().root().to_path_buf();
            self.catalog.replace(Scanner::default().scan(&root));
        }
    }

    #[tokio::test]
    async fn test_refresh_runs_before_update_is_published() {
        let mut f = fixture(20);
        let alpha = f.root.join("alpha/SKILL.md");
        let refresh = Arc::new(RecordingRefresh {
            catalog: f.catalog.clone(),
            runs: Mutex::new(0),
        });
        let handler: Arc<dyn RescanHandler> = refresh.clone();
        f.manager.set_refresh_handler(Arc::downgrade(&handler));
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();

        fs::write(&alpha, "---\nname: alpha\ndescription: fresh\n---\n").unwrap();
        f.tx.send(modified(&alpha, &alpha)).await.unwrap();

        assert_eq!(
            next_update(&mut f.events).await.as_deref(),
            Some("skill://alpha/SKILL.md")
        );
        assert_eq!(*refresh.runs.lock(), 1);
        assert_eq!(f.catalog.snapshot().get("alpha").unwrap().description, "fresh");
    }

    #[tokio::test]
    async fn test_dropped_refresh_handler_is_skipped() {
        let mut f = fixture(20);
        let alpha = f.root.join("alpha/SKILL.md");
        let handler: Arc<dyn RescanHandler> = Arc::new(RecordingRefresh {
            catalog: f.catalog.clone(),
            runs: Mutex::new(0),
        });
        f.manager.set_refresh_handler(Arc::downgrade(&handler));
        drop(handler);
        f.manager.subscribe("skill://alpha/SKILL.md").unwrap();

        f.tx.send(modified(&alpha, &alpha)).await.unwrap();
        assert_eq!(
            next_update(&mut f.events).await.as_deref(),
            Some("skill://alpha/SKILL.md")
        );
    }

    #[tokio::test]
    async fn test_close_releases_everything() {
        let mut f = fixture(50);
        let alpha = f.root.join("alpha/SKILL.md");
        f.manager.subscribe("skill://index").unwrap();
        f.manager.subscribe("skill://alpha/_manifest").unwrap();
        f.tx.send(modified(&alpha, &alpha)).await.unwrap();

        f.manager.close();
        f.manager.close();

        assert!(f.manager.is_closed());
        assert!(f.backend.open_paths().is_empty());
        assert!(f.manager.subscribed().is_empty());
        assert!(matches!(
            f.manager.subscribe("skill://index"),
            Err(WatchError::Closed)
        ));
        assert!(no_update_within(&mut f.events, 150).await);
    }
}
