//! Catalog service: the one type the session layer talks to.
//!
//! Owns the live snapshot, the subscription manager, the reconciler and,
//! when enabled, the structural watcher. Content updates re-run the
//! reconciler before they are published, so manifests and descriptions
//! read after a notification are current. Must be started inside a tokio
//! runtime.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, CatalogHandle, Scanner, SkillSummary};
use crate::config::Settings;
use crate::mcp::notifications::{CatalogEvent, NotificationBroadcaster};
use crate::reconcile::{CatalogReconciler, ReconcileReport};
use crate::resources::render::{self, ResourceDescription};
use crate::resources::{ReadError, ResourceContent, ResourceReader, UriScheme};
use crate::watcher::{RescanHandler, StructuralWatcher, SubscriptionManager, WatchError};

struct StructuralTask {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Live skills catalog with subscriptions and structural reconciliation.
pub struct SkillService {
    settings: Arc<Settings>,
    root: PathBuf,
    scheme: UriScheme,
    catalog: CatalogHandle,
    reader: ResourceReader,
    broadcaster: Arc<NotificationBroadcaster>,
    subscriptions: Arc<SubscriptionManager>,
    reconciler: Arc<CatalogReconciler>,
    structural: Mutex<Option<StructuralTask>>,
}

impl SkillService {
    /// Scan the configured root and start watching.
    ///
    /// Never fails. A missing root gives an empty catalog, and a root that
    /// cannot be watched leaves the catalog static.
    pub fn start(settings: Arc<Settings>) -> Self {
        let root = settings.resolved_skills_dir();
        let scanner = Scanner::from_config(&settings.catalog);
        let scheme = UriScheme::new(&settings.catalog.scheme);

        let catalog = CatalogHandle::new(scanner.scan(&root));
        crate::log_event!(
            "service",
            "started",
            "{} skills from {}",
            catalog.snapshot().len(),
            root.display()
        );

        let broadcaster = Arc::new(NotificationBroadcaster::new(settings.watch.channel_capacity));
        let subscriptions = Arc::new(
            SubscriptionManager::builder()
                .catalog(catalog.clone())
                .scheme(scheme.clone())
                .broadcaster(broadcaster.clone())
                .debounce_ms(settings.watch.debounce_ms)
                .channel_capacity(settings.watch.channel_capacity)
                .build(),
        );
        let reconciler = Arc::new(CatalogReconciler::new(
            root.clone(),
            scanner,
            catalog.clone(),
            subscriptions.clone(),
            broadcaster.clone(),
            scheme.clone(),
        ));

        let refresh: Arc<dyn RescanHandler> = reconciler.clone();
        subscriptions.set_refresh_handler(Arc::downgrade(&refresh));

        let service = Self {
            reader: ResourceReader::new(scheme.clone(), settings.catalog.max_file_size),
            settings,
            root,
            scheme,
            catalog,
            broadcaster,
            subscriptions,
            reconciler,
            structural: Mutex::new(None),
        };

        if service.settings.watch.enabled {
            service.start_structural();
        }
        service
    }

    fn start_structural(&self) {
        let watch = &self.settings.watch;
        let built = StructuralWatcher::builder()
            .root(self.catalog.snapshot().root().to_path_buf())
            .definition_files(self.settings.catalog.definition_files.clone())
            .handler(self.reconciler.clone())
            .debounce_ms(watch.structural_debounce_ms)
            .channel_capacity(watch.channel_capacity)
            .build();

        let shutdown = CancellationToken::new();
        match built.and_then(|watcher| watcher.spawn(shutdown.clone())) {
            Ok(task) => *self.structural.lock() = Some(StructuralTask { shutdown, task }),
            Err(e) => tracing::warn!(
                "[service] not watching {} for new skills: {e}",
                self.root.display()
            ),
        }
    }

    /// Name and description of every skill.
    pub fn list(&self) -> Vec<SkillSummary> {
        self.catalog.snapshot().summaries()
    }

    /// Read one resource against the snapshot current at call time.
    pub fn read(&self, uri: &str) -> Result<ResourceContent, ReadError> {
        self.reader.read(&self.catalog.snapshot(), uri)
    }

    /// Subscribe to change notifications for `uri`.
    pub fn subscribe(&self, uri: &str) -> Result<(), WatchError> {
        self.subscriptions.subscribe(uri)
    }

    pub fn unsubscribe(&self, uri: &str) {
        self.subscriptions.unsubscribe(uri);
    }

    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.is_subscribed(uri)
    }

    /// Resources currently published.
    pub fn resources(&self) -> Vec<ResourceDescription> {
        render::resource_descriptions(&self.catalog.snapshot(), &self.scheme)
    }

    /// Receiver of every catalog event from now on.
    pub fn updates(&self) -> broadcast::Receiver<CatalogEvent> {
        self.broadcaster.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        self.catalog.snapshot()
    }

    pub fn scheme(&self) -> &UriScheme {
        &self.scheme
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Re-scan right away instead of waiting for the structural watcher.
    pub fn reconcile_now(&self) -> ReconcileReport {
        self.reconciler.reconcile()
    }

    pub fn is_watching_structure(&self) -> bool {
        self.structural.lock().is_some()
    }

    /// Stop the structural watcher, then release every subscription.
    /// Idempotent.
    pub fn close(&self) {
        if let Some(structural) = self.structural.lock().take() {
            structural.shutdown.cancel();
            structural.task.abort();
        }
        self.subscriptions.close();
    }
}

impl Drop for SkillService {
    fn drop(&mut self) {
        self.close();
    }
}
