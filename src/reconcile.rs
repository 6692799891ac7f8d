//! Catalog reconciliation after structural changes.
//!
//! A fresh scan is diffed against the current snapshot by skill name.
//! The new snapshot is installed and removed skills lose every
//! subscription in their identifier namespace in one step; afterwards the
//! remaining subscriptions are re-resolved so aggregate identifiers follow
//! the new membership.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::catalog::{Catalog, CatalogHandle, Scanner};
use crate::mcp::notifications::{CatalogEvent, NotificationBroadcaster};
use crate::resources::UriScheme;
use crate::watcher::{RescanHandler, SubscriptionManager};

/// What one reconciliation changed, by skill name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Present before and after with different content.
    pub replaced: Vec<String>,
}

impl ReconcileReport {
    /// Compare two snapshots. Names come out sorted.
    pub fn diff(previous: &Catalog, current: &Catalog) -> Self {
        let mut report = Self::default();

        for skill in current.skills() {
            match previous.get(&skill.name) {
                None => report.added.push(skill.name.clone()),
                Some(old) if old != skill => report.replaced.push(skill.name.clone()),
                Some(_) => {}
            }
        }
        report.removed = previous
            .names()
            .filter(|name| !current.contains(name))
            .map(str::to_string)
            .collect();

        report
    }

    pub fn membership_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.membership_changed() && self.replaced.is_empty()
    }
}

/// Re-scans the root and brings the live catalog and subscriptions up to
/// date.
pub struct CatalogReconciler {
    root: PathBuf,
    scanner: Scanner,
    catalog: CatalogHandle,
    subscriptions: Arc<SubscriptionManager>,
    broadcaster: Arc<NotificationBroadcaster>,
    scheme: UriScheme,
    // One reconciliation at a time
    running: Mutex<()>,
}

impl CatalogReconciler {
    pub fn new(
        root: PathBuf,
        scanner: Scanner,
        catalog: CatalogHandle,
        subscriptions: Arc<SubscriptionManager>,
        broadcaster: Arc<NotificationBroadcaster>,
        scheme: UriScheme,
    ) -> Self {
        Self {
            root,
            scanner,
            catalog,
            subscriptions,
            broadcaster,
            scheme,
            running: Mutex::new(()),
        }
    }

    /// Scan, diff and publish. Reads keep seeing the previous snapshot
    /// until the new one is swapped in.
    pub fn reconcile(&self) -> ReconcileReport {
        let _running = self.running.lock();

        let fresh = self.scanner.scan(&self.root);
        let previous = self.catalog.snapshot();
        let report = ReconcileReport::diff(&previous, &fresh);
        if report.is_empty() {
            crate::debug_event!("reconcile", "unchanged", "{} skills", fresh.len());
            return report;
        }

        for (name, released) in self.subscriptions.install(fresh, &report.removed) {
            crate::log_event!(
                "reconcile",
                "removed",
                "{name} ({released} subscriptions released)"
            );
            self.broadcaster.send(CatalogEvent::SkillRemoved { name });
        }

        for name in &report.added {
            crate::log_event!("reconcile", "added", "{name}");
            self.broadcaster.send(CatalogEvent::SkillAdded { name: name.clone() });
        }
        for name in &report.replaced {
            crate::debug_event!("reconcile", "replaced", "{name}");
        }

        self.subscriptions.retarget();

        if report.membership_changed() {
            for aggregate in [self.scheme.index(), self.scheme.prompt_xml()] {
                if self.subscriptions.is_subscribed(&aggregate) {
                    self.broadcaster
                        .send(CatalogEvent::ResourceUpdated { uri: aggregate });
                }
            }
        }
        self.broadcaster.send(CatalogEvent::ListChanged);

        crate::log_event!(
            "reconcile",
            "done",
            "+{} -{} ~{}",
            report.added.len(),
            report.removed.len(),
            report.replaced.len()
        );
        report
    }
}

#[async_trait]
impl RescanHandler for CatalogReconciler {
    async fn rescan(&self) {
        self.reconcile();
    }
}
