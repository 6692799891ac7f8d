//! File watching for the live skills catalog.
//!
//! Two watchers share one backend abstraction but nothing else:
//!
//! # Architecture
//!
//! ```text
//!                  WatchBackend (notify, one handle per path)
//!                          |
//!        +-----------------+------------------+
//!        |                                    |
//! SubscriptionManager                  StructuralWatcher
//!   - SubscriptionTable                  - root + unit dirs only
//!     (identifier <-> path,              - one debounce key
//!      shared handles)                   - RescanHandler::rescan
//!   - Debouncer per identifier                |
//!   - CatalogEvent::ResourceUpdated     CatalogReconciler
//! ```
//!
//! Subscriptions only ever watch paths belonging to resources a client
//! asked for. The structural watcher never descends into documents.

mod backend;
mod debouncer;
mod error;
mod path_registry;
mod structural;
mod subscriptions;

pub use backend::{NotifyBackend, RawChange, WatchBackend, WatchHandle, is_noise};
pub use debouncer::Debouncer;
pub use error::WatchError;
pub use path_registry::SubscriptionTable;
pub use structural::{RescanHandler, StructuralFilter, StructuralWatcher, StructuralWatcherBuilder};
pub use subscriptions::{SubscriptionManager, SubscriptionManagerBuilder};

#[cfg(test)]
pub(crate) use backend::testing;
