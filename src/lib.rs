//! Live skill catalog served as MCP resources.
//!
//! Skills are directories under a configured root, each holding a
//! `SKILL.md` definition file and any number of supplementary documents.
//! The catalog scans them into an immutable snapshot, exposes them through
//! `skill://` identifiers, and keeps subscribers current as files change.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod logging;
pub mod mcp;
pub mod reconcile;
pub mod resources;
pub mod service;
pub mod watcher;

pub use catalog::{Catalog, CatalogHandle, Scanner, Skill, SkillDocument, SkillSummary};
pub use config::Settings;
pub use mcp::notifications::{CatalogEvent, NotificationBroadcaster};
pub use reconcile::{CatalogReconciler, ReconcileReport};
pub use resources::{ReadError, ResourceBody, ResourceContent, ResourceUri, UriScheme};
pub use service::SkillService;
pub use watcher::{StructuralWatcher, SubscriptionManager, WatchError};
