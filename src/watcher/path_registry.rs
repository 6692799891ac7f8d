//! Subscription table: identifiers, the paths they depend on, and the
//! single watch handle each path shares between its dependents.
//!
//! Both directions are kept in one structure and updated together, so a
//! path has a handle exactly when some identifier depends on it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use super::WatchError;
use super::backend::WatchHandle;

struct WatchedPath {
    dependents: HashSet<String>,
    handle: Box<dyn WatchHandle>,
}

/// Identifier to path dependencies with shared, reference counted handles.
#[derive(Default)]
pub struct SubscriptionTable {
    /// identifier -> paths it depends on (possibly none)
    by_uri: HashMap<String, Vec<PathBuf>>,
    /// path -> dependents and the handle watching it
    by_path: HashMap<PathBuf, WatchedPath>,
}

impl fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTable")
            .field("subscriptions", &self.by_uri.len())
            .field("handles", &self.by_path.len())
            .finish()
    }
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.by_uri.contains_key(uri)
    }

    /// Record `uri` as depending on `paths`.
    ///
    /// Opens a handle through `open` for every path not yet watched. If any
    /// open fails, handles opened by this call are closed and the table is
    /// left unchanged.
    pub fn attach<F>(&mut self, uri: &str, paths: Vec<PathBuf>, open: F) -> Result<(), WatchError>
    where
        F: FnMut(&Path) -> Result<Box<dyn WatchHandle>, WatchError>,
    {
        // Re-attaching an identifier drops handles it no longer needs
        self.replace(uri, paths, open)?;
        Ok(())
    }

    /// Point `uri` at a new set of paths, keeping handles of paths in both
    /// sets open. Returns the handles no identifier depends on anymore.
    ///
    /// On error nothing changes and `uri` keeps its previous paths.
    pub fn replace<F>(
        &mut self,
        uri: &str,
        paths: Vec<PathBuf>,
        mut open: F,
    ) -> Result<Vec<Box<dyn WatchHandle>>, WatchError>
    where
        F: FnMut(&Path) -> Result<Box<dyn WatchHandle>, WatchError>,
    {
        let mut unique = Vec::with_capacity(paths.len());
        for path in paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }

        let mut opened: Vec<(PathBuf, Box<dyn WatchHandle>)> = Vec::new();
        for path in &unique {
            if !self.by_path.contains_key(path) {
                // On error `opened` drops here, closing what this call opened
                let handle = open(path)?;
                opened.push((path.clone(), handle));
            }
        }

        for (path, handle) in opened {
            self.by_path.insert(
                path,
                WatchedPath {
                    dependents: HashSet::new(),
                    handle,
                },
            );
        }
        for path in &unique {
            if let Some(watched) = self.by_path.get_mut(path) {
                watched.dependents.insert(uri.to_string());
            }
        }

        let previous = self.by_uri.insert(uri.to_string(), unique).unwrap_or_default();
        let mut released = Vec::new();
        for path in previous {
            let still_used = self
                .by_uri
                .get(uri)
                .is_some_and(|current| current.contains(&path));
            if !still_used {
                released.extend(self.release(uri, &path));
            }
        }
        Ok(released)
    }

    /// Remove `uri`, returning the handles no identifier depends on anymore.
    ///
    /// The caller closes them by dropping, ideally outside any lock.
    pub fn detach(&mut self, uri: &str) -> Vec<Box<dyn WatchHandle>> {
        let Some(paths) = self.by_uri.remove(uri) else {
            return Vec::new();
        };

        paths
            .iter()
            .filter_map(|path| self.release(uri, path))
            .collect()
    }

    /// Drop `uri` from the dependents of `path`, handing back the handle
    /// if that left it unused.
    fn release(&mut self, uri: &str, path: &Path) -> Option<Box<dyn WatchHandle>> {
        let watched = self.by_path.get_mut(path)?;
        watched.dependents.remove(uri);
        if watched.dependents.is_empty() {
            self.by_path.remove(path).map(|watched| watched.handle)
        } else {
            None
        }
    }

    /// Identifiers affected by an event at `path`.
    ///
    /// Directory watches cover everything beneath them, so a watched path
    /// matches when it equals `path` or is one of its ancestors.
    pub fn dependents_of(&self, path: &Path) -> HashSet<String> {
        self.by_path
            .iter()
            .filter(|(watched, _)| path.starts_with(watched))
            .flat_map(|(_, watched)| watched.dependents.iter().cloned())
            .collect()
    }

    /// Dependents of the handle opened for exactly `watched`.
    pub fn dependents_of_handle(&self, watched: &Path) -> impl Iterator<Item = &str> {
        self.by_path
            .get(watched)
            .into_iter()
            .flat_map(|w| w.dependents.iter().map(String::as_str))
    }

    pub fn paths_of(&self, uri: &str) -> Option<&[PathBuf]> {
        self.by_uri.get(uri).map(Vec::as_slice)
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.by_uri.keys().map(String::as_str)
    }

    pub fn watched_paths(&self) -> impl Iterator<Item = &Path> {
        self.by_path.keys().map(PathBuf::as_path)
    }

    pub fn subscription_count(&self) -> usize {
        self.by_uri.len()
    }

    pub fn handle_count(&self) -> usize {
        self.by_path.len()
    }

    /// Empty the table, returning every handle.
    pub fn clear(&mut self) -> Vec<Box<dyn WatchHandle>> {
        self.by_uri.clear();
        self.by_path.drain().map(|(_, watched)| watched.handle).collect()
    }
}
