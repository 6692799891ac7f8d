//! Skill catalog: scanning, snapshots and the data model.
//!
//! A [`Catalog`] is an immutable snapshot produced by one scan. The live
//! catalog is a [`CatalogHandle`] whose snapshot is swapped wholesale on
//! every re-scan, so readers holding an `Arc<Catalog>` never see a
//! half-updated view.

pub mod boundary;
pub mod frontmatter;
pub mod manifest;
pub mod mime;
mod scanner;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

pub use boundary::SkillRoot;
pub use scanner::{ScanSkip, Scanner};

/// A supplementary file of a skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillDocument {
    /// Slash separated, relative to the skill directory.
    pub relative_path: String,
    pub mime_type: String,
    pub size: u64,
    /// `sha256:<hex>`
    pub hash: String,
}

/// One discovered skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Absolute path of the definition file.
    pub definition_path: PathBuf,
    /// Absolute path of the skill directory.
    pub root_path: PathBuf,
    pub definition_size: u64,
    pub definition_hash: String,
    /// String entries of the front matter `metadata` map.
    pub extra: BTreeMap<String, String>,
    /// Sorted by relative path.
    pub documents: Vec<SkillDocument>,
    /// Manifest JSON rendered at scan time.
    pub manifest: String,
}

impl Skill {
    pub fn document(&self, relative_path: &str) -> Option<&SkillDocument> {
        self.documents
            .iter()
            .find(|doc| doc.relative_path == relative_path)
    }

    pub fn summary(&self) -> SkillSummary {
        SkillSummary {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Name and description, as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillSummary {
    pub name: String,
    pub description: String,
}

/// Immutable result of one scan, keyed and ordered by skill name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    root: PathBuf,
    skills: BTreeMap<String, Arc<Skill>>,
}

impl Catalog {
    pub fn new(root: PathBuf, skills: BTreeMap<String, Arc<Skill>>) -> Self {
        Self { root, skills }
    }

    /// An empty catalog for `root`.
    pub fn empty(root: PathBuf) -> Self {
        Self {
            root,
            skills: BTreeMap::new(),
        }
    }

    /// Resolved skills root the catalog was scanned from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Skill>> {
        self.skills.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    pub fn skills(&self) -> impl Iterator<Item = &Arc<Skill>> {
        self.skills.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn summaries(&self) -> Vec<SkillSummary> {
        self.skills.values().map(|skill| skill.summary()).collect()
    }
}

/// Shared, swappable pointer to the current catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// The snapshot current at call time.
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    /// Install a new snapshot, returning the one it replaced.
    pub fn replace(&self, catalog: Catalog) -> Arc<Catalog> {
        std::mem::replace(&mut *self.current.write(), Arc::new(catalog))
    }
}
