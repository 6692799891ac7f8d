//! Maps identifiers to the filesystem paths whose changes affect them.

use std::path::PathBuf;

use crate::catalog::Catalog;
use crate::catalog::boundary;

use super::{ResourceUri, UriScheme};

/// Paths to watch for `uri` against one catalog snapshot.
///
/// Unknown and malformed identifiers resolve to nothing rather than an
/// error, so subscribing to them is a silent no-op. Callers re-resolve
/// after the catalog changes.
pub fn resolve_watch_paths(uri: &str, scheme: &UriScheme, catalog: &Catalog) -> Vec<PathBuf> {
    let Ok(parsed) = scheme.parse(uri) else {
        return Vec::new();
    };

    match parsed {
        ResourceUri::Index | ResourceUri::PromptXml => catalog
            .skills()
            .map(|skill| skill.definition_path.clone())
            .collect(),
        ResourceUri::Content { skill } => catalog
            .get(&skill)
            .map(|skill| vec![skill.definition_path.clone()])
            .unwrap_or_default(),
        // Any change under the skill directory can stale the manifest
        ResourceUri::Manifest { skill } => catalog
            .get(&skill)
            .map(|skill| vec![skill.root_path.clone()])
            .unwrap_or_default(),
        ResourceUri::Document { skill, path } => {
            let Some(skill) = catalog.get(&skill) else {
                return Vec::new();
            };
            if skill.document(&path).is_none() {
                return Vec::new();
            }
            let full = skill.root_path.join(&path);
            if boundary::contains(catalog.root(), &full) {
                vec![full]
            } else {
                Vec::new()
            }
        }
    }
}
