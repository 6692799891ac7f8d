//! Per-skill file manifest.
//!
//! Rendered once when a skill is scanned and stored on the [`Skill`] as
//! text. Reads serve the cached text, so a manifest reflects the files as
//! they were at the last scan.
//!
//! [`Skill`]: super::Skill

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::SkillDocument;

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    skill: &'a str,
    files: Vec<ManifestFile<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFile<'a> {
    path: &'a str,
    size: u64,
    hash: &'a str,
    mime_type: &'a str,
}

/// `sha256:<hex>` digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// Render the manifest JSON: the definition file first, then documents in order.
pub fn render(
    skill: &str,
    definition_name: &str,
    definition_size: u64,
    definition_hash: &str,
    documents: &[SkillDocument],
) -> String {
    let mut files = Vec::with_capacity(documents.len() + 1);
    files.push(ManifestFile {
        path: definition_name,
        size: definition_size,
        hash: definition_hash,
        mime_type: "text/markdown",
    });
    files.extend(documents.iter().map(|doc| ManifestFile {
        path: &doc.relative_path,
        size: doc.size,
        hash: &doc.hash,
        mime_type: &doc.mime_type,
    }));

    let manifest = Manifest { skill, files };
    // Serializing plain strings and integers cannot fail
    serde_json::to_string_pretty(&manifest).unwrap_or_default()
}
