//! Reading resources from a catalog snapshot.
//!
//! Definition files and documents are read from disk on every call, with
//! the boundary check and size ceiling applied again; the snapshot only
//! decides which files exist. Aggregates render from the snapshot and
//! manifests come from the scan-time cache.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::catalog::mime::is_text;
use crate::catalog::{Catalog, boundary};

use super::render::{index_json, prompt_xml};
use super::{ResourceUri, UriError, UriScheme};

/// Payload of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBody {
    Text(String),
    Binary(Vec<u8>),
}

/// A resource as read at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceContent {
    /// Identifier exactly as requested.
    pub uri: String,
    pub mime_type: String,
    pub body: ResourceBody,
}

impl ResourceContent {
    fn text(uri: &str, mime_type: &str, text: String) -> Self {
        Self {
            uri: uri.to_string(),
            mime_type: mime_type.to_string(),
            body: ResourceBody::Text(text),
        }
    }

    /// The body as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            ResourceBody::Text(text) => Some(text),
            ResourceBody::Binary(_) => None,
        }
    }
}

/// Why a read produced no content. None of these are fatal.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Resource not found: {uri}")]
    NotFound { uri: String },

    #[error("Access denied: {uri} resolves outside the skills directory")]
    Denied { uri: String },

    #[error("Resource {uri} is {size} bytes, limit is {limit}")]
    TooLarge { uri: String, size: u64, limit: u64 },

    #[error("Failed to read {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: io::Error,
    },
}

/// Serves reads against catalog snapshots.
#[derive(Debug, Clone)]
pub struct ResourceReader {
    scheme: UriScheme,
    max_file_size: u64,
}

impl ResourceReader {
    pub fn new(scheme: UriScheme, max_file_size: u64) -> Self {
        Self {
            scheme,
            max_file_size,
        }
    }

    pub fn scheme(&self) -> &UriScheme {
        &self.scheme
    }

    pub fn read(&self, catalog: &Catalog, uri: &str) -> Result<ResourceContent, ReadError> {
        let parsed = self.scheme.parse(uri).map_err(|e| match e {
            UriError::Traversal(_) => ReadError::Denied {
                uri: uri.to_string(),
            },
            UriError::ForeignScheme { .. } | UriError::Malformed(_) => ReadError::NotFound {
                uri: uri.to_string(),
            },
        })?;
        let not_found = || ReadError::NotFound {
            uri: uri.to_string(),
        };

        match parsed {
            ResourceUri::Index => Ok(ResourceContent::text(
                uri,
                "application/json",
                index_json(catalog, &self.scheme),
            )),
            ResourceUri::PromptXml => Ok(ResourceContent::text(
                uri,
                "application/xml",
                prompt_xml(catalog, &self.scheme),
            )),
            ResourceUri::Content { skill } => {
                let skill = catalog.get(&skill).ok_or_else(not_found)?;
                let bytes = self.read_file(catalog.root(), &skill.definition_path, uri)?;
                Ok(ResourceContent::text(
                    uri,
                    "text/markdown",
                    String::from_utf8_lossy(&bytes).into_owned(),
                ))
            }
            ResourceUri::Manifest { skill } => {
                let skill = catalog.get(&skill).ok_or_else(not_found)?;
                Ok(ResourceContent::text(
                    uri,
                    "application/json",
                    skill.manifest.clone(),
                ))
            }
            ResourceUri::Document { skill, path } => {
                let skill = catalog.get(&skill).ok_or_else(not_found)?;
                let doc = skill.document(&path).ok_or_else(not_found)?;
                let bytes = self.read_file(catalog.root(), &skill.root_path.join(&path), uri)?;

                let body = if is_text(&doc.mime_type) {
                    match String::from_utf8(bytes) {
                        Ok(text) => ResourceBody::Text(text),
                        Err(e) => ResourceBody::Binary(e.into_bytes()),
                    }
                } else {
                    ResourceBody::Binary(bytes)
                };
                Ok(ResourceContent {
                    uri: uri.to_string(),
                    mime_type: doc.mime_type.clone(),
                    body,
                })
            }
        }
    }

    fn read_file(&self, root: &Path, path: &Path, uri: &str) -> Result<Vec<u8>, ReadError> {
        if !boundary::contains(root, path) {
            return Err(ReadError::Denied {
                uri: uri.to_string(),
            });
        }

        let io_error = |source: io::Error| {
            if source.kind() == io::ErrorKind::NotFound {
                ReadError::NotFound {
                    uri: uri.to_string(),
                }
            } else {
                ReadError::Io {
                    uri: uri.to_string(),
                    source,
                }
            }
        };

        let size = fs::metadata(path).map_err(io_error)?.len();
        if size > self.max_file_size {
            return Err(ReadError::TooLarge {
                uri: uri.to_string(),
                size,
                limit: self.max_file_size,
            });
        }
        fs::read(path).map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Scanner;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Catalog) {
        let dir = TempDir::new().unwrap();
        let alpha = dir.path().join("alpha");
        fs::create_dir_all(alpha.join("refs")).unwrap();
        fs::create_dir_all(alpha.join("assets")).unwrap();
        fs::write(alpha.join("SKILL.md"), "---\nname: alpha\ndescription: d\n---\nBody\n").unwrap();
        fs::write(alpha.join("refs/r.md"), "reference").unwrap();
        fs::write(alpha.join("assets/logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
        let catalog = Scanner::default().scan(dir.path());
        (dir, catalog)
    }

    fn reader() -> ResourceReader {
        ResourceReader::new(UriScheme::default(), 1024)
    }

    #[test]
    fn test_read_primary_content_from_disk() {
        let (dir, catalog) = fixture();
        let content = reader().read(&catalog, "skill://alpha/SKILL.md").unwrap();
        assert_eq!(content.mime_type, "text/markdown");
        assert!(content.as_text().unwrap().ends_with("Body\n"));

        // Edits show up without a re-scan
        fs::write(
            dir.path().join("alpha/SKILL.md"),
            "---\nname: alpha\ndescription: d\n---\nEdited\n",
        )
        .unwrap();
        let alias = reader().read(&catalog, "skill://alpha").unwrap();
        assert!(alias.as_text().unwrap().ends_with("Edited\n"));
    }

    #[test]
    fn test_read_documents() {
        let (_dir, catalog) = fixture();
        let text = reader().read(&catalog, "skill://alpha/refs/r.md").unwrap();
        assert_eq!(text.body, ResourceBody::Text("reference".to_string()));

        let binary = reader().read(&catalog, "skill://alpha/assets/logo.png").unwrap();
        assert_eq!(binary.mime_type, "image/png");
        assert!(matches!(binary.body, ResourceBody::Binary(ref b) if b.len() == 4));
    }

    #[test]
    fn test_read_manifest_and_aggregates() {
        let (_dir, catalog) = fixture();
        let manifest = reader().read(&catalog, "skill://alpha/_manifest").unwrap();
        assert_eq!(manifest.as_text().unwrap(), catalog.get("alpha").unwrap().manifest);

        let index = reader().read(&catalog, "skill://index").unwrap();
        assert_eq!(index.mime_type, "application/json");
        let xml = reader().read(&catalog, "skill://prompt-xml").unwrap();
        assert_eq!(xml.mime_type, "application/xml");
    }

    #[test]
    fn test_read_misses() {
        let (_dir, catalog) = fixture();
        for uri in [
            "skill://gamma/SKILL.md",
            "skill://alpha/refs/absent.md",
            "skill://alpha/SKILL.md/extra",
            "https://example.com/x",
        ] {
            assert!(
                matches!(reader().read(&catalog, uri), Err(ReadError::NotFound { .. })),
                "{uri}"
            );
        }
    }

    #[test]
    fn test_traversal_is_denied() {
        let (_dir, catalog) = fixture();
        assert!(matches!(
            reader().read(&catalog, "skill://alpha/../../etc/passwd"),
            Err(ReadError::Denied { .. })
        ));
    }

    #[test]
    fn test_file_grown_past_ceiling_is_rejected() {
        let (dir, catalog) = fixture();
        fs::write(dir.path().join("alpha/refs/r.md"), vec![b'x'; 2048]).unwrap();
        assert!(matches!(
            reader().read(&catalog, "skill://alpha/refs/r.md"),
            Err(ReadError::TooLarge { size: 2048, .. })
        ));
    }

    #[test]
    fn test_deleted_document_is_not_found() {
        let (dir, catalog) = fixture();
        fs::remove_file(dir.path().join("alpha/refs/r.md")).unwrap();
        assert!(matches!(
            reader().read(&catalog, "skill://alpha/refs/r.md"),
            Err(ReadError::NotFound { .. })
        ));
    }
}
