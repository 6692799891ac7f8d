//! Directory scanner building catalog snapshots.
//!
//! Each immediate subdirectory of the root holding a definition file
//! becomes a skill. Files inside the skill's subdirectories, at any depth,
//! become its documents. Problems with one skill or one file are logged and
//! the item left out; a scan as a whole never fails.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use walkdir::WalkDir;

use crate::config::CatalogConfig;

use super::boundary::SkillRoot;
use super::frontmatter::{self, FrontMatterError};
use super::manifest::{self, content_hash};
use super::mime::mime_for;
use super::{Catalog, Skill, SkillDocument};

/// Why a skill directory was left out of the catalog.
#[derive(Error, Debug)]
pub enum ScanSkip {
    #[error("no definition file")]
    NoDefinition,

    #[error("definition file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("resolves outside the skills root")]
    OutsideRoot,

    #[error("definition file is not valid UTF-8")]
    NotUtf8,

    #[error("{0}")]
    FrontMatter(#[from] FrontMatterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scans a skills root into a [`Catalog`].
#[derive(Debug, Clone)]
pub struct Scanner {
    max_file_size: u64,
    definition_files: Vec<String>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::from_config(&CatalogConfig::default())
    }
}

impl Scanner {
    pub fn new(max_file_size: u64, definition_files: Vec<String>) -> Self {
        Self {
            max_file_size,
            definition_files,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.max_file_size, config.definition_files.clone())
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn definition_files(&self) -> &[String] {
        &self.definition_files
    }

    /// Whether `file_name` is a recognized definition file name.
    pub fn is_definition_name(&self, file_name: &str) -> bool {
        self.definition_files.iter().any(|name| name == file_name)
    }

    /// Scan `root` into a fresh snapshot.
    ///
    /// Directories are visited in name order, so when two skills declare the
    /// same name the one in the alphabetically first directory is kept.
    pub fn scan(&self, root: &Path) -> Catalog {
        let skill_root = SkillRoot::new(root);
        let resolved = skill_root.path().to_path_buf();

        let mut entries: Vec<PathBuf> = match fs::read_dir(&resolved) {
            Ok(read_dir) => read_dir
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .collect(),
            Err(e) => {
                tracing::error!(
                    "[scan] cannot read skills directory {}: {e}",
                    resolved.display()
                );
                return Catalog::empty(resolved);
            }
        };
        entries.sort();

        let mut skills: BTreeMap<String, Arc<Skill>> = BTreeMap::new();
        for dir in entries {
            if !dir.is_dir() {
                continue;
            }
            if !skill_root.contains(&dir) {
                tracing::warn!("[scan] skipping {}: {}", dir.display(), ScanSkip::OutsideRoot);
                continue;
            }

            match self.scan_skill(&skill_root, &dir) {
                Ok(skill) => {
                    if let Some(existing) = skills.get(&skill.name) {
                        tracing::warn!(
                            "[scan] duplicate skill name '{}' in {}, keeping {}",
                            skill.name,
                            dir.display(),
                            existing.root_path.display()
                        );
                        continue;
                    }
                    crate::debug_event!(
                        "scan",
                        "found",
                        "{} ({} documents)",
                        skill.name,
                        skill.documents.len()
                    );
                    skills.insert(skill.name.clone(), Arc::new(skill));
                }
                Err(ScanSkip::NoDefinition) => {
                    crate::debug_event!("scan", "no definition file", "{}", dir.display());
                }
                Err(e) => {
                    tracing::warn!("[scan] skipping {}: {e}", dir.display());
                }
            }
        }

        crate::log_event!(
            "scan",
            "complete",
            "{} skills in {}",
            skills.len(),
            resolved.display()
        );
        Catalog::new(resolved, skills)
    }

    fn find_definition(&self, dir: &Path) -> Option<PathBuf> {
        self.definition_files
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn scan_skill(&self, root: &SkillRoot, dir: &Path) -> Result<Skill, ScanSkip> {
        let definition = self.find_definition(dir).ok_or(ScanSkip::NoDefinition)?;
        if !root.contains(&definition) {
            return Err(ScanSkip::OutsideRoot);
        }

        let size = fs::metadata(&definition)?.len();
        if size > self.max_file_size {
            return Err(ScanSkip::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let bytes = fs::read(&definition)?;
        let definition_hash = content_hash(&bytes);
        let content = String::from_utf8(bytes).map_err(|_| ScanSkip::NotUtf8)?;
        let front = frontmatter::parse(&content)?;

        let documents = self.scan_documents(root, dir);
        let definition_name = definition
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let manifest = manifest::render(
            &front.name,
            &definition_name,
            size,
            &definition_hash,
            &documents,
        );

        Ok(Skill {
            name: front.name,
            description: front.description,
            definition_path: definition,
            root_path: dir.to_path_buf(),
            definition_size: size,
            definition_hash,
            extra: front.extra,
            documents,
            manifest,
        })
    }

    /// Files inside the subdirectories of `dir`, sorted by relative path.
    fn scan_documents(&self, root: &SkillRoot, dir: &Path) -> Vec<SkillDocument> {
        let mut documents = Vec::new();

        let walker = WalkDir::new(dir)
            .min_depth(2)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    crate::debug_event!("scan", "walk error", "{e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !root.contains(path) {
                crate::debug_event!("scan", "outside root", "{}", path.display());
                continue;
            }
            let Some(relative_path) = relative_slash_path(dir, path) else {
                continue;
            };

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(_) => continue,
            };
            if size > self.max_file_size {
                crate::debug_event!("scan", "document too large", "{}", path.display());
                continue;
            }

            let Ok(bytes) = fs::read(path) else {
                continue;
            };

            documents.push(SkillDocument {
                relative_path,
                mime_type: mime_for(path).to_string(),
                size,
                hash: content_hash(&bytes),
            });
        }

        documents.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        documents
    }
}

/// `path` relative to `base`, joined with `/`. `None` for non UTF-8 names.
fn relative_slash_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(root: &Path, dir: &str, name: &str, description: &str) {
        let skill_dir = root.join(dir);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(
            skill_dir.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: \"{description}\"\n---\n# {name}\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_scan_single_skill() {
        let dir = TempDir::new().unwrap();
        write_skill(dir.path(), "alpha", "alpha", "d");

        let catalog = Scanner::default().scan(dir.path());
        assert_eq!(catalog.len(), 1);

        let alpha = catalog.get("alpha").unwrap();
        assert_eq!(alpha.description, "d");
        assert!(alpha.documents.is_empty());
        assert!(alpha.definition_path.is_absolute());
        assert!(alpha.definition_hash.starts_with("sha256:"));
    }

    #[test]
    fn test_documents_recurse_into_subdirectories_only() {
        let dir = TempDir::new().unwrap();
        write_skill(dir.path(), "beta", "beta", "b");
        let skill_dir = dir.path().join("beta");
        fs::create_dir_all(skill_dir.join("refs/deep")).unwrap();
        fs::write(skill_dir.join("refs/r.md"), "r").unwrap();
        fs::write(skill_dir.join("refs/deep/d.json"), "{}").unwrap();
        fs::write(skill_dir.join("top-level.txt"), "ignored").unwrap();

        let catalog = Scanner::default().scan(dir.path());
        let beta = catalog.get("beta").unwrap();
        let paths: Vec<_> = beta.documents.iter().map(|d| d.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["refs/deep/d.json", "refs/r.md"]);
        assert_eq!(beta.documents[0].mime_type, "application/json");
    }

    #[test]
    fn test_lowercase_definition_file_is_accepted() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("lower");
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(
            skill_dir.join("skill.md"),
            "---\nname: lower\ndescription: l\n---\n",
        )
        .unwrap();

        let catalog = Scanner::default().scan(dir.path());
        let lower = catalog.get("lower").unwrap();
        assert_eq!(
            lower.definition_path.file_name().unwrap().to_str().unwrap().to_lowercase(),
            "skill.md"
        );
    }

    #[test]
    fn test_malformed_skill_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        write_skill(dir.path(), "good", "good", "g");
        let bad = dir.path().join("bad");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join("SKILL.md"), "no front matter here").unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("loose-file.md"), "not a skill").unwrap();

        let catalog = Scanner::default().scan(dir.path());
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names, vec!["good"]);
    }

    #[test]
    fn test_duplicate_name_keeps_first_directory() {
        let dir = TempDir::new().unwrap();
        write_skill(dir.path(), "a-dir", "same", "first");
        write_skill(dir.path(), "b-dir", "same", "second");

        let catalog = Scanner::default().scan(dir.path());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("same").unwrap().description, "first");
    }

    #[test]
    fn test_size_ceiling_applies_to_definition_and_documents() {
        let dir = TempDir::new().unwrap();
        write_skill(dir.path(), "small", "small", "s");
        fs::create_dir_all(dir.path().join("small/refs")).unwrap();
        fs::write(dir.path().join("small/refs/big.bin"), vec![0u8; 512]).unwrap();
        fs::write(dir.path().join("small/refs/ok.txt"), "ok").unwrap();

        let big = dir.path().join("big");
        fs::create_dir_all(&big).unwrap();
        let mut content = String::from("---\nname: big\ndescription: b\n---\n");
        content.push_str(&"x".repeat(400));
        fs::write(big.join("SKILL.md"), content).unwrap();

        let catalog = Scanner::new(256, vec!["SKILL.md".to_string()]).scan(dir.path());
        assert!(!catalog.contains("big"));
        let small = catalog.get("small").unwrap();
        assert_eq!(small.documents.len(), 1);
        assert_eq!(small.documents[0].relative_path, "refs/ok.txt");
    }

    #[test]
    fn test_missing_root_yields_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let catalog = Scanner::default().scan(&dir.path().join("absent"));
        assert!(catalog.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_document_symlink_outside_root_is_excluded() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();

        let dir = TempDir::new().unwrap();
        write_skill(dir.path(), "linky", "linky", "l");
        fs::create_dir_all(dir.path().join("linky/refs")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("linky/refs/secret.txt"),
        )
        .unwrap();
        fs::write(dir.path().join("linky/refs/inside.md"), "fine").unwrap();

        let catalog = Scanner::default().scan(dir.path());
        let linky = catalog.get("linky").unwrap();
        let paths: Vec<_> = linky.documents.iter().map(|d| d.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["refs/inside.md"]);
    }

    #[test]
    fn test_relative_slash_path() {
        assert_eq!(
            relative_slash_path(Path::new("/a/skill"), Path::new("/a/skill/refs/x.md")),
            Some("refs/x.md".to_string())
        );
        assert_eq!(relative_slash_path(Path::new("/a/skill"), Path::new("/b/x.md")), None);
    }
}
