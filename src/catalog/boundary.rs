//! Containment checks against the skills root.
//!
//! Every path the catalog reads or registers passes through here first.
//! Paths are compared after symlink resolution, so a link pointing out of
//! the root is rejected even though its own location is inside it.

use std::path::{Component, Path, PathBuf};

/// Resolve a path for containment checks.
///
/// Uses `canonicalize` when the path exists. Otherwise the longest existing
/// ancestor is canonicalized and the remaining components are appended and
/// normalized lexically, so paths that do not exist yet still compare
/// against the real root.
pub fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    let normalized = normalize(&absolute);

    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            rest.push(name.to_os_string());
        }
        existing = parent;
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for name in rest.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
    }

    normalized
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
///
/// `..` never climbs above the filesystem root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Whether `candidate` equals `root` or lies beneath it.
///
/// Both sides are resolved first. The comparison is component-wise, so
/// `/srv/skills-2/x` is not inside `/srv/skills`.
pub fn contains(root: &Path, candidate: &Path) -> bool {
    resolve(candidate).starts_with(resolve(root))
}

/// A skills root with its resolved form cached.
///
/// The scanner checks thousands of paths against the same root, so the
/// root is resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRoot {
    resolved: PathBuf,
}

impl SkillRoot {
    pub fn new(root: &Path) -> Self {
        Self {
            resolved: resolve(root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.resolved
    }

    /// Whether `candidate` resolves to this root or something beneath it.
    pub fn contains(&self, candidate: &Path) -> bool {
        resolve(candidate).starts_with(&self.resolved)
    }
}

/// Whether a relative path contains only normal components.
///
/// Rejects `..`, absolute paths, prefixes, backslashes and NUL bytes.
pub fn is_safe_relative(relative: &str) -> bool {
    if relative.is_empty() || relative.contains('\\') || relative.contains('\0') {
        return false;
    }
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
