//! Extension based MIME lookup for skill documents.

use std::path::Path;

/// Fallback for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("md", "text/markdown"),
    ("txt", "text/plain"),
    ("py", "text/x-python"),
    ("js", "text/javascript"),
    ("ts", "text/typescript"),
    ("sh", "text/x-shellscript"),
    ("bash", "text/x-shellscript"),
    ("json", "application/json"),
    ("yaml", "text/yaml"),
    ("yml", "text/yaml"),
    ("toml", "application/toml"),
    ("xml", "application/xml"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("sql", "text/x-sql"),
    ("rs", "text/x-rust"),
    ("csv", "text/csv"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
];

/// MIME type for a path, chosen by its (case-insensitive) extension.
pub fn mime_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return OCTET_STREAM;
    };
    let ext = ext.to_ascii_lowercase();
    MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

/// Whether content of this type is served as UTF-8 text.
pub fn is_text(mime: &str) -> bool {
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/json" | "application/xml" | "application/toml" | "image/svg+xml"
        )
}
