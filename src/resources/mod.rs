//! Logical identifiers and resource access.
//!
//! Identifiers have the shape `skill://{name}/{selector}`:
//!
//! ```text
//! skill://index                 JSON index of every skill
//! skill://prompt-xml            <available_skills> block for system prompts
//! skill://{name}/SKILL.md       definition file
//! skill://{name}/_manifest      file manifest
//! skill://{name}/{path}         supplementary document
//! skill://{name}                alias of the definition file
//! ```
//!
//! The selector may be percent-encoded; it is decoded before lookup.

mod reader;
pub mod render;
mod resolver;

use thiserror::Error;

use crate::catalog::boundary::is_safe_relative;

pub use reader::{ReadError, ResourceBody, ResourceContent, ResourceReader};
pub use render::ResourceDescription;
pub use resolver::resolve_watch_paths;

/// Selector of a skill's definition file.
pub const CONTENT_SELECTOR: &str = "SKILL.md";
/// Selector of a skill's manifest.
pub const MANIFEST_SELECTOR: &str = "_manifest";

const INDEX: &str = "index";
const PROMPT_XML: &str = "prompt-xml";

/// A parsed logical identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceUri {
    Index,
    PromptXml,
    Content { skill: String },
    Manifest { skill: String },
    Document { skill: String, path: String },
}

impl ResourceUri {
    /// The skill this identifier belongs to, if any.
    pub fn skill(&self) -> Option<&str> {
        match self {
            ResourceUri::Index | ResourceUri::PromptXml => None,
            ResourceUri::Content { skill }
            | ResourceUri::Manifest { skill }
            | ResourceUri::Document { skill, .. } => Some(skill),
        }
    }

    /// Whether this identifier renders the whole catalog.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, ResourceUri::Index | ResourceUri::PromptXml)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    #[error("not a {scheme}:// identifier")]
    ForeignScheme { scheme: String },

    #[error("malformed identifier: {0}")]
    Malformed(String),

    #[error("path escapes the skill directory: {0}")]
    Traversal(String),
}

/// Parses and formats identifiers for one scheme name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriScheme {
    name: String,
    prefix: String,
}

impl Default for UriScheme {
    fn default() -> Self {
        Self::new("skill")
    }
}

impl UriScheme {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: format!("{name}://"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse(&self, uri: &str) -> Result<ResourceUri, UriError> {
        let rest = uri
            .strip_prefix(&self.prefix)
            .ok_or_else(|| UriError::ForeignScheme {
                scheme: self.name.clone(),
            })?;

        match rest {
            INDEX => return Ok(ResourceUri::Index),
            PROMPT_XML => return Ok(ResourceUri::PromptXml),
            _ => {}
        }

        let (raw_name, raw_selector) = match rest.split_once('/') {
            Some((name, selector)) => (name, selector),
            None => (rest, ""),
        };

        let skill = urlencoding::decode(raw_name)
            .map_err(|_| UriError::Malformed(uri.to_string()))?
            .into_owned();
        if skill.trim().is_empty() {
            return Err(UriError::Malformed(uri.to_string()));
        }

        if raw_selector.is_empty() {
            return Ok(ResourceUri::Content { skill });
        }

        let selector = urlencoding::decode(raw_selector)
            .map_err(|_| UriError::Malformed(uri.to_string()))?;
        match selector.as_ref() {
            CONTENT_SELECTOR => Ok(ResourceUri::Content { skill }),
            MANIFEST_SELECTOR => Ok(ResourceUri::Manifest { skill }),
            path if is_safe_relative(path) => Ok(ResourceUri::Document {
                skill,
                path: path.to_string(),
            }),
            _ => Err(UriError::Traversal(uri.to_string())),
        }
    }

    pub fn format(&self, uri: &ResourceUri) -> String {
        match uri {
            ResourceUri::Index => self.index(),
            ResourceUri::PromptXml => self.prompt_xml(),
            ResourceUri::Content { skill } => self.content(skill),
            ResourceUri::Manifest { skill } => self.manifest(skill),
            ResourceUri::Document { skill, path } => self.document(skill, path),
        }
    }

    pub fn index(&self) -> String {
        format!("{}{INDEX}", self.prefix)
    }

    pub fn prompt_xml(&self) -> String {
        format!("{}{PROMPT_XML}", self.prefix)
    }

    pub fn content(&self, skill: &str) -> String {
        format!("{}{CONTENT_SELECTOR}", self.skill_prefix(skill))
    }

    pub fn manifest(&self, skill: &str) -> String {
        format!("{}{MANIFEST_SELECTOR}", self.skill_prefix(skill))
    }

    pub fn document(&self, skill: &str, path: &str) -> String {
        let encoded: Vec<_> = path.split('/').map(urlencoding::encode).collect();
        format!("{}{}", self.skill_prefix(skill), encoded.join("/"))
    }

    /// Short form `skill://{name}`, an alias of the definition file.
    pub fn alias(&self, skill: &str) -> String {
        format!("{}{}", self.prefix, urlencoding::encode(skill))
    }

    /// Prefix shared by every identifier of one skill, `skill://{name}/`.
    pub fn skill_prefix(&self, skill: &str) -> String {
        format!("{}/", self.alias(skill))
    }

    /// Template advertised for documents.
    pub fn document_template(&self) -> String {
        format!("{}{{name}}/{{+path}}", self.prefix)
    }
}
