//! YAML front matter of skill definition files.
//!
//! Only `name`, `description` and the string entries of `metadata` are
//! extracted. Values are type-checked, never coerced: a numeric `name` is
//! rejected, a numeric `metadata` entry is dropped.

use std::collections::BTreeMap;

use serde_yaml::Value;
use thiserror::Error;

/// Fields extracted from a definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter {
    pub name: String,
    pub description: String,
    pub extra: BTreeMap<String, String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrontMatterError {
    #[error("must start with YAML front matter delimited by ---")]
    MissingOpening,

    #[error("front matter is not closed by ---")]
    Unclosed,

    #[error("invalid YAML front matter: {0}")]
    Yaml(String),

    #[error("front matter must be a mapping")]
    NotMapping,

    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("required field '{0}' must be a non-empty string")]
    InvalidField(&'static str),
}

/// Parse the front matter block of a definition file.
pub fn parse(content: &str) -> Result<FrontMatter, FrontMatterError> {
    let (frontmatter, _body) = split_frontmatter(content)?;
    let value: Value =
        serde_yaml::from_str(frontmatter).map_err(|e| FrontMatterError::Yaml(e.to_string()))?;
    if !value.is_mapping() {
        return Err(FrontMatterError::NotMapping);
    }

    let name = required_string(&value, "name")?;
    let description = required_string(&value, "description")?;

    let mut extra = BTreeMap::new();
    if let Some(Value::Mapping(metadata)) = value.get("metadata") {
        for (key, value) in metadata {
            if let (Value::String(key), Value::String(value)) = (key, value) {
                extra.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(FrontMatter {
        name,
        description,
        extra,
    })
}

/// Split `content` into the front matter and the body after it.
fn split_frontmatter(content: &str) -> Result<(&str, &str), FrontMatterError> {
    let trimmed = content.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return Err(FrontMatterError::MissingOpening);
    };

    let close_pos = after_open
        .find("\n---")
        .ok_or(FrontMatterError::Unclosed)?;

    let frontmatter = after_open[..close_pos].trim();
    let body = after_open[close_pos + 4..].trim();
    Ok((frontmatter, body))
}

fn required_string(value: &Value, field: &'static str) -> Result<String, FrontMatterError> {
    match value.get(field) {
        None | Some(Value::Null) => Err(FrontMatterError::MissingField(field)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(FrontMatterError::InvalidField(field)),
    }
}
