//! Aggregate views and resource descriptions derived from a snapshot.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::Catalog;

use super::UriScheme;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry<'a> {
    name: &'a str,
    description: &'a str,
    uri: String,
    manifest_uri: String,
    document_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a BTreeMap<String, String>>,
}

/// JSON array describing every skill, in catalog order.
pub fn index_json(catalog: &Catalog, scheme: &UriScheme) -> String {
    let entries: Vec<_> = catalog
        .skills()
        .map(|skill| IndexEntry {
            name: &skill.name,
            description: &skill.description,
            uri: scheme.content(&skill.name),
            manifest_uri: scheme.manifest(&skill.name),
            document_count: skill.documents.len(),
            metadata: (!skill.extra.is_empty()).then_some(&skill.extra),
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// `<available_skills>` block for injection into a system prompt.
pub fn prompt_xml(catalog: &Catalog, scheme: &UriScheme) -> String {
    let mut lines = vec!["<available_skills>".to_string()];
    for skill in catalog.skills() {
        lines.push("  <skill>".to_string());
        lines.push(format!("    <name>{}</name>", escape_xml(&skill.name)));
        lines.push(format!(
            "    <description>{}</description>",
            escape_xml(&skill.description)
        ));
        lines.push(format!("    <uri>{}</uri>", escape_xml(&scheme.alias(&skill.name))));
        lines.push("  </skill>".to_string());
    }
    lines.push("</available_skills>".to_string());
    lines.join("\n")
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// A resource as published to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescription {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Every resource a snapshot publishes: the two aggregates, then each
/// skill's definition, manifest and documents.
pub fn resource_descriptions(catalog: &Catalog, scheme: &UriScheme) -> Vec<ResourceDescription> {
    let mut out = vec![
        ResourceDescription {
            uri: scheme.index(),
            name: "Skills index".to_string(),
            description: format!("JSON index of {} available skills", catalog.len()),
            mime_type: "application/json".to_string(),
            size: None,
        },
        ResourceDescription {
            uri: scheme.prompt_xml(),
            name: "Skills prompt XML".to_string(),
            description: "<available_skills> block for system prompts".to_string(),
            mime_type: "application/xml".to_string(),
            size: None,
        },
    ];

    for skill in catalog.skills() {
        out.push(ResourceDescription {
            uri: scheme.content(&skill.name),
            name: skill.name.clone(),
            description: skill.description.clone(),
            mime_type: "text/markdown".to_string(),
            size: Some(skill.definition_size),
        });
        out.push(ResourceDescription {
            uri: scheme.manifest(&skill.name),
            name: format!("{} manifest", skill.name),
            description: format!("Files of skill '{}' with sizes and hashes", skill.name),
            mime_type: "application/json".to_string(),
            size: Some(skill.manifest.len() as u64),
        });
        for doc in &skill.documents {
            out.push(ResourceDescription {
                uri: scheme.document(&skill.name, &doc.relative_path),
                name: format!("{}/{}", skill.name, doc.relative_path),
                description: format!("Document of skill '{}'", skill.name),
                mime_type: doc.mime_type.clone(),
                size: Some(doc.size),
            });
        }
    }

    out
}
