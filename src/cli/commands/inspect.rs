//! List and Read commands: one scan, no watchers.

use std::io::Write;

use crate::catalog::{Catalog, Scanner};
use crate::config::Settings;
use crate::resources::render::index_json;
use crate::resources::{ResourceBody, ResourceReader, UriScheme};

fn scan(config: &Settings) -> Catalog {
    Scanner::from_config(&config.catalog).scan(&config.resolved_skills_dir())
}

/// Run list command - print every skill.
pub fn run_list(config: &Settings, json: bool) {
    let catalog = scan(config);
    let scheme = UriScheme::new(&config.catalog.scheme);

    if json {
        println!("{}", index_json(&catalog, &scheme));
        return;
    }

    if catalog.is_empty() {
        eprintln!("No skills found in {}", catalog.root().display());
        return;
    }

    let width = catalog.names().map(str::len).max().unwrap_or(0);
    for skill in catalog.skills() {
        println!(
            "{:<width$}  {}  ({} documents)",
            skill.name,
            skill.description,
            skill.documents.len()
        );
    }
}

/// Run read command - print one resource to stdout.
pub fn run_read(config: &Settings, uri: &str) -> anyhow::Result<()> {
    let catalog = scan(config);
    let reader = ResourceReader::new(
        UriScheme::new(&config.catalog.scheme),
        config.catalog.max_file_size,
    );

    let content = reader.read(&catalog, uri)?;
    let mut stdout = std::io::stdout().lock();
    match content.body {
        ResourceBody::Text(text) => writeln!(stdout, "{text}")?,
        ResourceBody::Binary(bytes) => stdout.write_all(&bytes)?,
    }
    Ok(())
}
