use std::fs;
use std::path::Path;

use skilldeck::catalog::boundary;
use skilldeck::catalog::manifest::content_hash;
use skilldeck::resources::ResourceReader;
use skilldeck::{ReadError, Scanner, SkillSummary, UriScheme};
use tempfile::TempDir;

const ONE_MIB: u64 = 1024 * 1024;

fn write(path: &Path, content: impl AsRef<[u8]>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn definition(name: &str, description: &str) -> String {
    format!("---\nname: {name}\ndescription: \"{description}\"\n---\n# {name}\n")
}

fn reader() -> ResourceReader {
    ResourceReader::new(UriScheme::default(), ONE_MIB)
}

#[test]
fn test_single_skill_listing_and_manifest() {
    let dir = TempDir::new().unwrap();
    let text = definition("alpha", "d");
    write(&dir.path().join("alpha/SKILL.md"), &text);

    let catalog = Scanner::default().scan(dir.path());

    assert_eq!(
        catalog.summaries(),
        vec![SkillSummary {
            name: "alpha".to_string(),
            description: "d".to_string(),
        }]
    );

    let manifest = reader().read(&catalog, "skill://alpha/_manifest").unwrap();
    let manifest: serde_json::Value = serde_json::from_str(manifest.as_text().unwrap()).unwrap();
    let files = manifest["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["path"], "SKILL.md");
    assert_eq!(files[0]["size"], text.len() as u64);
    assert_eq!(files[0]["hash"], content_hash(text.as_bytes()));
}

#[test]
fn test_nested_document_is_discovered() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("beta/SKILL.md"), definition("beta", "b"));
    write(&dir.path().join("beta/refs/r.md"), [b'x'; 50]);

    let catalog = Scanner::default().scan(dir.path());
    let beta = catalog.get("beta").unwrap();

    assert_eq!(beta.documents.len(), 1);
    assert_eq!(beta.documents[0].relative_path, "refs/r.md");
    assert_eq!(beta.documents[0].size, 50);
    assert_eq!(beta.documents[0].mime_type, "text/markdown");
}

#[test]
fn test_oversized_definition_is_skipped() {
    let dir = TempDir::new().unwrap();
    let mut big = definition("gamma", "g");
    big.push_str(&"x".repeat(2 * ONE_MIB as usize));
    write(&dir.path().join("gamma/SKILL.md"), big);
    write(&dir.path().join("alpha/SKILL.md"), definition("alpha", "a"));

    let catalog = Scanner::new(ONE_MIB, vec!["SKILL.md".to_string()]).scan(dir.path());

    assert!(!catalog.contains("gamma"));
    assert!(catalog.contains("alpha"));
}

#[test]
fn test_rescan_of_unchanged_tree_is_equal() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("alpha/SKILL.md"), definition("alpha", "a"));
    write(&dir.path().join("alpha/refs/one.md"), "one");
    write(&dir.path().join("alpha/scripts/run.py"), "print()");
    write(&dir.path().join("beta/skill.md"), definition("beta", "b"));
    write(&dir.path().join("broken/SKILL.md"), "no front matter");
    write(&dir.path().join("loose.md"), "ignored");

    let scanner = Scanner::default();
    let first = scanner.scan(dir.path());
    let second = scanner.scan(dir.path());

    assert_eq!(first, second);
    assert_eq!(first.names().collect::<Vec<_>>(), vec!["alpha", "beta"]);
}

#[test]
fn test_sibling_prefix_is_outside_root() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("root");
    let sibling = dir.path().join("root-sibling/x");
    fs::create_dir_all(&root).unwrap();
    fs::create_dir_all(&sibling).unwrap();

    assert!(boundary::contains(&root, &root));
    assert!(boundary::contains(&root, &root.join("a/b")));
    assert!(!boundary::contains(&root, &sibling));
    assert!(!boundary::contains(&root, &root.join("../root-sibling/x")));
}

#[test]
fn test_traversal_reads_are_denied() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("skills/alpha/SKILL.md"), definition("alpha", "a"));
    write(&dir.path().join("secret.txt"), "secret");

    let catalog = Scanner::default().scan(&dir.path().join("skills"));

    for uri in [
        "skill://alpha/../../secret.txt",
        "skill://alpha/..%2F..%2Fsecret.txt",
    ] {
        assert!(
            matches!(reader().read(&catalog, uri), Err(ReadError::Denied { .. })),
            "{uri} should be denied"
        );
    }
    assert!(matches!(
        reader().read(&catalog, "skill://alpha/secret.txt"),
        Err(ReadError::NotFound { .. })
    ));
}

#[test]
fn test_aggregates_follow_catalog() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("alpha/SKILL.md"), definition("alpha", "uses <tags> & more"));

    let catalog = Scanner::default().scan(dir.path());

    let index = reader().read(&catalog, "skill://index").unwrap();
    assert_eq!(index.mime_type, "application/json");
    let index: serde_json::Value = serde_json::from_str(index.as_text().unwrap()).unwrap();
    assert_eq!(index[0]["manifestUri"], "skill://alpha/_manifest");

    let xml = reader().read(&catalog, "skill://prompt-xml").unwrap();
    let xml = xml.as_text().unwrap();
    assert!(xml.starts_with("<available_skills>"));
    assert!(xml.contains("<description>uses &lt;tags&gt; &amp; more</description>"));
}
