use contentseed_import::ArchiveLimits;
use contentseed_loader::LoaderConfig;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

#[test]
fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = LoaderConfig::load_from(&dir.path().join("loader.toml"));
    assert_eq!(config, LoaderConfig::default());
    assert_eq!(config.default_required_readers, vec!["json".to_string()]);
}

#[test]
fn partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loader.toml");
    fs::write(
        &path,
        r#"
default_required_readers = ["json", "zip"]
excluded_targets = ["^/apps(/.*)?$"]
instance_name = "author-1"

[archive]
max_entries = 10
"#,
    )
    .unwrap();

    let config = LoaderConfig::load_from(&path);
    assert_eq!(config.default_required_readers, vec!["json".to_string(), "zip".to_string()]);
    assert_eq!(config.instance_name, "author-1");
    assert_eq!(config.bookkeeping_root, "/var/contentseed/modules");
    assert_eq!(config.folder_node_type, "nt:folder");
    assert_eq!(
        config.archive,
        ArchiveLimits {
            max_entries: 10,
            ..ArchiveLimits::default()
        }
    );

    let filter = config.target_filter().unwrap();
    assert!(filter.allows("/content"));
    assert!(!filter.allows("/apps/site"));
}

#[test]
fn unparsable_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loader.toml");
    fs::write(&path, "default_required_readers = 42\n[[[").unwrap();
    assert_eq!(LoaderConfig::load_from(&path), LoaderConfig::default());
}
