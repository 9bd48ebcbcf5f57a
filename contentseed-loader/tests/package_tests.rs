use chrono::{TimeZone, Utc};
use contentseed_loader::{
    ContentLoader, ContentModule, LoaderConfig, LoaderError, ModuleEventKind, ModulePackage,
    ModulePackageBuilder, ModuleState,
};
use contentseed_store::{ContentSession, MemoryRepository};
use contentseed_types::{CONTENT_HEADER, LAST_MODIFIED_HEADER, ModuleId, PropertyValue};
use pretty_assertions::assert_eq;
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn sample() -> ModulePackageBuilder {
    ModulePackageBuilder::new(ModuleId::parse("org.example.site").unwrap())
        .content("SLING-INF/content;path:=/content")
        .header("Bundle-Version", "1.2.0")
        .last_modified(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        .file("SLING-INF/content/home.json", r#"{ "title": "Home" }"#)
        .file("SLING-INF/content/assets/logo.svg", "<svg/>")
        .file("/README.md", "readme")
}

#[test]
fn package_survives_zip_round_trip() {
    let bytes = sample().to_bytes().unwrap();
    let package = ModulePackage::open(Cursor::new(bytes)).unwrap();

    assert_eq!(package.id().as_str(), "org.example.site");
    assert_eq!(package.header(CONTENT_HEADER), Some("SLING-INF/content;path:=/content"));
    assert_eq!(package.header("Bundle-Version"), Some("1.2.0"));
    assert_eq!(package.last_modified(), Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()));
    assert_eq!(package.entry("SLING-INF/content/home.json"), Some(&br#"{ "title": "Home" }"#[..]));
    assert_eq!(package.entry("README.md"), Some(&b"readme"[..]));
    assert_eq!(package.manifest(), sample().build().manifest());
}

#[test]
fn directory_listing_shows_direct_children() {
    let package = sample().build();

    assert_eq!(
        package.entry_paths("").unwrap(),
        vec!["README.md".to_string(), "SLING-INF/".to_string()]
    );
    assert_eq!(
        package.entry_paths("SLING-INF/content").unwrap(),
        vec![
            "SLING-INF/content/assets/".to_string(),
            "SLING-INF/content/home.json".to_string(),
        ]
    );
    assert_eq!(package.entry_paths("SLING-INF/missing"), None);
    assert_eq!(package.entry("SLING-INF/content"), None);
}

#[test]
fn archive_without_manifest_is_rejected() {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("content/page.json", SimpleFileOptions::default()).unwrap();
    writer.write_all(b"{}").unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let result = ModulePackage::open(Cursor::new(bytes));
    assert!(matches!(result, Err(LoaderError::Package(ref m)) if m.contains("manifest.toml")));
}

#[test]
fn garbage_is_not_a_package() {
    let result = ModulePackage::open(Cursor::new(b"not a zip".to_vec()));
    assert!(matches!(result, Err(LoaderError::Package(_))));
}

#[test]
fn header_timestamp_lowers_last_modified() {
    let repo = MemoryRepository::new();
    let config = LoaderConfig {
        instance_name: "test-instance".to_string(),
        ..LoaderConfig::default()
    };
    let loader = ContentLoader::new(Arc::new(repo.clone()), config).unwrap();

    // 2001-09-09T01:46:40Z
    let package = sample().header(LAST_MODIFIED_HEADER, "1000000000000").build();
    let bytes = ModulePackageBuilder::new(package.id().clone())
        .content("SLING-INF/content;path:=/content")
        .header(LAST_MODIFIED_HEADER, "1000000000000")
        .file("SLING-INF/content/home.json", r#"{ "title": "Home" }"#)
        .to_bytes()
        .unwrap();
    let opened: Arc<dyn ContentModule> = Arc::new(ModulePackage::open(Cursor::new(bytes)).unwrap());

    assert_eq!(loader.on_module_event(opened, ModuleEventKind::Installed), ModuleState::Loaded);
    let s = repo.open(None).unwrap();
    assert_eq!(s.property("/content/home", "title").unwrap(), Some(PropertyValue::from("Home")));

    // Reinstalling the same module is a no-op: neither timestamp is newer
    // than the recorded load.
    let again: Arc<dyn ContentModule> = Arc::new(package);
    assert_eq!(loader.on_module_event(again, ModuleEventKind::Installed), ModuleState::Loaded);
    assert!(!s.node_exists("/content/assets").unwrap());
}
