#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("classroom-backup-src");
    let workspace2 = temp_dir("classroom-backup-dst");
    let out_dir = temp_dir("classroom-backup-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join("classroom.sqlite3"), bytes).expect("write source db");

    let bundle_path = out_dir.join("nested").join("workspace.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(export.entry_count, 2);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(manifest["format"], backup::BUNDLE_FORMAT);
    assert_eq!(manifest["dbSha256"], export.db_sha256.as_str());
    archive
        .by_name("db/classroom.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(import.db_sha256, export.db_sha256);

    let restored = std::fs::read(workspace2.join("classroom.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);
    assert!(!workspace2.join("classroom.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn export_requires_a_workspace_database() {
    let workspace = temp_dir("classroom-backup-empty");
    let out = workspace.join("out.zip");
    let e = backup::export_workspace_bundle(&workspace, &out).expect_err("no database");
    assert!(format!("{e:#}").contains("workspace database not found"));
    let _ = std::fs::remove_dir_all(workspace);
}

fn write_bundle(path: &PathBuf, manifest: serde_json::Value, db: &[u8]) {
    let f = File::create(path).expect("create bundle");
    let mut zip = zip::ZipWriter::new(f);
    let opts = zip::write::FileOptions::default();
    zip.start_file("manifest.json", opts).expect("manifest entry");
    zip.write_all(manifest.to_string().as_bytes())
        .expect("write manifest");
    zip.start_file("db/classroom.sqlite3", opts)
        .expect("db entry");
    zip.write_all(db).expect("write db");
    zip.finish().expect("finish zip");
}

#[test]
fn tampered_or_foreign_bundles_leave_the_workspace_alone() {
    let dir = temp_dir("classroom-backup-bad");
    let workspace = dir.join("ws");
    std::fs::create_dir_all(&workspace).expect("create workspace");
    std::fs::write(workspace.join("classroom.sqlite3"), b"original").expect("write db");

    let tampered = dir.join("tampered.zip");
    write_bundle(
        &tampered,
        serde_json::json!({
            "format": backup::BUNDLE_FORMAT,
            "dbSha256": "00".repeat(32),
        }),
        b"replacement",
    );
    let e = backup::import_workspace_bundle(&tampered, &workspace).expect_err("checksum mismatch");
    assert!(format!("{e:#}").contains("checksum mismatch"));

    let foreign = dir.join("foreign.zip");
    write_bundle(
        &foreign,
        serde_json::json!({ "format": "something-else", "dbSha256": "" }),
        b"replacement",
    );
    let e = backup::import_workspace_bundle(&foreign, &workspace).expect_err("unknown format");
    assert!(format!("{e:#}").contains("unsupported bundle format"));

    let not_zip = dir.join("plain.sqlite3");
    std::fs::write(&not_zip, b"not a zip").expect("write plain file");
    assert!(backup::import_workspace_bundle(&not_zip, &workspace).is_err());

    let kept = std::fs::read(workspace.join("classroom.sqlite3")).expect("read db");
    assert_eq!(kept, b"original");

    let _ = std::fs::remove_dir_all(dir);
}
