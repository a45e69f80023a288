mod common;

use std::path::PathBuf;

use common::{sha256, write_png};
use imarchive::index::{PathIndex, PathIndexSnapshot, scan_directory};
use imarchive::utils::ImageHash;
use indicatif::ProgressBar;
use rstest::*;
use tempfile::TempDir;

/// root/a.png, root/sub/b.png, root/notes.txt
#[fixture]
fn image_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "a.png", 1);
    write_png(dir.path(), "sub/b.png", 2);
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
    dir
}

fn scan(root: &std::path::Path, recursive: bool, relative: bool) -> Vec<(String, String)> {
    scan_directory(root, recursive, relative, ImageHash::Sha256, &ProgressBar::hidden())
        .unwrap()
        .into_iter()
        .collect()
}

#[rstest]
fn scan_recursive(image_dir: TempDir) {
    let images = scan(image_dir.path(), true, false);
    assert_eq!(images.len(), 2);

    let a = image_dir.path().join("a.png");
    assert!(images.contains(&(sha256(&a), a.to_string_lossy().into_owned())));
}

#[rstest]
fn scan_not_recursive(image_dir: TempDir) {
    let images = scan(image_dir.path(), false, false);
    assert_eq!(images.len(), 1);
    assert!(images[0].1.ends_with("a.png"));
}

#[rstest]
fn scan_relative(image_dir: TempDir) {
    let images = scan(image_dir.path(), true, true);
    let mut paths = images.into_iter().map(|(_, path)| path).collect::<Vec<_>>();
    paths.sort();
    assert_eq!(paths, vec!["a.png".to_string(), PathBuf::from("sub").join("b.png").to_string_lossy().into_owned()]);
}

#[rstest]
fn duplicate_keeps_smallest_path(image_dir: TempDir) {
    std::fs::copy(image_dir.path().join("a.png"), image_dir.path().join("0_copy.png")).unwrap();
    std::fs::copy(image_dir.path().join("a.png"), image_dir.path().join("z_copy.png")).unwrap();

    let images = scan(image_dir.path(), true, true);
    assert_eq!(images.len(), 2);
    let hash = sha256(image_dir.path().join("a.png"));
    assert!(images.contains(&(hash, "0_copy.png".to_string())));
}

#[rstest]
fn scan_single_file(image_dir: TempDir) {
    let file = image_dir.path().join("a.png");
    let images = scan(&file, true, true);
    assert_eq!(images, vec![(sha256(&file), file.to_string_lossy().into_owned())]);

    assert!(scan(&image_dir.path().join("notes.txt"), true, false).is_empty());
}

#[rstest]
fn scan_missing_root() {
    let result = scan_directory("/nonexistent/images", true, false, ImageHash::Sha256, &ProgressBar::hidden());
    assert!(result.is_err());
}

#[rstest]
fn build_persist_and_load(image_dir: TempDir) {
    let out = TempDir::new().unwrap();
    let index = PathIndex::new(out.path().join("index.json"), ImageHash::Sha256);
    assert_eq!(index.load().unwrap(), None);

    let snapshot = index.build_and_persist(image_dir.path(), true, true, &ProgressBar::hidden()).unwrap();
    assert!(snapshot.relative);
    assert_eq!(snapshot.len(), 2);

    let loaded = index.load().unwrap().unwrap();
    assert_eq!(loaded, snapshot);

    let hash = sha256(image_dir.path().join("sub/b.png"));
    let resolved = loaded.resolve(&hash).unwrap();
    assert_eq!(resolved.canonicalize().unwrap(), image_dir.path().join("sub/b.png").canonicalize().unwrap());

    // 不残留临时文件
    let files = std::fs::read_dir(out.path()).unwrap().count();
    assert_eq!(files, 1);
}

#[rstest]
fn rebuild_replaces_snapshot(image_dir: TempDir) {
    let out = TempDir::new().unwrap();
    let index = PathIndex::new(out.path().join("index.json"), ImageHash::Sha256);
    index.build_and_persist(image_dir.path(), true, false, &ProgressBar::hidden()).unwrap();

    std::fs::remove_file(image_dir.path().join("a.png")).unwrap();
    let snapshot = index.build_and_persist(image_dir.path(), true, false, &ProgressBar::hidden()).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot.relative);
    assert_eq!(snapshot.base_path, None);
    assert_eq!(index.load().unwrap().unwrap().len(), 1);
}

#[rstest]
fn load_legacy_file() {
    let out = TempDir::new().unwrap();
    let file = out.path().join("index.json");
    std::fs::write(&file, r#"{"abc123": "/images/a.png", "def456": "/images/b.png"}"#).unwrap();

    let snapshot = PathIndex::new(&file, ImageHash::Sha256).load().unwrap().unwrap();
    assert_eq!(
        snapshot,
        PathIndexSnapshot {
            images: [
                ("abc123".to_string(), "/images/a.png".to_string()),
                ("def456".to_string(), "/images/b.png".to_string()),
            ]
            .into(),
            base_path: None,
            relative: false,
        }
    );
    assert_eq!(snapshot.find_by_prefix("abc").len(), 1);
}
