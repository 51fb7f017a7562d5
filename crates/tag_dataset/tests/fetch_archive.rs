use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::Path;
use tag_dataset::{fetch_dataset, TagDatasetError};
use tar::Builder;

fn stage_archive(save_at: &Path, dataset: &str) {
    let content = tempfile::tempdir().unwrap();
    let data_dir = content.path().join(dataset);
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("hello.txt"), "payload").unwrap();

    let file = File::create(save_at.join(format!("{dataset}.tar.gz"))).unwrap();
    let enc = GzEncoder::new(file, Compression::default());
    let mut tar = Builder::new(enc);
    tar.append_dir_all(dataset, &data_dir).unwrap();
    let enc = tar.into_inner().unwrap();
    enc.finish().unwrap();
}

#[test]
fn fetch_is_idempotent() {
    let save = tempfile::tempdir().unwrap();
    stage_archive(save.path(), "temp_ds");

    let first = fetch_dataset("temp_ds", "http://127.0.0.1:1/unused", save.path()).unwrap();
    assert!(!first.downloaded);
    assert!(first.extracted);
    assert_eq!(first.archive, save.path().join("temp_ds.tar.gz"));
    assert_eq!(first.target_dir, save.path().join("temp_ds"));
    assert_eq!(
        fs::read_to_string(save.path().join("temp_ds/hello.txt")).unwrap(),
        "payload"
    );

    let second = fetch_dataset("temp_ds", "http://127.0.0.1:1/unused", save.path()).unwrap();
    assert!(!second.downloaded);
    assert!(!second.extracted);
}

#[test]
fn missing_archive_with_unreachable_url_is_an_http_error() {
    let save = tempfile::tempdir().unwrap();
    let err = fetch_dataset("nope", "http://127.0.0.1:1", save.path()).unwrap_err();
    assert!(matches!(err, TagDatasetError::Http { .. }));
}
