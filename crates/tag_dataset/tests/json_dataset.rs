use std::fs;
use std::path::Path;
use tag_dataset::{
    BatchConfig, ImageTransform, IndexDatasetConfig, JsonIndexDataset, LabelLoaders, Ltoi,
    TagDatasetError,
};

type B = burn_ndarray::NdArray<f32>;

fn write_images(root: &Path, names: &[&str]) {
    fs::create_dir_all(root.join("images")).unwrap();
    for (i, name) in names.iter().enumerate() {
        let shade = 40 + 60 * i as u8;
        let mut img = image::RgbImage::new(32, 32);
        for p in img.pixels_mut() {
            *p = image::Rgb([shade, shade / 2, 255 - shade]);
        }
        img.save(root.join("images").join(name)).unwrap();
    }
}

fn write_dataset(root: &Path) {
    write_images(root, &["10091.png", "10092.png", "10093.png"]);
    fs::write(
        root.join("index.json"),
        r#"[
            {"file": "10091.png", "elements": ["carbon", "hydrogen", "oxygen"]},
            {"file": "10092.png", "elements": ["hydrogen", "nitrogen"]},
            {"file": "10093.png", "elements": ["carbon", "nitrogen"]}
        ]"#,
    )
    .unwrap();
}

fn base_config(root: &Path) -> IndexDatasetConfig {
    IndexDatasetConfig {
        root: root.to_path_buf(),
        label_column: "elements".to_string(),
        ..Default::default()
    }
}

#[test]
fn derived_label_map_follows_sort_order() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let ds = JsonIndexDataset::new(IndexDatasetConfig {
        derive_labels_from_column: true,
        ..base_config(dir.path())
    })
    .unwrap();

    let map = ds.label_map().unwrap();
    assert_eq!(map["carbon"], 0);
    assert_eq!(map["hydrogen"], 1);
    assert_eq!(map["nitrogen"], 2);
    assert_eq!(map["oxygen"], 3);

    let sample = ds.get(0).unwrap();
    assert_eq!(sample.target, vec![1.0, 1.0, 0.0, 1.0]);
    assert_eq!(sample.sample_id, 10091);
    assert_eq!((sample.width, sample.height), (32, 32));
    assert_eq!(sample.image_chw.len(), 3 * 32 * 32);
    assert_eq!(ds.len(), 3);
}

#[test]
fn explicit_label_map_takes_precedence() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let map: Ltoi = [
        ("carbon", 0),
        ("hydrogen", 1),
        ("oxygen", 2),
        ("nitrogen", 3),
        ("gibrish", 4),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let ds = JsonIndexDataset::new(IndexDatasetConfig {
        label_map: Some(map),
        derive_labels_from_column: true,
        ..base_config(dir.path())
    })
    .unwrap();

    let sample = ds.get(0).unwrap();
    assert_eq!(sample.target, vec![1.0, 1.0, 1.0, 0.0, 0.0]);
    assert_eq!(sample.sample_id, 10091);
}

#[test]
fn missing_label_source_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let err = JsonIndexDataset::new(base_config(dir.path())).unwrap_err();
    assert!(matches!(err, TagDatasetError::MissingLabelSource));
}

#[test]
fn unknown_label_fails_at_access() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let map: Ltoi = [("carbon", 0), ("hydrogen", 1)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let ds = JsonIndexDataset::new(IndexDatasetConfig {
        label_map: Some(map),
        ..base_config(dir.path())
    })
    .unwrap();

    assert!(matches!(
        ds.get(0),
        Err(TagDatasetError::UnknownLabel { label }) if label == "oxygen"
    ));
}

#[test]
fn bad_file_name_fails_at_access_not_construction() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path(), &["abc.png"]);
    fs::write(
        dir.path().join("index.json"),
        r#"[{"file": "abc.png", "elements": ["carbon"]}]"#,
    )
    .unwrap();

    let ds = JsonIndexDataset::new(IndexDatasetConfig {
        derive_labels_from_column: true,
        ..base_config(dir.path())
    })
    .unwrap();

    assert!(matches!(
        ds.get(0),
        Err(TagDatasetError::BadSampleId { .. })
    ));
}

#[test]
fn transform_resizes_images() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let ds = JsonIndexDataset::new(IndexDatasetConfig {
        derive_labels_from_column: true,
        transform: Some(ImageTransform {
            target_size: (16, 16),
        }),
        ..base_config(dir.path())
    })
    .unwrap();

    let sample = ds.get(0).unwrap();
    assert_eq!((sample.width, sample.height), (16, 16));
    assert_eq!(sample.image_chw.len(), 3 * 16 * 16);
}

#[test]
fn passthrough_labels_keep_numeric_codes() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path(), &["10091.png"]);
    fs::write(
        dir.path().join("index.json"),
        r#"[{"file": "10091.png", "elements": [1, 0, 1]}]"#,
    )
    .unwrap();

    let ds = JsonIndexDataset::new(IndexDatasetConfig {
        one_hot_labels: false,
        ..base_config(dir.path())
    })
    .unwrap();

    let sample = ds.get(0).unwrap();
    assert_eq!(sample.target, vec![1.0, 0.0, 1.0]);
}

#[test]
fn batches_assemble_with_tail_split() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let ds = JsonIndexDataset::new(IndexDatasetConfig {
        derive_labels_from_column: true,
        ..base_config(dir.path())
    })
    .unwrap();

    let loaders = LabelLoaders::from_dataset(
        ds,
        0.34,
        BatchConfig {
            shuffle: false,
            seed: None,
            drop_last: false,
        },
        None,
    );
    assert_eq!(loaders.train_len(), 2);
    assert_eq!(loaders.val_len(), 1);

    let device = Default::default();
    let mut iter = loaders.train_iter();
    let batch = iter.next_batch::<B>(2, &device).unwrap().unwrap();
    assert_eq!(batch.images.dims(), [2, 3, 32, 32]);
    assert_eq!(batch.targets.dims(), [2, 4]);
    let ids = batch.sample_ids.into_data().to_vec::<f32>().unwrap();
    assert_eq!(ids, vec![10091.0, 10092.0]);
    assert!(iter.next_batch::<B>(2, &device).unwrap().is_none());

    let mut val = loaders.val_iter();
    let batch = val.next_batch::<B>(2, &device).unwrap().unwrap();
    assert_eq!(batch.images.dims(), [1, 3, 32, 32]);
    let ids = batch.sample_ids.into_data().to_vec::<f32>().unwrap();
    assert_eq!(ids, vec![10093.0]);
}

#[test]
fn unreadable_samples_are_skipped_with_count() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path(), &["10091.png"]);
    fs::write(
        dir.path().join("index.json"),
        r#"[
            {"file": "10091.png", "elements": ["carbon"]},
            {"file": "99999.png", "elements": ["carbon"]}
        ]"#,
    )
    .unwrap();

    let ds = JsonIndexDataset::new(IndexDatasetConfig {
        derive_labels_from_column: true,
        ..base_config(dir.path())
    })
    .unwrap();

    let loaders = LabelLoaders::from_dataset(
        ds,
        0.0,
        BatchConfig {
            shuffle: false,
            seed: None,
            drop_last: false,
        },
        None,
    );
    let device = Default::default();
    let mut iter = loaders.train_iter();
    let batch = iter.next_batch::<B>(4, &device).unwrap().unwrap();
    assert_eq!(batch.images.dims()[0], 1);
    assert_eq!(iter.skipped_errors(), 1);
}
