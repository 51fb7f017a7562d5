use std::fs;
use std::path::Path;
use tag_dataset::{encode_from_index_files, encode_from_saved_map, LabelLayout, TagDatasetError};

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn encode_from_pattern_matched_files() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "multi1.json",
        r#"[{"label": ["f1", "f2"]}, {"label": ["f3"]}]"#,
    );
    write(
        dir.path(),
        "multi2.json",
        r#"[{"label": ["f4", "f4e"]}, {"label": ["f5", "f8"]}]"#,
    );
    write(dir.path(), "notes.txt", "not an index");

    let (itol, ltoi) = encode_from_index_files(
        dir.path(),
        "label",
        None,
        "json",
        "multi[0-9].json",
        &LabelLayout::Array,
    )
    .unwrap();

    assert_eq!(itol.len(), 7);
    assert_eq!(itol[&0], "f1");
    assert_eq!(itol[&3], "f4");
    assert_eq!(itol[&4], "f4e");
    assert_eq!(itol[&6], "f8");
    assert_eq!(ltoi["f8"], 6);
    for (i, label) in &itol {
        assert_eq!(ltoi[label], *i);
    }
}

#[test]
fn explicit_file_list_with_delimited_labels() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "sample.json",
        r#"[{"label": "f1;f2"}, {"label": "f2e;f3"}]"#,
    );
    write(dir.path(), "sample3.json", r#"[{"label": "f4 ; f1"}]"#);

    let (itol, ltoi) = encode_from_index_files(
        dir.path(),
        "label",
        Some(&["sample.json", "sample3.json"]),
        "json",
        ".*json",
        &LabelLayout::Delimited {
            separator: ";".to_string(),
        },
    )
    .unwrap();

    let labels: Vec<&str> = itol.values().map(String::as_str).collect();
    assert_eq!(labels, vec!["f1", "f2", "f2e", "f3", "f4"]);
    assert_eq!(ltoi["f4"], 4);
}

#[test]
fn single_label_column() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "sample.json",
        r#"[{"label": "f1"}, {"label": "f2"}, {"label": "f2e"}, {"label": "f2"}]"#,
    );

    let (itol, _) = encode_from_index_files(
        dir.path(),
        "label",
        Some(&["sample.json"]),
        "json",
        ".*json",
        &LabelLayout::Single,
    )
    .unwrap();

    let labels: Vec<&str> = itol.values().map(String::as_str).collect();
    assert_eq!(labels, vec!["f1", "f2", "f2e"]);
}

#[test]
fn saved_map_encodes_keys_or_values() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "elements.json",
        r#"{"Ac": "actinium", "H": "hydrogen"}"#,
    );
    let path = dir.path().join("elements.json");

    let (itol, ltoi) = encode_from_saved_map(&path, true).unwrap();
    assert_eq!(itol[&0], "Ac");
    assert_eq!(ltoi["Ac"], 0);

    let (itol, ltoi) = encode_from_saved_map(&path, false).unwrap();
    assert_eq!(itol[&0], "actinium");
    assert_eq!(itol[&1], "hydrogen");
    assert_eq!(ltoi["actinium"], 0);
}

#[test]
fn saved_map_failures_are_reported() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("absent.json");
    assert!(matches!(
        encode_from_saved_map(&missing, true),
        Err(TagDatasetError::Io { .. })
    ));

    write(dir.path(), "broken.json", "{not json");
    assert!(matches!(
        encode_from_saved_map(&dir.path().join("broken.json"), true),
        Err(TagDatasetError::Json { .. })
    ));
}
