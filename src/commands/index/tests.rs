use std::io::Write;

use serde_json::json;

use crate::model::CorpusEntry;

use super::run::{
    duplicate_entry_ids, entry_embedding_payload, entry_index_payload, load_corpus_file,
};

fn entry(id: &str, reference: &str, text: &str) -> CorpusEntry {
    CorpusEntry {
        id: id.to_string(),
        reference: reference.to_string(),
        text: text.to_string(),
        metadata: None,
    }
}

#[test]
fn load_corpus_file_parses_entries() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"[
            {{"id": "ps-30-5", "reference": "Psalm 30:5", "text": "Joy cometh in the morning."}},
            {{"id": "jn-14-1", "reference": "John 14:1", "text": "Let not your heart be troubled.", "metadata": {{"book": "john"}}}}
        ]"#
    )
    .expect("write corpus json");

    let entries = load_corpus_file(file.path()).expect("parse corpus");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, "ps-30-5");
    assert_eq!(
        entries[1].metadata,
        Some(json!({"book": "john"}))
    );
}

#[test]
fn load_corpus_file_rejects_empty_corpus() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "[]").expect("write empty corpus");

    assert!(load_corpus_file(file.path()).is_err());
}

#[test]
fn duplicate_entry_ids_reports_each_once() {
    let entries = vec![
        entry("a", "Psalm 1:1", "text"),
        entry("b", "Psalm 1:2", "text"),
        entry("a", "Psalm 1:3", "text"),
        entry("a", "Psalm 1:4", "text"),
    ];

    assert_eq!(duplicate_entry_ids(&entries), vec!["a".to_string()]);
}

#[test]
fn embedding_payload_joins_reference_and_text() {
    let payload = entry_embedding_payload(&entry(
        "ps-30-5",
        "Psalm  30:5 ",
        " Joy   cometh in the morning. ",
    ))
    .expect("payload present");

    assert_eq!(payload, "Psalm 30:5\n\nJoy cometh in the morning.");
}

#[test]
fn embedding_payload_skips_textless_entries() {
    assert!(entry_embedding_payload(&entry("x", "Psalm 1:1", "   ")).is_none());
}

#[test]
fn index_payload_merges_metadata_under_reserved_keys() {
    let mut with_metadata = entry("ps-30-5", "Psalm 30:5", "Joy cometh in the morning.");
    with_metadata.metadata = Some(json!({"book": "psalms", "reference": "shadowed"}));

    let payload = entry_index_payload(&with_metadata);

    assert_eq!(payload["book"], json!("psalms"));
    assert_eq!(payload["reference"], json!("Psalm 30:5"));
    assert_eq!(payload["entry_id"], json!("ps-30-5"));
    assert_eq!(payload["text"], json!("Joy cometh in the morning."));
}
