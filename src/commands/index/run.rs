use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::cli::IndexArgs;
use crate::config::BackendSettings;
use crate::model::CorpusEntry;
use crate::providers::{Embedding, OllamaEmbedder, QdrantIndex, UpsertPoint, VectorIndex};

const INDEX_RUN_MANIFEST_NAME: &str = "corpus_index_run.json";

#[derive(Debug, Serialize)]
struct IndexRunManifest {
    manifest_version: u32,
    run_id: String,
    generated_at: String,
    corpus_path: String,
    namespace: String,
    embedding_model: String,
    embedding_dim: usize,
    entry_count: usize,
    indexed_entries: usize,
    skipped_empty_entries: usize,
    batch_size: usize,
    duration_ms: u128,
    status: String,
    warnings: Vec<String>,
}

/// Offline corpus seeding: embeds every corpus entry and upserts it into the
/// index namespace. Runs out-of-band; the compose pipeline itself never
/// writes to the index.
pub(crate) async fn run(args: IndexArgs) -> Result<()> {
    let batch_size = args.batch_size.max(1);
    let settings = BackendSettings::resolve(&args.backend);

    let entries = load_corpus_file(&args.corpus_path)?;
    let manifest_dir = args.cache_root.join("manifests");
    fs::create_dir_all(&manifest_dir)
        .with_context(|| format!("failed to create directory: {}", manifest_dir.display()))?;

    let mut warnings = Vec::<String>::new();
    for duplicate in duplicate_entry_ids(&entries) {
        warnings.push(format!("duplicate corpus entry id '{duplicate}'"));
    }

    let embedder = OllamaEmbedder::new(&settings);
    let index = QdrantIndex::new(&settings);

    let started = Instant::now();
    let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let run_id = format!("index-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));

    let mut indexed_entries = 0usize;
    let mut skipped_empty_entries = 0usize;
    let mut pending = Vec::<UpsertPoint>::new();

    for entry in &entries {
        let Some(payload_text) = entry_embedding_payload(entry) else {
            skipped_empty_entries += 1;
            continue;
        };

        let vector = embedder
            .embed(&payload_text, settings.embedding_dim, settings.search_timeout)
            .await
            .with_context(|| format!("failed to embed corpus entry '{}'", entry.id))?;

        pending.push(UpsertPoint {
            id: entry.id.clone(),
            vector,
            payload: entry_index_payload(entry),
        });

        if pending.len() >= batch_size {
            indexed_entries += flush_batch(&index, &settings, &mut pending).await?;
            info!(
                namespace = %settings.namespace,
                indexed_entries,
                entry_count = entries.len(),
                "index batch committed"
            );
        }
    }

    if !pending.is_empty() {
        indexed_entries += flush_batch(&index, &settings, &mut pending).await?;
    }

    if skipped_empty_entries > 0 {
        warnings.push(format!(
            "{skipped_empty_entries} corpus entr(ies) had no text to embed"
        ));
    }

    let duration_ms = started.elapsed().as_millis();
    let manifest = IndexRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        generated_at: started_at,
        corpus_path: args.corpus_path.display().to_string(),
        namespace: settings.namespace.clone(),
        embedding_model: settings.embedding_model.clone(),
        embedding_dim: settings.embedding_dim,
        entry_count: entries.len(),
        indexed_entries,
        skipped_empty_entries,
        batch_size,
        duration_ms,
        status: "completed".to_string(),
        warnings: warnings.clone(),
    };
    let manifest_path = manifest_dir.join(INDEX_RUN_MANIFEST_NAME);
    let manifest_json = serde_json::to_vec_pretty(&manifest)
        .with_context(|| format!("failed to serialize manifest: {}", manifest_path.display()))?;
    fs::write(&manifest_path, manifest_json)
        .with_context(|| format!("failed to write manifest: {}", manifest_path.display()))?;

    info!(
        run_id = %run_id,
        namespace = %settings.namespace,
        entry_count = entries.len(),
        indexed_entries,
        skipped_empty_entries,
        warning_count = warnings.len(),
        duration_ms,
        "corpus index run completed"
    );

    Ok(())
}

pub(super) fn load_corpus_file(path: &Path) -> Result<Vec<CorpusEntry>> {
    let raw = fs::read(path)
        .with_context(|| format!("failed to read corpus file: {}", path.display()))?;
    let entries: Vec<CorpusEntry> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse corpus file: {}", path.display()))?;

    if entries.is_empty() {
        bail!("corpus file contains no entries: {}", path.display());
    }

    Ok(entries)
}

pub(super) fn duplicate_entry_ids(entries: &[CorpusEntry]) -> Vec<String> {
    let mut seen = HashSet::<&str>::new();
    let mut duplicates = Vec::<String>::new();
    for entry in entries {
        if !seen.insert(entry.id.as_str()) && !duplicates.contains(&entry.id) {
            duplicates.push(entry.id.clone());
        }
    }
    duplicates
}

/// What actually gets embedded: the reference locator plus the passage text,
/// whitespace-normalized. Entries with no usable text are skipped.
pub(super) fn entry_embedding_payload(entry: &CorpusEntry) -> Option<String> {
    let reference = normalize_whitespace(&entry.reference);
    let text = normalize_whitespace(&entry.text);
    if text.is_empty() {
        return None;
    }

    if reference.is_empty() {
        Some(text)
    } else {
        Some(format!("{reference}\n\n{text}"))
    }
}

/// Payload stored with each point. Extra metadata object fields ride along;
/// the reserved keys always win.
pub(super) fn entry_index_payload(entry: &CorpusEntry) -> serde_json::Value {
    let mut payload = serde_json::Map::new();
    if let Some(serde_json::Value::Object(metadata)) = &entry.metadata {
        for (key, value) in metadata {
            payload.insert(key.clone(), value.clone());
        }
    }

    payload.insert("entry_id".to_string(), json!(entry.id));
    payload.insert("reference".to_string(), json!(entry.reference));
    payload.insert("text".to_string(), json!(entry.text));
    serde_json::Value::Object(payload)
}

async fn flush_batch(
    index: &QdrantIndex,
    settings: &BackendSettings,
    pending: &mut Vec<UpsertPoint>,
) -> Result<usize> {
    let count = pending.len();
    index
        .upsert(pending, settings.search_timeout)
        .await
        .context("failed to upsert batch into the index")?;
    pending.clear();
    Ok(count)
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}
