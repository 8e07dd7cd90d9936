use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::config::BackendSettings;
use crate::providers::{Embedding, OllamaEmbedder, OllamaGenerator, QdrantIndex};

const EMBEDDING_PROBE_TEXT: &str = "status probe";

#[derive(Debug, Serialize)]
struct CapabilityStatus {
    reachable: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    generation_url: String,
    generation_model: String,
    embedding_url: String,
    embedding_model: String,
    embedding_dim: usize,
    index_url: String,
    namespace: String,
    generation: CapabilityStatus,
    embedding: CapabilityStatus,
    index: CapabilityStatus,
}

/// Probes each of the three capability backends and reports what it found.
/// An unreachable backend is reported, not treated as a command failure.
pub(crate) async fn run(args: StatusArgs) -> Result<()> {
    let settings = BackendSettings::resolve(&args.backend);

    let generator = OllamaGenerator::new(&settings);
    let generation = match generator.list_model_count(settings.search_timeout).await {
        Ok(count) => CapabilityStatus {
            reachable: true,
            detail: format!("{count} model(s) installed"),
        },
        Err(err) => CapabilityStatus {
            reachable: false,
            detail: err.to_string(),
        },
    };

    let embedder = OllamaEmbedder::new(&settings);
    let embedding = match embedder
        .embed(
            EMBEDDING_PROBE_TEXT,
            settings.embedding_dim,
            settings.search_timeout,
        )
        .await
    {
        Ok(vector) => CapabilityStatus {
            reachable: true,
            detail: format!("dimension {} confirmed", vector.len()),
        },
        Err(err) => CapabilityStatus {
            reachable: false,
            detail: err.to_string(),
        },
    };

    let index_client = QdrantIndex::new(&settings);
    let index = match index_client.point_count(settings.search_timeout).await {
        Ok(count) => CapabilityStatus {
            reachable: true,
            detail: format!("{count} passage(s) indexed"),
        },
        Err(err) => CapabilityStatus {
            reachable: false,
            detail: err.to_string(),
        },
    };

    for (name, status) in [
        ("generation", &generation),
        ("embedding", &embedding),
        ("index", &index),
    ] {
        if status.reachable {
            info!(capability = name, detail = %status.detail, "capability reachable");
        } else {
            warn!(capability = name, detail = %status.detail, "capability unreachable");
        }
    }

    let report = StatusReport {
        generation_url: settings.generation_url.clone(),
        generation_model: settings.generation_model.clone(),
        embedding_url: settings.embedding_url.clone(),
        embedding_model: settings.embedding_model.clone(),
        embedding_dim: settings.embedding_dim,
        index_url: settings.index_url.clone(),
        namespace: settings.namespace.clone(),
        generation,
        embedding,
        index,
    };

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &report)
            .context("failed to serialize status json output")?;
        writeln!(output)?;
        output.flush()?;
    } else {
        write_text_report(&report)?;
    }

    Ok(())
}

fn write_text_report(report: &StatusReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(
        output,
        "generation\t{}\t{} ({})",
        status_label(&report.generation),
        report.generation_model,
        report.generation.detail
    )?;
    writeln!(
        output,
        "embedding\t{}\t{} dim={} ({})",
        status_label(&report.embedding),
        report.embedding_model,
        report.embedding_dim,
        report.embedding.detail
    )?;
    writeln!(
        output,
        "index\t{}\t{} ({})",
        status_label(&report.index),
        report.namespace,
        report.index.detail
    )?;

    output.flush()?;
    Ok(())
}

fn status_label(status: &CapabilityStatus) -> &'static str {
    if status.reachable { "ok" } else { "unreachable" }
}
