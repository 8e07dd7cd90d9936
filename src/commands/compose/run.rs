use std::io::{self, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ComposeArgs;
use crate::config::BackendSettings;
use crate::error::ComposeError;
use crate::model::{CitationSource, ComposeRequest, ReconciledResult};
use crate::providers::{
    Embedding, OllamaEmbedder, OllamaGenerator, QdrantIndex, TextGeneration, VectorIndex,
};

use super::confidence::{self, ConfidenceTier};
use super::evidence::assemble_evidence;
use super::generation;
use super::reconcile;
use super::retrieval;
use super::translator;

/// Everything a compose run learned along the way, alongside the result
/// itself. Feeds both output rendering and the completion log line.
#[derive(Debug)]
pub(super) struct ComposeOutcome {
    pub(super) result: ReconciledResult,
    pub(super) citation_source: CitationSource,
    pub(super) tier: Option<ConfidenceTier>,
    pub(super) translated: bool,
    pub(super) expansion_text: String,
    pub(super) candidate_count: usize,
    pub(super) best_score: Option<f64>,
    pub(super) degraded_reason: Option<String>,
    pub(super) body_repeats_citation: bool,
}

#[derive(Debug, Serialize)]
struct ComposeMetadata {
    voice: String,
    translation_used: bool,
    concept_terms: String,
    top_k: usize,
    candidate_count: usize,
    best_score: Option<f64>,
    confidence_tier: Option<String>,
    citation_source: String,
    retrieval_degraded: bool,
    degraded_reason: Option<String>,
    body_repeats_citation: bool,
    duration_ms: f64,
}

#[derive(Debug, Serialize)]
struct ComposeResponse {
    request: String,
    metadata: ComposeMetadata,
    result: ReconciledResult,
}

pub(crate) async fn run(args: ComposeArgs) -> Result<()> {
    let started = Instant::now();
    let request = ComposeRequest::new(&args.request, args.voice)?;
    let settings = BackendSettings::resolve(&args.backend);

    let generator = OllamaGenerator::new(&settings);
    let embedder = OllamaEmbedder::new(&settings);
    let index = QdrantIndex::new(&settings);

    let outcome = compose(
        &generator,
        &embedder,
        &index,
        &settings,
        &request,
        args.top_k,
        args.temperature,
    )
    .await?;

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(
        voice = request.voice().as_str(),
        translated = outcome.translated,
        candidate_count = outcome.candidate_count,
        best_score = ?outcome.best_score,
        tier = outcome.tier.map(ConfidenceTier::as_str).unwrap_or("none"),
        citation_source = outcome.citation_source.as_str(),
        retrieval_degraded = outcome.degraded_reason.is_some(),
        duration_ms,
        "compose completed"
    );

    let metadata = ComposeMetadata {
        voice: request.voice().as_str().to_string(),
        translation_used: outcome.translated,
        concept_terms: outcome.expansion_text.clone(),
        top_k: args.top_k,
        candidate_count: outcome.candidate_count,
        best_score: outcome.best_score,
        confidence_tier: outcome.tier.map(|tier| tier.as_str().to_string()),
        citation_source: outcome.citation_source.as_str().to_string(),
        retrieval_degraded: outcome.degraded_reason.is_some(),
        degraded_reason: outcome.degraded_reason.clone(),
        body_repeats_citation: outcome.body_repeats_citation,
        duration_ms,
    };

    if args.json {
        write_json_response(request.text(), metadata, outcome.result)
    } else {
        write_text_response(request.text(), &metadata, &outcome.result)
    }
}

/// The full pipeline: translate, embed+search (downgrading on failure),
/// classify, assemble evidence, generate, reconcile. Only generation-class
/// failures escape.
pub(super) async fn compose(
    generator: &impl TextGeneration,
    embedder: &impl Embedding,
    index: &impl VectorIndex,
    settings: &BackendSettings,
    request: &ComposeRequest,
    top_k: usize,
    temperature: Option<f32>,
) -> Result<ComposeOutcome, ComposeError> {
    let expansion = translator::translate(generator, request.text()).await;

    let retrieval =
        retrieval::retrieve_candidates(embedder, index, settings, &expansion.text, top_k).await;

    // Candidates arrive sorted descending; the first score is the best one.
    let best_score = retrieval.candidates.first().map(|candidate| candidate.score);
    let (tier, evidence_block) = match best_score {
        Some(score) => {
            let (tier, instruction) = confidence::classify(score);
            (
                Some(tier),
                assemble_evidence(&retrieval.candidates, instruction),
            )
        }
        None => (None, String::new()),
    };

    let generated = generation::generate(
        generator,
        settings,
        request,
        &expansion.text,
        &evidence_block,
        temperature,
    )
    .await?;

    let (result, citation_source) = reconcile::reconcile(generated, &retrieval.candidates);

    let body_repeats_citation =
        reconcile::body_repeats_citation(&result.body, &result.citation_text);
    if body_repeats_citation {
        warn!(
            citation_label = %result.citation_label,
            "generated body repeats the citation text verbatim"
        );
    }

    Ok(ComposeOutcome {
        result,
        citation_source,
        tier,
        translated: expansion.translated,
        expansion_text: expansion.text,
        candidate_count: retrieval.candidates.len(),
        best_score,
        degraded_reason: retrieval.degraded_reason,
        body_repeats_citation,
    })
}

fn write_json_response(
    request_text: &str,
    metadata: ComposeMetadata,
    result: ReconciledResult,
) -> Result<()> {
    let response = ComposeResponse {
        request: request_text.to_string(),
        metadata,
        result,
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize compose json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(
    request_text: &str,
    metadata: &ComposeMetadata,
    result: &ReconciledResult,
) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Request: {request_text}")?;
    writeln!(
        output,
        "Compose: voice={} translated={} candidates={} tier={} citation_source={} duration_ms={:.3}",
        metadata.voice,
        metadata.translation_used,
        metadata.candidate_count,
        metadata.confidence_tier.as_deref().unwrap_or("none"),
        metadata.citation_source,
        metadata.duration_ms,
    )?;
    if let Some(reason) = &metadata.degraded_reason {
        writeln!(output, "Degraded: {reason}")?;
    }
    writeln!(output)?;
    writeln!(output, "Theme: {}", result.theme)?;
    writeln!(output, "Citation: {}", result.citation_label)?;
    writeln!(output, "\t{}", result.citation_text)?;
    writeln!(output, "Body:")?;
    writeln!(output, "{}", result.body)?;

    output.flush()?;
    Ok(())
}
