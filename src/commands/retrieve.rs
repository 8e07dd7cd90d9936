use std::io::{self, Write};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::cli::RetrieveArgs;
use crate::config::BackendSettings;
use crate::model::RetrievedCandidate;
use crate::providers::{
    Embedding, IndexFilter, MAX_TOP_K, OllamaEmbedder, QdrantIndex, VectorIndex,
};

#[derive(Debug, Serialize)]
struct RetrieveResult {
    rank: usize,
    reference: String,
    score: f64,
    text: String,
}

#[derive(Debug, Serialize)]
struct RetrieveResponse {
    query: String,
    top_k: usize,
    effective_k: usize,
    filter: Option<String>,
    returned: usize,
    duration_ms: f64,
    results: Vec<RetrieveResult>,
}

/// Debug surface for the retrieval half of the pipeline: embeds the query
/// verbatim (no intent translation) and prints what the index returns.
pub(crate) async fn run(args: RetrieveArgs) -> Result<()> {
    let started = Instant::now();
    let query_text = args.query.trim();
    if query_text.is_empty() {
        bail!("query must not be empty");
    }

    let settings = BackendSettings::resolve(&args.backend);
    let filter = args.filter.as_deref().map(parse_filter).transpose()?;
    let effective_k = args.top_k.clamp(1, MAX_TOP_K);

    let embedder = OllamaEmbedder::new(&settings);
    let index = QdrantIndex::new(&settings);

    let vector = embedder
        .embed(query_text, settings.embedding_dim, settings.search_timeout)
        .await
        .context("failed to embed the query")?;

    let candidates = index
        .search(&vector, args.top_k, filter.as_ref(), settings.search_timeout)
        .await
        .context("vector search failed")?;

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(
        query = %query_text,
        top_k = args.top_k,
        effective_k,
        filter = ?args.filter,
        returned = candidates.len(),
        duration_ms,
        "retrieve completed"
    );

    let results = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| to_result(index + 1, candidate))
        .collect::<Vec<RetrieveResult>>();

    if args.json {
        let response = RetrieveResponse {
            query: query_text.to_string(),
            top_k: args.top_k,
            effective_k,
            filter: args.filter.clone(),
            returned: results.len(),
            duration_ms,
            results,
        };
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize retrieve json output")?;
        writeln!(output)?;
        output.flush()?;
    } else {
        write_text_response(query_text, effective_k, &results)?;
    }

    Ok(())
}

fn to_result(rank: usize, candidate: &RetrievedCandidate) -> RetrieveResult {
    RetrieveResult {
        rank,
        reference: candidate.reference.clone(),
        score: candidate.score,
        text: candidate.text.clone(),
    }
}

fn parse_filter(raw: &str) -> Result<IndexFilter> {
    let Some((field, value)) = raw.split_once('=') else {
        bail!("filter must look like field=value, got '{raw}'");
    };

    let field = field.trim();
    let value = value.trim();
    if field.is_empty() || value.is_empty() {
        bail!("filter field and value must both be non-empty, got '{raw}'");
    }

    Ok(IndexFilter {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn write_text_response(
    query_text: &str,
    effective_k: usize,
    results: &[RetrieveResult],
) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Query: {query_text}")?;
    writeln!(output, "Results: {} (k={})", results.len(), effective_k)?;
    for result in results {
        writeln!(
            output,
            "{}.\t{}\tscore={:.6}",
            result.rank, result.reference, result.score
        )?;
        writeln!(output, "\ttext: {}", result.text)?;
    }

    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_filter_accepts_field_value_pairs() {
        let filter = parse_filter("book=psalms").expect("valid filter");
        assert_eq!(filter.field, "book");
        assert_eq!(filter.value, "psalms");
    }

    #[test]
    fn parse_filter_rejects_malformed_input() {
        assert!(parse_filter("book").is_err());
        assert!(parse_filter("=psalms").is_err());
        assert!(parse_filter("book=").is_err());
    }
}
