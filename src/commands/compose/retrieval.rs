use tracing::warn;

use crate::config::BackendSettings;
use crate::error::ComposeError;
use crate::model::RetrievedCandidate;
use crate::providers::{Embedding, VectorIndex};

/// What the retrieval stage hands downstream. `degraded_reason` is set when
/// embedding or search failed and the pipeline is continuing without
/// evidence.
#[derive(Debug)]
pub(super) struct RetrievalOutcome {
    pub(super) candidates: Vec<RetrievedCandidate>,
    pub(super) degraded_reason: Option<String>,
}

/// Embeds the search text and queries the index. Both calls get one bounded
/// attempt; any failure is caught here and downgraded to an empty candidate
/// list so generation can proceed ungrounded. Nothing from this stage ever
/// aborts a compose run.
pub(super) async fn retrieve_candidates(
    embedder: &impl Embedding,
    index: &impl VectorIndex,
    settings: &BackendSettings,
    search_text: &str,
    top_k: usize,
) -> RetrievalOutcome {
    match try_retrieve(embedder, index, settings, search_text, top_k).await {
        Ok(candidates) => RetrievalOutcome {
            candidates,
            degraded_reason: None,
        },
        Err(err) => {
            let reason = downgrade_reason(&err);
            warn!(reason = %reason, "retrieval unavailable; composing without evidence");
            RetrievalOutcome {
                candidates: Vec::new(),
                degraded_reason: Some(reason),
            }
        }
    }
}

async fn try_retrieve(
    embedder: &impl Embedding,
    index: &impl VectorIndex,
    settings: &BackendSettings,
    search_text: &str,
    top_k: usize,
) -> Result<Vec<RetrievedCandidate>, ComposeError> {
    let vector = embedder
        .embed(search_text, settings.embedding_dim, settings.search_timeout)
        .await
        .map_err(ComposeError::Embedding)?;

    index
        .search(&vector, top_k, None, settings.search_timeout)
        .await
        .map_err(ComposeError::Retrieval)
}

fn downgrade_reason(err: &ComposeError) -> String {
    match err {
        ComposeError::Embedding(source) | ComposeError::Retrieval(source) => {
            format!("{err}: {source}")
        }
        other => other.to_string(),
    }
}
