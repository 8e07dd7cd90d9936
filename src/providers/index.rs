use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::BackendSettings;
use crate::error::CapabilityError;
use crate::model::RetrievedCandidate;

use super::{classify_status, classify_transport_error};

/// Hard cap on nearest-neighbor results, regardless of what the caller asks
/// for.
pub const MAX_TOP_K: usize = 10;

/// Single-field equality filter applied to point payloads.
#[derive(Debug, Clone)]
pub struct IndexFilter {
    pub field: String,
    pub value: String,
}

/// One vector plus payload staged for an index upsert.
#[derive(Debug, Clone)]
pub struct UpsertPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// Vector-index capability. `search` trusts the index's descending score
/// order and never re-sorts; `upsert` exists only for the offline seeding
/// command.
pub trait VectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
        timeout: Duration,
    ) -> Result<Vec<RetrievedCandidate>, CapabilityError>;

    async fn upsert(
        &self,
        points: &[UpsertPoint],
        timeout: Duration,
    ) -> Result<(), CapabilityError>;
}

/// Client for a Qdrant-compatible collection REST API.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    score: f64,
    #[serde(default)]
    payload: Option<HitPayload>,
}

#[derive(Debug, Deserialize)]
struct HitPayload {
    #[serde(default)]
    reference: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    points: Vec<WirePoint>,
}

#[derive(Debug, Serialize)]
struct WirePoint {
    id: u64,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfo,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: u64,
}

impl QdrantIndex {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.index_url.clone(),
            namespace: settings.namespace.clone(),
            api_key: settings.index_api_key.clone(),
        }
    }

    /// Reachability probe: reports the collection's point count.
    pub async fn point_count(&self, timeout: Duration) -> Result<u64, CapabilityError> {
        let url = format!("{}/collections/{}", self.base_url, self.namespace);
        let mut request = self.client.get(&url).timeout(timeout);
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: CollectionInfoResponse = response.json().await.map_err(|err| {
            CapabilityError::Permanent(format!("malformed collection info response: {err}"))
        })?;
        Ok(parsed.result.points_count)
    }
}

impl VectorIndex for QdrantIndex {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
        timeout: Duration,
    ) -> Result<Vec<RetrievedCandidate>, CapabilityError> {
        let limit = top_k.clamp(1, MAX_TOP_K);
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.namespace
        );

        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = filter {
            body["filter"] = json!({
                "must": [{ "key": filter.field, "match": { "value": filter.value } }],
            });
        }

        let mut request = self.client.post(&url).timeout(timeout).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: SearchResponse = response.json().await.map_err(|err| {
            CapabilityError::Permanent(format!("malformed search response: {err}"))
        })?;

        let candidates = parsed
            .result
            .into_iter()
            .filter_map(|hit| {
                let payload = hit.payload?;
                if payload.reference.is_empty() && payload.text.is_empty() {
                    return None;
                }
                Some(RetrievedCandidate {
                    reference: payload.reference,
                    text: payload.text,
                    score: hit.score.clamp(0.0, 1.0),
                })
            })
            .collect();

        Ok(candidates)
    }

    async fn upsert(
        &self,
        points: &[UpsertPoint],
        timeout: Duration,
    ) -> Result<(), CapabilityError> {
        if points.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.namespace
        );
        let request_body = UpsertRequest {
            points: points
                .iter()
                .map(|point| WirePoint {
                    id: point_numeric_id(&point.id),
                    vector: point.vector.clone(),
                    payload: point.payload.clone(),
                })
                .collect(),
        };

        let mut request = self.client.put(&url).timeout(timeout).json(&request_body);
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        Ok(())
    }
}

/// The collection API wants numeric point ids; corpus entry ids are free-form
/// strings. Derive a stable 64-bit id from the string and keep the original
/// in the payload.
pub(crate) fn point_numeric_id(entry_id: &str) -> u64 {
    let digest = Sha256::digest(entry_id.as_bytes());
    u64::from_le_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}
