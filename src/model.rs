use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::cli::VoiceMode;

/// One composition request. Validated at construction and immutable after.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    text: String,
    voice: VoiceMode,
}

impl ComposeRequest {
    pub fn new(text: &str, voice: VoiceMode) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            bail!("request text must not be empty");
        }

        Ok(Self {
            text: trimmed.to_string(),
            voice,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> VoiceMode {
        self.voice
    }
}

/// A passage returned by the vector index, ordered descending by score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedCandidate {
    pub reference: String,
    pub text: String,
    pub score: f64,
}

/// One corpus unit as stored in the seeding file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub reference: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// The fixed four-field object the generation capability must return.
/// Field names are camelCase on the wire; that is the schema the upstream
/// view layer already consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub theme: String,
    pub citation_text: String,
    pub citation_label: String,
    pub body: String,
}

/// Final pipeline output: a generation result with its citation normalized
/// and, when matched, replaced by the corpus's authoritative text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledResult {
    pub theme: String,
    pub citation_text: String,
    pub citation_label: String,
    pub body: String,
}

/// Where the final citation text came from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationSource {
    Corpus,
    Generator,
}

impl CitationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Corpus => "corpus",
            Self::Generator => "generator",
        }
    }
}
