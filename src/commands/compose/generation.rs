use crate::cli::VoiceMode;
use crate::config::BackendSettings;
use crate::error::{CapabilityError, ComposeError};
use crate::model::{ComposeRequest, GenerationResult};
use crate::providers::{GenerationOptions, TextGeneration};
use crate::retry::with_retry;

const COMPOSER_SYSTEM_PROMPT: &str = "\
You compose short consolation messages grounded in a classic devotional \
passage corpus. Your words are warm, plain, and unhurried; you never preach, \
scold, or promise outcomes. You always answer with a single JSON object and \
nothing else.";

const TONE_RULES: &str = "\
Match the emotional register of the request: meet anxiety with calm \
reassurance, grief with gentle comfort, gratitude with shared celebration, \
frustration with patient steadiness, uncertainty with quiet encouragement, \
and neutral or positive requests with warm affirmation. Never answer \
distress with cheerfulness.";

const SCHEMA_INSTRUCTION: &str = "\
Respond with a single JSON object with exactly these string fields: \
\"theme\" (two or three words naming the emotional need), \"citationText\" \
(the passage text you are citing), \"citationLabel\" (its reference), and \
\"body\" (the message itself, 60-120 words). The body must not repeat \
citationText verbatim; let it carry the passage's idea in fresh words.";

pub(super) fn voice_directive(voice: VoiceMode) -> &'static str {
    match voice {
        VoiceMode::SelfVoice => {
            "Write in the first person singular, as words the requester can say \
             for themselves (\"I\", \"me\", \"my\"). Do not slip into plural or \
             third-party phrasing anywhere in the body."
        }
        VoiceMode::Other => {
            "Write as words offered on behalf of someone the requester carries, \
             in the first person plural or addressed toward that person (\"we\", \
             \"they\"). Do not slip into first-person-singular phrasing anywhere \
             in the body."
        }
    }
}

pub(super) fn build_user_prompt(
    request: &ComposeRequest,
    expansion_text: &str,
    evidence_block: &str,
) -> String {
    let mut prompt = format!("Request: {}\n", request.text());
    prompt.push_str(&format!("Themes heard in the request: {expansion_text}\n\n"));
    prompt.push_str(voice_directive(request.voice()));
    prompt.push_str("\n\n");
    prompt.push_str(TONE_RULES);

    if !evidence_block.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(evidence_block);
    }

    prompt.push_str("\n\n");
    prompt.push_str(SCHEMA_INSTRUCTION);
    prompt
}

/// One generation call with the enriched prompt, retried only on transient
/// upstream failures, then parsed against the fixed four-field schema. A
/// response that parses but misses a field is a schema violation and is
/// never retried.
pub(super) async fn generate(
    generator: &impl TextGeneration,
    settings: &BackendSettings,
    request: &ComposeRequest,
    expansion_text: &str,
    evidence_block: &str,
    temperature: Option<f32>,
) -> Result<GenerationResult, ComposeError> {
    let user_prompt = build_user_prompt(request, expansion_text, evidence_block);
    let options = GenerationOptions {
        temperature,
        json_format: true,
    };

    let raw = with_retry(
        "generation",
        settings.generation_attempts,
        settings.generation_backoff,
        CapabilityError::is_transient,
        || {
            generator.complete(
                COMPOSER_SYSTEM_PROMPT,
                &user_prompt,
                options,
                settings.generation_timeout,
            )
        },
    )
    .await
    .map_err(|exhausted| ComposeError::Generation {
        attempts: exhausted.attempts,
        source: exhausted.error,
    })?;

    parse_generation_result(&raw)
}

pub(super) fn parse_generation_result(raw: &str) -> Result<GenerationResult, ComposeError> {
    let cleaned = strip_code_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(cleaned).map_err(|err| ComposeError::SchemaViolation {
            reason: format!("response is not valid JSON: {err}"),
        })?;
    let object = value.as_object().ok_or_else(|| ComposeError::SchemaViolation {
        reason: "response is not a JSON object".to_string(),
    })?;

    Ok(GenerationResult {
        theme: required_field(object, "theme")?,
        citation_text: required_field(object, "citationText")?,
        citation_label: required_field(object, "citationLabel")?,
        body: required_field(object, "body")?,
    })
}

fn required_field(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<String, ComposeError> {
    object
        .get(field)
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ComposeError::missing_field(field))
}

/// Some models wrap their JSON in a markdown fence even when asked not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
