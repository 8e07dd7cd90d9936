use std::cell::{Cell, RefCell};
use std::time::Duration;

use crate::cli::VoiceMode;
use crate::config::BackendSettings;
use crate::error::{CapabilityError, ComposeError};
use crate::model::{CitationSource, ComposeRequest, GenerationResult, RetrievedCandidate};
use crate::providers::{Embedding, GenerationOptions, IndexFilter, TextGeneration, VectorIndex};

use super::confidence::{self, ConfidenceTier};
use super::evidence::assemble_evidence;
use super::generation::parse_generation_result;
use super::reconcile::{body_repeats_citation, citation_matches, reconcile, strip_annotations};
use super::run::compose;
use super::translator;

fn test_settings() -> BackendSettings {
    BackendSettings {
        generation_url: "http://127.0.0.1:1".to_string(),
        generation_model: "test-model".to_string(),
        embedding_url: "http://127.0.0.1:1".to_string(),
        embedding_model: "test-embed".to_string(),
        embedding_dim: 8,
        index_url: "http://127.0.0.1:1".to_string(),
        namespace: "passages".to_string(),
        index_api_key: None,
        search_timeout: Duration::from_millis(50),
        generation_timeout: Duration::from_millis(50),
        generation_attempts: 3,
        generation_backoff: Duration::from_millis(1),
    }
}

fn candidate(reference: &str, text: &str, score: f64) -> RetrievedCandidate {
    RetrievedCandidate {
        reference: reference.to_string(),
        text: text.to_string(),
        score,
    }
}

fn generation_json(theme: &str, citation_text: &str, citation_label: &str, body: &str) -> String {
    serde_json::json!({
        "theme": theme,
        "citationText": citation_text,
        "citationLabel": citation_label,
        "body": body,
    })
    .to_string()
}

/// Scripted text-generation capability. The translator asks for free text
/// and the composer asks for JSON format, which is how the mock tells the
/// two calls apart.
struct ScriptedGenerator {
    translation: Option<String>,
    generation: Result<String, &'static str>,
    generation_calls: Cell<u32>,
    last_user_prompt: RefCell<String>,
}

impl ScriptedGenerator {
    fn new(translation: Option<&str>, generation: Result<String, &'static str>) -> Self {
        Self {
            translation: translation.map(str::to_string),
            generation,
            generation_calls: Cell::new(0),
            last_user_prompt: RefCell::new(String::new()),
        }
    }
}

impl TextGeneration for ScriptedGenerator {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        options: GenerationOptions,
        _timeout: Duration,
    ) -> Result<String, CapabilityError> {
        if !options.json_format {
            return match &self.translation {
                Some(reply) => Ok(reply.clone()),
                None => Err(CapabilityError::Transient(
                    "translation endpoint unreachable".to_string(),
                )),
            };
        }

        self.generation_calls.set(self.generation_calls.get() + 1);
        *self.last_user_prompt.borrow_mut() = user_prompt.to_string();
        match &self.generation {
            Ok(reply) => Ok(reply.clone()),
            Err(message) => Err(CapabilityError::Transient(message.to_string())),
        }
    }
}

struct FixedEmbedder {
    fail: bool,
    last_text: RefCell<String>,
}

impl FixedEmbedder {
    fn working() -> Self {
        Self {
            fail: false,
            last_text: RefCell::new(String::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            last_text: RefCell::new(String::new()),
        }
    }
}

impl Embedding for FixedEmbedder {
    async fn embed(
        &self,
        text: &str,
        dimension: usize,
        _timeout: Duration,
    ) -> Result<Vec<f32>, CapabilityError> {
        *self.last_text.borrow_mut() = text.to_string();
        if self.fail {
            return Err(CapabilityError::Transient(
                "embedding endpoint unreachable".to_string(),
            ));
        }
        Ok(vec![0.1; dimension])
    }
}

struct FixedIndex {
    candidates: Vec<RetrievedCandidate>,
    fail: bool,
}

impl FixedIndex {
    fn with(candidates: Vec<RetrievedCandidate>) -> Self {
        Self {
            candidates,
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            candidates: Vec::new(),
            fail: true,
        }
    }
}

impl VectorIndex for FixedIndex {
    async fn search(
        &self,
        _vector: &[f32],
        top_k: usize,
        _filter: Option<&IndexFilter>,
        _timeout: Duration,
    ) -> Result<Vec<RetrievedCandidate>, CapabilityError> {
        if self.fail {
            return Err(CapabilityError::Transient(
                "index namespace unreachable".to_string(),
            ));
        }
        Ok(self.candidates.iter().take(top_k).cloned().collect())
    }

    async fn upsert(
        &self,
        _points: &[crate::providers::UpsertPoint],
        _timeout: Duration,
    ) -> Result<(), CapabilityError> {
        Ok(())
    }
}

mod classify {
    use super::*;

    #[test]
    fn band_bounds_are_inclusive_at_the_bottom() {
        assert_eq!(confidence::classify(0.75).0, ConfidenceTier::High);
        assert_eq!(confidence::classify(0.749_999).0, ConfidenceTier::Medium);
        assert_eq!(confidence::classify(0.55).0, ConfidenceTier::Medium);
        assert_eq!(confidence::classify(0.549_999).0, ConfidenceTier::Low);
    }

    #[test]
    fn extremes_map_to_outer_tiers() {
        assert_eq!(confidence::classify(1.0).0, ConfidenceTier::High);
        assert_eq!(confidence::classify(0.0).0, ConfidenceTier::Low);
    }

    #[test]
    fn instructions_are_pairwise_distinct() {
        let high = confidence::classify(0.9).1;
        let medium = confidence::classify(0.6).1;
        let low = confidence::classify(0.2).1;
        assert_ne!(high, medium);
        assert_ne!(medium, low);
        assert_ne!(high, low);
    }
}

mod annotation_stripping {
    use super::*;

    #[test]
    fn removes_spans_and_collapses_whitespace() {
        assert_eq!(
            strip_annotations("Be still {marginal note} and   know"),
            "Be still and know"
        );
    }

    #[test]
    fn removes_stray_braces() {
        assert_eq!(strip_annotations("orphan { brace"), "orphan brace");
        assert_eq!(strip_annotations("closing } only"), "closing only");
    }

    #[test]
    fn is_idempotent_and_brace_free() {
        let inputs = [
            "plain text",
            "{leading} note",
            "nested {outer {inner} tail} text",
            "  spaced    out  ",
        ];
        for input in inputs {
            let once = strip_annotations(input);
            assert_eq!(strip_annotations(&once), once);
            assert!(!once.contains('{'));
            assert!(!once.contains('}'));
        }
    }
}

mod citation_matching {
    use super::*;

    #[test]
    fn containment_is_symmetric() {
        assert!(citation_matches("John 3", "John 3:16"));
        assert!(citation_matches("John 3:16", "John 3"));
    }

    #[test]
    fn leading_token_equality_matches() {
        assert!(citation_matches("Psalm 23:1", "Psalm 91:2"));
    }

    #[test]
    fn case_and_spacing_are_ignored() {
        assert!(citation_matches("john  3:16", "John 3:16"));
    }

    #[test]
    fn distinct_references_do_not_match() {
        assert!(!citation_matches("John 3:16", "Isaiah 41:10"));
        assert!(!citation_matches("", "John 3:16"));
    }
}

mod reconciliation {
    use super::*;

    fn generated(citation_text: &str, citation_label: &str) -> GenerationResult {
        GenerationResult {
            theme: "quiet trust".to_string(),
            citation_text: citation_text.to_string(),
            citation_label: citation_label.to_string(),
            body: "A settled word for an unsettled evening.".to_string(),
        }
    }

    #[test]
    fn matched_citation_is_overridden_with_corpus_text() {
        let candidates = vec![candidate(
            "Psalm 30:5",
            "Weeping may endure for a night, {lodge} but joy cometh in the morning.",
            0.81,
        )];

        let (result, source) = reconcile(generated("joy comes with morning", "Psalm 30"), &candidates);

        assert_eq!(source, CitationSource::Corpus);
        assert_eq!(result.citation_label, "Psalm 30:5");
        assert_eq!(
            result.citation_text,
            "Weeping may endure for a night, but joy cometh in the morning."
        );
    }

    #[test]
    fn empty_candidates_never_invent_a_citation() {
        let (result, source) = reconcile(
            generated("Fear thou not; {see note} for I am with thee", "Isaiah 41:10"),
            &[],
        );

        assert_eq!(source, CitationSource::Generator);
        assert_eq!(result.citation_label, "Isaiah 41:10");
        assert_eq!(result.citation_text, "Fear thou not; for I am with thee");
    }

    #[test]
    fn unmatched_citation_is_trusted_verbatim_after_strip() {
        let candidates = vec![candidate("Romans 8:28", "All things work together.", 0.6)];

        let (result, source) = reconcile(
            generated("The Lord is my shepherd", "Psalm 23:1"),
            &candidates,
        );

        assert_eq!(source, CitationSource::Generator);
        assert_eq!(result.citation_label, "Psalm 23:1");
        assert_eq!(result.citation_text, "The Lord is my shepherd");
    }

    #[test]
    fn verbatim_body_echo_is_detected_but_tolerated() {
        assert!(body_repeats_citation(
            "He reminds us: be still, and know. That is enough.",
            "Be still, and know"
        ));
        assert!(!body_repeats_citation(
            "A fresh paraphrase of an old stillness.",
            "Be still, and know"
        ));
        assert!(!body_repeats_citation("Anything at all.", ""));
    }
}

mod evidence_block {
    use super::*;

    #[test]
    fn renders_numbered_list_with_percent_and_instruction() {
        let candidates = vec![
            candidate("Psalm 30:5", "Joy cometh in the morning.", 0.81),
            candidate("John 16:22", "Your joy no man taketh from you.", 0.64),
        ];
        let (_, instruction) = confidence::classify(0.81);

        let block = assemble_evidence(&candidates, instruction);

        assert!(block.contains("1. Psalm 30:5 (81% match): \"Joy cometh in the morning.\""));
        assert!(block.contains("2. John 16:22 (64% match)"));
        assert!(block.ends_with(instruction));
    }

    #[test]
    fn empty_candidates_render_nothing() {
        let (_, instruction) = confidence::classify(0.9);
        assert_eq!(assemble_evidence(&[], instruction), "");
    }
}

mod schema_parsing {
    use super::*;

    #[test]
    fn parses_a_complete_response() {
        let raw = generation_json(
            "steady hope",
            "Let not your heart be troubled.",
            "John 14:1",
            "Tonight the trouble is real, and so is the keeping.",
        );

        let result = parse_generation_result(&raw).expect("schema-complete response");
        assert_eq!(result.theme, "steady hope");
        assert_eq!(result.citation_label, "John 14:1");
    }

    #[test]
    fn tolerates_a_markdown_fence() {
        let raw = format!(
            "```json\n{}\n```",
            generation_json("rest", "Come unto me.", "Matthew 11:28", "There is rest held out.")
        );
        assert!(parse_generation_result(&raw).is_ok());
    }

    #[test]
    fn missing_field_is_a_schema_violation_naming_the_field() {
        let raw = serde_json::json!({
            "theme": "rest",
            "citationText": "Come unto me.",
            "citationLabel": "Matthew 11:28",
        })
        .to_string();

        let err = parse_generation_result(&raw).unwrap_err();
        match err {
            ComposeError::SchemaViolation { reason } => assert!(reason.contains("body")),
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    #[test]
    fn non_json_response_is_a_schema_violation() {
        assert!(matches!(
            parse_generation_result("Here is a comforting thought for you."),
            Err(ComposeError::SchemaViolation { .. })
        ));
    }
}

mod translation {
    use super::*;

    #[tokio::test]
    async fn failure_falls_back_to_the_raw_request() {
        let generator = ScriptedGenerator::new(None, Ok(String::new()));

        let expansion = translator::translate(&generator, "something to smile about").await;

        assert!(!expansion.translated);
        assert_eq!(expansion.text, "something to smile about");
    }

    #[tokio::test]
    async fn prose_reply_also_falls_back() {
        let generator =
            ScriptedGenerator::new(Some("I think you might want joyful passages"), Ok(String::new()));

        let expansion = translator::translate(&generator, "cheer me up").await;

        assert!(!expansion.translated);
        assert_eq!(expansion.text, "cheer me up");
    }

    #[tokio::test]
    async fn clean_term_list_is_used() {
        let generator = ScriptedGenerator::new(Some("joy, laughter, gladness"), Ok(String::new()));

        let expansion = translator::translate(&generator, "something to smile about").await;

        assert!(expansion.translated);
        assert_eq!(expansion.text, "joy, laughter, gladness");
    }
}

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn strong_match_grounds_the_citation_in_corpus_text() {
        let settings = test_settings();
        let request = ComposeRequest::new("something to smile about", VoiceMode::SelfVoice)
            .expect("valid request");

        let generator = ScriptedGenerator::new(
            Some("joy, laughter, gladness"),
            Ok(generation_json(
                "returning joy",
                "joy comes in the morning",
                "Psalm 30",
                "Morning has a way of arriving anyway.",
            )),
        );
        let embedder = FixedEmbedder::working();
        let index = FixedIndex::with(vec![candidate(
            "Psalm 30:5",
            "Weeping may endure for a night, {selah} but joy cometh in the morning.",
            0.81,
        )]);

        let outcome = compose(&generator, &embedder, &index, &settings, &request, 5, None)
            .await
            .expect("pipeline completes");

        assert_eq!(outcome.tier, Some(ConfidenceTier::High));
        assert!(outcome.translated);
        assert_eq!(*embedder.last_text.borrow(), "joy, laughter, gladness");
        assert!(
            generator
                .last_user_prompt
                .borrow()
                .contains("strong match")
        );
        assert_eq!(outcome.citation_source, CitationSource::Corpus);
        assert_eq!(outcome.result.citation_label, "Psalm 30:5");
        assert_eq!(
            outcome.result.citation_text,
            "Weeping may endure for a night, but joy cometh in the morning."
        );
    }

    #[tokio::test]
    async fn unreachable_index_degrades_to_ungrounded_generation() {
        let settings = test_settings();
        let request =
            ComposeRequest::new("I am afraid of tomorrow", VoiceMode::SelfVoice).expect("valid");

        let generator = ScriptedGenerator::new(
            Some("fear, courage, presence"),
            Ok(generation_json(
                "held in fear",
                "Fear thou not; {cf. v.13} for I am with thee",
                "Isaiah 41:10",
                "Tomorrow is not waiting for you alone.",
            )),
        );
        let embedder = FixedEmbedder::working();
        let index = FixedIndex::failing();

        let outcome = compose(&generator, &embedder, &index, &settings, &request, 5, None)
            .await
            .expect("pipeline completes despite retrieval failure");

        assert_eq!(outcome.tier, None);
        assert_eq!(outcome.candidate_count, 0);
        assert!(outcome.degraded_reason.is_some());
        assert!(
            !generator
                .last_user_prompt
                .borrow()
                .contains("Retrieved passages")
        );
        assert_eq!(outcome.citation_source, CitationSource::Generator);
        assert_eq!(outcome.result.citation_label, "Isaiah 41:10");
        assert_eq!(
            outcome.result.citation_text,
            "Fear thou not; for I am with thee"
        );
    }

    #[tokio::test]
    async fn embedding_failure_is_downgraded_the_same_way() {
        let settings = test_settings();
        let request = ComposeRequest::new("worn out", VoiceMode::Other).expect("valid");

        let generator = ScriptedGenerator::new(
            None,
            Ok(generation_json(
                "rest for the weary",
                "Come unto me, all ye that labour",
                "Matthew 11:28",
                "We can set the load down for a moment.",
            )),
        );
        let embedder = FixedEmbedder::failing();
        let index = FixedIndex::with(vec![candidate("Matthew 11:28", "Come unto me.", 0.9)]);

        let outcome = compose(&generator, &embedder, &index, &settings, &request, 5, None)
            .await
            .expect("pipeline completes");

        assert_eq!(outcome.candidate_count, 0);
        assert!(outcome.degraded_reason.is_some());
        assert_eq!(outcome.citation_source, CitationSource::Generator);
    }

    #[tokio::test]
    async fn middling_score_lands_in_the_medium_band() {
        let settings = test_settings();
        let request = ComposeRequest::new("thankful today", VoiceMode::SelfVoice).expect("valid");

        let generator = ScriptedGenerator::new(
            Some("gratitude, thanksgiving, praise"),
            Ok(generation_json(
                "overflowing thanks",
                "O give thanks unto the Lord",
                "Psalm 107:1",
                "Today the counting comes easy.",
            )),
        );
        let embedder = FixedEmbedder::working();
        let index = FixedIndex::with(vec![candidate(
            "Psalm 107:1",
            "O give thanks unto the Lord, for he is good.",
            0.60,
        )]);

        let outcome = compose(&generator, &embedder, &index, &settings, &request, 5, None)
            .await
            .expect("pipeline completes");

        assert_eq!(outcome.tier, Some(ConfidenceTier::Medium));
        assert!(
            generator
                .last_user_prompt
                .borrow()
                .contains("only if it genuinely fits")
        );
    }

    #[tokio::test]
    async fn generation_exhausts_its_retry_budget_and_fails() {
        let settings = test_settings();
        let request = ComposeRequest::new("anything kind", VoiceMode::SelfVoice).expect("valid");

        let generator = ScriptedGenerator::new(Some("kindness, mercy"), Err("model overloaded"));
        let embedder = FixedEmbedder::working();
        let index = FixedIndex::with(vec![]);

        let err = compose(&generator, &embedder, &index, &settings, &request, 5, None)
            .await
            .unwrap_err();

        assert_eq!(generator.generation_calls.get(), 3);
        match err {
            ComposeError::Generation { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected generation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn schema_violation_is_not_retried() {
        let settings = test_settings();
        let request = ComposeRequest::new("anything kind", VoiceMode::SelfVoice).expect("valid");

        let generator = ScriptedGenerator::new(
            Some("kindness, mercy"),
            Ok(r#"{"theme": "kindness"}"#.to_string()),
        );
        let embedder = FixedEmbedder::working();
        let index = FixedIndex::with(vec![]);

        let err = compose(&generator, &embedder, &index, &settings, &request, 5, None)
            .await
            .unwrap_err();

        assert_eq!(generator.generation_calls.get(), 1);
        assert!(matches!(err, ComposeError::SchemaViolation { .. }));
    }
}
