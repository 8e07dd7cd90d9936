use serde::Serialize;

pub(super) const HIGH_THRESHOLD: f64 = 0.75;
pub(super) const MEDIUM_THRESHOLD: f64 = 0.55;

const HIGH_INSTRUCTION: &str = "The retrieved passages above are a strong match for this request; one of them is likely to be directly usable as the citation.";
const MEDIUM_INSTRUCTION: &str = "The retrieved passages above are a partial match; use one only if it genuinely fits the request, otherwise select a passage you know independently.";
const LOW_INSTRUCTION: &str = "The retrieved passages above are a weak match for this request; feel free to set them aside and draw on your own knowledge of the corpus instead.";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Maps the best candidate score to a tier and the instruction sentence the
/// evidence block closes with. Lower band bounds are inclusive.
pub(super) fn classify(best_score: f64) -> (ConfidenceTier, &'static str) {
    if best_score >= HIGH_THRESHOLD {
        (ConfidenceTier::High, HIGH_INSTRUCTION)
    } else if best_score >= MEDIUM_THRESHOLD {
        (ConfidenceTier::Medium, MEDIUM_INSTRUCTION)
    } else {
        (ConfidenceTier::Low, LOW_INSTRUCTION)
    }
}
