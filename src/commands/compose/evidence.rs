use std::fmt::Write;

use crate::model::RetrievedCandidate;

/// Renders retrieved candidates as advisory context for the generation
/// prompt: a numbered list with reference, rounded-percentage score, and
/// quoted text, closed by the tier's instruction sentence. Returns an empty
/// string when there is nothing to show.
pub(super) fn assemble_evidence(candidates: &[RetrievedCandidate], instruction: &str) -> String {
    if candidates.is_empty() {
        return String::new();
    }

    let mut block = String::from("Retrieved passages, ranked by similarity:\n");
    for (index, candidate) in candidates.iter().enumerate() {
        let percent = (candidate.score * 100.0).round() as i64;
        let _ = writeln!(
            block,
            "{}. {} ({percent}% match): \"{}\"",
            index + 1,
            candidate.reference,
            candidate.text
        );
    }

    block.push('\n');
    block.push_str(instruction);
    block
}
