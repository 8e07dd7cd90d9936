use thiserror::Error;

/// Failure at one of the external capability boundaries, split by whether a
/// retry could plausibly succeed.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Upstream overload or temporary unavailability; a later attempt may work.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Everything else: bad request, auth failure, contract mismatch.
    #[error("upstream request failed: {0}")]
    Permanent(String),
}

impl CapabilityError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors the compose pipeline can surface to its caller.
///
/// Embedding and retrieval variants exist for the retrieval stage to catch
/// and downgrade internally; only generation-class errors escape a compose
/// run.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("embedding request failed")]
    Embedding(#[source] CapabilityError),

    #[error("vector search failed")]
    Retrieval(#[source] CapabilityError),

    #[error("generation failed after {attempts} attempt(s)")]
    Generation {
        attempts: u32,
        #[source]
        source: CapabilityError,
    },

    #[error("generation response violates the output schema: {reason}")]
    SchemaViolation { reason: String },
}

impl ComposeError {
    pub fn missing_field(field: &str) -> Self {
        Self::SchemaViolation {
            reason: format!("missing required field '{field}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_drives_retryability() {
        assert!(CapabilityError::Transient("503".to_string()).is_transient());
        assert!(!CapabilityError::Permanent("401".to_string()).is_transient());
    }

    #[test]
    fn missing_field_names_the_field() {
        let err = ComposeError::missing_field("citationLabel");
        assert!(err.to_string().contains("citationLabel"));
    }
}
