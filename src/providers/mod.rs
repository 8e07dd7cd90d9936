mod embedding;
mod generation;
mod index;

pub use embedding::{Embedding, OllamaEmbedder};
pub use generation::{GenerationOptions, OllamaGenerator, TextGeneration};
pub use index::{IndexFilter, MAX_TOP_K, QdrantIndex, UpsertPoint, VectorIndex};

use reqwest::StatusCode;

use crate::error::CapabilityError;

const ERROR_BODY_PREVIEW_CHARS: usize = 240;

pub(crate) fn classify_transport_error(err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() || err.is_connect() {
        CapabilityError::Transient(err.to_string())
    } else {
        CapabilityError::Permanent(err.to_string())
    }
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> CapabilityError {
    let detail = body_preview(body);
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {detail}")
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CapabilityError::Transient(message)
    } else {
        CapabilityError::Permanent(message)
    }
}

fn body_preview(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<&str>>().join(" ");
    collapsed.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_statuses_classify_as_transient() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "busy").is_transient());
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());
    }

    #[test]
    fn client_errors_classify_as_permanent() {
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "bad key").is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[test]
    fn body_preview_collapses_and_truncates() {
        let noisy = "line one\n\n   line two";
        assert_eq!(body_preview(noisy), "line one line two");

        let long = "x".repeat(1000);
        assert_eq!(body_preview(&long).len(), ERROR_BODY_PREVIEW_CHARS);
    }
}
