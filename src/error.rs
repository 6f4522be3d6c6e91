use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Configuration rejected before any runtime resources were touched.
    #[error("validation error for {field}: {message}")]
    Validation { field: String, message: String },
    #[error("unknown model factory '{key}'; registered: {}", .available.join(", "))]
    UnknownFactory { key: String, available: Vec<String> },
    #[error("invalid request: {0}")]
    BadRequest(String),
    /// Out-of-memory or missing accelerator, message kept as the runtime reported it.
    #[error("{0}")]
    Resource(String),
    #[error("model artifact missing: {}", .0.display())]
    MissingArtifact(PathBuf),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("{0}")]
    Inference(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

impl BackendError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Builds the `unexpected value; permitted: ...` error for a closed set of values.
    pub fn unexpected_value<I, S>(field: &str, permitted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let listed = permitted
            .into_iter()
            .map(|value| format!("'{}'", value.as_ref()))
            .collect::<Vec<_>>()
            .join(", ");
        Self::validation(field, format!("unexpected value; permitted: {listed}"))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, BackendError::Validation { .. })
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = match self {
            BackendError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BackendError::UnknownFactory { .. } | BackendError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            BackendError::Resource(_) | BackendError::MissingArtifact(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            BackendError::Tokenizer(_) | BackendError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BackendError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackendError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_value_lists_permitted_names() {
        let err = BackendError::unexpected_value("name", ["dolly-v2-3b", "dolly-v2-7b"]);
        assert_eq!(
            err.to_string(),
            "validation error for name: unexpected value; permitted: 'dolly-v2-3b', 'dolly-v2-7b'"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn resource_message_is_unchanged() {
        let err = BackendError::Resource("CUDA out of memory. Tried to allocate 2.00 GiB".into());
        assert_eq!(err.to_string(), "CUDA out of memory. Tried to allocate 2.00 GiB");
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (BackendError::validation("name", "bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (
                BackendError::UnknownFactory {
                    key: "x".into(),
                    available: vec!["y".into()],
                },
                StatusCode::BAD_REQUEST,
            ),
            (BackendError::Resource("oom".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                BackendError::MissingArtifact(PathBuf::from("models/x/model.ts")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (BackendError::Inference("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn unknown_factory_lists_keys() {
        let err = BackendError::UnknownFactory {
            key: "llm.Gpt.v9".into(),
            available: vec!["llm.Dolly.v1".into(), "llm.Phi-2.v1".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown model factory 'llm.Gpt.v9'; registered: llm.Dolly.v1, llm.Phi-2.v1"
        );
    }
}
