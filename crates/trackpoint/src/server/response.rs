//! JSON error contract for the HTTP surface.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::{Error, REQUIRED_FIELDS};

/// A failed request, rendered as a JSON body with the matching status.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The body or query string could not be decoded.
    #[error("Malformed request")]
    Malformed {
        /// What the decoder reported.
        details: String,
    },

    /// A service call failed.
    #[error(transparent)]
    Service(#[from] Error),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed {
            details: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Malformed {
            details: rejection.body_text(),
        }
    }
}

impl ApiError {
    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed { .. } => StatusCode::BAD_REQUEST,
            Self::Service(e) if e.is_validation_error() => StatusCode::BAD_REQUEST,
            Self::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Malformed { details } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            Self::Service(Error::MissingRequiredField { missing }) => json!({
                "error": "Missing required fields",
                "required": REQUIRED_FIELDS,
                "missing": missing,
            }),
            Self::Service(Error::InvalidField { field, .. }) => json!({
                "error": self.to_string(),
                "field": field,
            }),
            Self::Service(e) => {
                error!(error = %e, "Request failed");
                json!({
                    "error": "Internal server error",
                    "details": e.to_string(),
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_missing_fields_lists_required_and_missing() {
        let err = ApiError::from(Error::MissingRequiredField {
            missing: vec!["client_id"],
        });
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["required"], json!(["event_name", "timestamp", "client_id"]));
        assert_eq!(body["missing"], json!(["client_id"]));
    }

    #[tokio::test]
    async fn test_invalid_field_names_field() {
        let err = ApiError::from(Error::invalid_field("end_date", "unrecognized instant 'soon'"));
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "end_date");
        assert!(body["error"].as_str().unwrap().contains("soon"));
    }

    #[tokio::test]
    async fn test_storage_class_is_internal_error_with_details() {
        let err = ApiError::from(Error::timeout("stats"));
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(body["details"].as_str().unwrap().contains("stats"));
    }

    #[test]
    fn test_malformed_is_bad_request() {
        let err = ApiError::Malformed {
            details: "EOF while parsing".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
