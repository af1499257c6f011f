//! Error types and their JSON wire shape.
//!
//! Follows the `tokenserver_common::TokenserverError` convention: a `thiserror`
//! enum that implements `actix_web::ResponseError` directly, paired with a
//! private `Serialize` impl that controls exactly what crosses the wire (never
//! `#[derive(Serialize)]` on the error type itself, so that internal detail in
//! `Upstream`/`Internal` never leaks into a response body).
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use thiserror::Error;
use worker_common::ReportableError;

/// A single field's complaint, as surfaced in a [`ApiError::MalformedRequest`]
/// body: `{"<field>": "<reason>"}`.
pub type FieldErrors = std::collections::BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body wasn't valid JSON, or an Endpoint Adapter rejected one
    /// or more fields of the parsed payload.
    #[error("malformed request")]
    MalformedRequest { field_errors: FieldErrors },

    /// The model server could not be reached, or its response could not be
    /// read -- a transport failure, not an application-level rejection.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Any other unclassifiable failure. Never shown to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn missing_field(field: &str) -> Self {
        let mut field_errors = FieldErrors::new();
        field_errors.insert(field.to_owned(), "missing parameter".to_owned());
        ApiError::MalformedRequest { field_errors }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ReportableError for ApiError {
    fn error_backtrace(&self) -> String {
        String::new()
    }

    fn is_reportable(&self) -> bool {
        matches!(self, ApiError::Upstream(_) | ApiError::Internal(_))
    }

    fn metric_label(&self) -> Option<String> {
        match self {
            ApiError::MalformedRequest { .. } => None,
            ApiError::Upstream(_) => Some("engine.error.upstream".to_owned()),
            ApiError::Internal(_) => Some("engine.error.internal".to_owned()),
        }
    }
}

/// Renders `{"<field>": "<reason>", ...}` for a malformed request and an
/// opaque `{"status": "error"}` for anything else -- internal detail in
/// `Upstream`/`Internal` is deliberately not serialized, mirroring
/// `TokenserverError`'s `ErrorResponse` shape.
impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ApiError::MalformedRequest { field_errors } => {
                let mut map = serializer.serialize_map(Some(field_errors.len()))?;
                for (field, reason) in field_errors {
                    map.serialize_entry(field, reason)?;
                }
                map.end()
            }
            ApiError::Upstream(_) | ApiError::Internal(_) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("status", "error")?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn malformed_request_status_is_422() {
        let err = ApiError::missing_field("prompt");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn internal_error_status_is_500() {
        let err = ApiError::Internal("boom".to_owned());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_reportable());
    }

    #[test]
    fn malformed_request_serializes_field_map() {
        let err = ApiError::missing_field("prompt");
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["prompt"], "missing parameter");
    }

    #[test]
    fn internal_error_does_not_leak_detail() {
        let err = ApiError::Internal("sensitive detail".to_owned());
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["status"], "error");
        assert!(body.get("sensitive detail").is_none());
    }
}
