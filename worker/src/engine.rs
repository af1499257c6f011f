//! Request Lifecycle Engine (§4.3): the one HTTP handler every Endpoint
//! Adapter is mounted behind.
//!
//! Forward and Cancel-watch are expressed as a single future holding a
//! [`TerminalGuard`] across its only suspension points. actix-web drops a
//! handler's future outright when the client disconnects before it
//! completes -- so the guard's `Drop` impl *is* the Cancel-watch: whichever
//! happens first, the response completing or the future being dropped,
//! exactly one terminal metric hook fires, matching the §8 single-terminal-
//! hook invariant without a second, explicitly-raced task.
use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpResponse};
use serde_json::Value;

use crate::adapter::{EndpointAdapter, Payload};
use crate::error::ApiError;
use crate::gate::AdmissionGate;
use crate::metrics::Metrics;
use worker_auth::{AuthEnvelope, Authenticator};

/// Shared, per-adapter state the HTTP route closure holds.
pub struct Engine<A: EndpointAdapter> {
    pub adapter: A,
    pub authenticator: Arc<Authenticator>,
    pub metrics: Arc<Metrics>,
    pub gate: Arc<AdmissionGate>,
    pub client: reqwest::Client,
    pub model_server_url: String,
}

/// Fires `request_canceled` exactly once, unless [`TerminalGuard::complete`]
/// already recorded a different terminal outcome for this `reqnum`.
struct TerminalGuard<'a> {
    metrics: &'a Metrics,
    workload: f64,
    reqnum: i64,
    completed: bool,
}

impl<'a> TerminalGuard<'a> {
    fn new(metrics: &'a Metrics, workload: f64, reqnum: i64) -> Self {
        Self {
            metrics,
            workload,
            reqnum,
            completed: false,
        }
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for TerminalGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.metrics.request_canceled(self.workload, self.reqnum);
        }
    }
}

impl<A: EndpointAdapter> Engine<A> {
    pub async fn handle(&self, body: web::Bytes) -> Result<HttpResponse, ApiError> {
        let envelope: Value = serde_json::from_slice(&body).map_err(|_| ApiError::missing_field("body"))?;

        let auth_data: AuthEnvelope = envelope
            .get("auth_data")
            .cloned()
            .ok_or_else(|| ApiError::missing_field("auth_data"))
            .and_then(|v| serde_json::from_value(v).map_err(|_| ApiError::missing_field("auth_data")))?;

        let payload_json = envelope
            .get("payload")
            .cloned()
            .ok_or_else(|| ApiError::missing_field("payload"))?;

        if self.authenticator.verify(&auth_data).is_err() {
            return Ok(HttpResponse::Unauthorized().finish());
        }

        let field_errors = match self.adapter.parse_payload(&payload_json) {
            Ok(payload) => return self.forward(payload, auth_data.reqnum).await,
            Err(errors) => errors,
        };
        Err(ApiError::MalformedRequest { field_errors })
    }

    async fn forward(&self, payload: A::Payload, reqnum: i64) -> Result<HttpResponse, ApiError> {
        let workload = payload.count_workload();
        self.metrics.request_start(workload, reqnum);
        let mut guard = TerminalGuard::new(&self.metrics, workload, reqnum);

        let _permit = self.gate.acquire().await;
        let t0 = Instant::now();
        let url = format!("{}{}", self.model_server_url, self.adapter.endpoint());

        let send_result = self
            .client
            .post(&url)
            .json(&payload.to_model_json())
            .send()
            .await;

        let response = match send_result {
            Ok(resp) => resp,
            Err(e) => {
                self.metrics.request_errored(workload, reqnum);
                guard.complete();
                return Err(ApiError::Upstream(e));
            }
        };

        let body_result = response.json::<Value>().await;
        let body = match body_result {
            Ok(body) => body,
            Err(e) => {
                self.metrics.request_errored(workload, reqnum);
                guard.complete();
                return Err(ApiError::Upstream(e));
            }
        };

        let translated = match self.adapter.translate_response(body).await {
            Ok(v) => v,
            Err(e) => {
                self.metrics.request_errored(workload, reqnum);
                guard.complete();
                return Err(e);
            }
        };

        self.metrics.request_end(workload, t0.elapsed(), reqnum);
        guard.complete();
        Ok(HttpResponse::Ok().json(translated))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::FieldErrors;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoPayload(f64);
    impl Payload for EchoPayload {
        fn count_workload(&self) -> f64 {
            self.0
        }
        fn to_model_json(&self) -> Value {
            json!({ "n": self.0 })
        }
    }

    struct EchoAdapter;
    #[async_trait]
    impl EndpointAdapter for EchoAdapter {
        type Payload = EchoPayload;
        fn endpoint(&self) -> &str {
            "/generate"
        }
        fn parse_payload(&self, payload: &Value) -> Result<Self::Payload, FieldErrors> {
            payload
                .get("n")
                .and_then(Value::as_f64)
                .map(EchoPayload)
                .ok_or_else(|| {
                    let mut e = FieldErrors::new();
                    e.insert("n".to_owned(), "missing parameter".to_owned());
                    e
                })
        }
        async fn translate_response(&self, model_response: Value) -> Result<Value, ApiError> {
            Ok(model_response)
        }
        fn make_benchmark_payload(&self) -> Self::Payload {
            EchoPayload(1.0)
        }
    }

    #[tokio::test]
    async fn missing_field_yields_malformed_request() {
        let adapter = EchoAdapter;
        let result = adapter.parse_payload(&json!({}));
        assert!(result.is_err());
    }

    fn make_engine() -> Engine<EchoAdapter> {
        Engine {
            adapter: EchoAdapter,
            authenticator: Arc::new(Authenticator::new(None)),
            metrics: Arc::new(Metrics::new(1, "http://autoscaler".to_owned())),
            gate: Arc::new(AdmissionGate::new(true)),
            client: reqwest::Client::new(),
            model_server_url: "http://model-server".to_owned(),
        }
    }

    #[tokio::test]
    async fn body_missing_auth_data_is_a_422_naming_the_field() {
        let engine = make_engine();
        let body = web::Bytes::from(json!({ "payload": { "n": 1.0 } }).to_string());
        let err = engine.handle(body).await.expect_err("must reject missing auth_data");
        match err {
            ApiError::MalformedRequest { field_errors } => {
                assert_eq!(field_errors.get("auth_data").map(String::as_str), Some("missing parameter"));
            }
            other => panic!("expected MalformedRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_missing_payload_is_a_422_naming_the_field() {
        let engine = make_engine();
        let body = web::Bytes::from(
            json!({
                "auth_data": {
                    "signature": "",
                    "cost": "1",
                    "endpoint": "/generate",
                    "reqnum": 1,
                    "url": "http://worker",
                }
            })
            .to_string(),
        );
        let err = engine.handle(body).await.expect_err("must reject missing payload");
        match err {
            ApiError::MalformedRequest { field_errors } => {
                assert_eq!(field_errors.get("payload").map(String::as_str), Some("missing parameter"));
            }
            other => panic!("expected MalformedRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn without_a_public_key_every_request_is_rejected_as_unauthorized() {
        let engine = make_engine();
        let body = web::Bytes::from(
            json!({
                "auth_data": {
                    "signature": "",
                    "cost": "1",
                    "endpoint": "/generate",
                    "reqnum": 1,
                    "url": "http://worker",
                },
                "payload": { "n": 1.0 },
            })
            .to_string(),
        );
        let response = engine.handle(body).await.expect("handle must not error on auth rejection");
        assert_eq!(response.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cancel_guard_fires_exactly_once_on_drop() {
        let metrics = Metrics::new(1, "http://autoscaler".to_owned());
        metrics.request_start(4.0, 42);
        {
            let mut guard = TerminalGuard::new(&metrics, 4.0, 42);
            guard.complete();
        }
        // completed guard must not have recorded a cancellation
        assert_eq!(metrics.workload_cancelled(), 0.0);
    }

    #[tokio::test]
    async fn uncompleted_guard_records_cancellation_on_drop() {
        let metrics = Metrics::new(1, "http://autoscaler".to_owned());
        metrics.request_start(4.0, 42);
        {
            let _guard = TerminalGuard::new(&metrics, 4.0, 42);
        }
        assert_eq!(metrics.workload_cancelled(), 4.0);
    }
}
