//! The Endpoint Adapter contract (§4.8): the one piece of this system that is
//! necessarily model-specific. The core knows nothing about any concrete
//! model's request/response shape; it only calls through this trait.
use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ApiError, FieldErrors};

/// A parsed, field-validated request payload for one endpoint.
///
/// Implementations are expected to be cheap, `Send`, and free of any
/// cross-request state -- the core treats every call as pure.
pub trait Payload: Send + Sync + 'static {
    /// Deterministic, side-effect-free unit of work this payload represents.
    /// Drives `cur_perf` and every workload counter; never recomputed once a
    /// request is in flight.
    fn count_workload(&self) -> f64;

    /// What to POST to the model server for this payload.
    fn to_model_json(&self) -> Value;
}

/// One model-server route and the glue needed to speak to it.
///
/// `Payload` is the adapter's own concrete type; the engine only ever touches
/// it through this trait and [`Payload`] above.
#[async_trait]
pub trait EndpointAdapter: Send + Sync {
    type Payload: Payload;

    /// Path on the model server this adapter forwards to, e.g. `/generate`.
    fn endpoint(&self) -> &str;

    /// Validate and parse the client-supplied `payload` JSON object. Missing
    /// or invalid fields must be reported as `{field: "missing parameter"}`
    /// entries, matching `ApiError::MalformedRequest`'s wire shape.
    fn parse_payload(&self, payload: &Value) -> Result<Self::Payload, FieldErrors>;

    /// Translate the model server's raw JSON response into what the client
    /// should receive. The engine always buffers the model server's response
    /// before calling this -- adapters that need to forward a chunked
    /// response verbatim are out of this trait's scope and mount their own
    /// route instead of going through the engine's buffered path.
    async fn translate_response(&self, model_response: Value) -> Result<Value, ApiError>;

    /// A representative payload used only by the Benchmarker (§4.7). Only the
    /// adapter designated as the benchmark handler needs a meaningful
    /// implementation.
    fn make_benchmark_payload(&self) -> Self::Payload;
}

/// Parses `payload["field"]` as a string, producing the documented
/// `{field: "missing parameter"}` shape on absence -- a convenience shared by
/// every concrete adapter's `parse_payload`.
pub fn require_str_field(payload: &Value, field: &str) -> Result<String, FieldErrors> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            let mut errors = FieldErrors::new();
            errors.insert(field.to_owned(), "missing parameter".to_owned());
            errors
        })
}
