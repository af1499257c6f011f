//! A trivial JSON-echo adapter so `worker`'s own binary is runnable without
//! pulling in a model-specific adapter crate. Real deployments supply their
//! own `EndpointAdapter`; see `demos/` for richer, hello-world-grounded ones.
use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::{require_str_field, EndpointAdapter, Payload};
use crate::error::{ApiError, FieldErrors};
use crate::tailer::{LogAction, LogRule};

#[derive(Clone, Debug)]
pub struct EchoPayload {
    pub prompt: String,
}

impl Payload for EchoPayload {
    fn count_workload(&self) -> f64 {
        self.prompt.len() as f64
    }

    fn to_model_json(&self) -> Value {
        serde_json::json!({ "prompt": self.prompt })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EchoAdapter;

#[async_trait]
impl EndpointAdapter for EchoAdapter {
    type Payload = EchoPayload;

    fn endpoint(&self) -> &str {
        "/generate"
    }

    fn parse_payload(&self, payload: &Value) -> Result<Self::Payload, FieldErrors> {
        let prompt = require_str_field(payload, "prompt")?;
        Ok(EchoPayload { prompt })
    }

    async fn translate_response(&self, model_response: Value) -> Result<Value, ApiError> {
        Ok(model_response)
    }

    fn make_benchmark_payload(&self) -> Self::Payload {
        EchoPayload {
            prompt: "a".repeat(256),
        }
    }
}

/// The default log-tailing rules for the stock model-server log format this
/// adapter expects; adjusted per deployment in practice.
pub fn log_rules() -> Vec<LogRule> {
    vec![
        LogRule::new(LogAction::ModelLoaded, "model server has started"),
        LogRule::new(LogAction::Info, "Download"),
    ]
}
