//! Two adapters for the same toy payload shape, mirroring
//! `GenerateHandler`/`GenerateStreamHandler` from the reference `hello_world`
//! model-server integration: one buffers the model's JSON response, the
//! other forwards it as a chunked stream.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use worker::adapter::{require_str_field, EndpointAdapter, Payload};
use worker::error::{ApiError, FieldErrors};
use worker::tailer::{LogAction, LogRule};

/// Mirrors the reference `InputData` dataclass: a prompt and a response-length
/// budget. Workload is counted as word count, the nearest tokenizer-free
/// stand-in for the reference's `len(tokenizer.tokenize(prompt))`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputData {
    pub prompt: String,
    pub max_response_tokens: i64,
}

impl InputData {
    fn for_test() -> Self {
        Self {
            prompt: "the quick brown fox jumps over the lazy dog ".repeat(25),
            max_response_tokens: 300,
        }
    }
}

impl Payload for InputData {
    fn count_workload(&self) -> f64 {
        self.prompt.split_whitespace().count() as f64
    }

    fn to_model_json(&self) -> Value {
        serde_json::to_value(self).expect("InputData always serializes")
    }
}

fn parse_input_data(payload: &Value) -> Result<InputData, FieldErrors> {
    let prompt = require_str_field(payload, "prompt")?;
    let max_response_tokens = payload
        .get("max_response_tokens")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            let mut errors = FieldErrors::new();
            errors.insert("max_response_tokens".to_owned(), "missing parameter".to_owned());
            errors
        })?;
    Ok(InputData {
        prompt,
        max_response_tokens,
    })
}

/// Buffered JSON adapter for `/generate`, grounded in `GenerateHandler`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenerateAdapter;

#[async_trait]
impl EndpointAdapter for GenerateAdapter {
    type Payload = InputData;

    fn endpoint(&self) -> &str {
        "/generate"
    }

    fn parse_payload(&self, payload: &Value) -> Result<Self::Payload, FieldErrors> {
        parse_input_data(payload)
    }

    async fn translate_response(&self, model_response: Value) -> Result<Value, ApiError> {
        Ok(model_response)
    }

    fn make_benchmark_payload(&self) -> Self::Payload {
        InputData::for_test()
    }
}

/// Streaming adapter for `/generate_stream`, grounded in
/// `GenerateStreamHandler`. The engine's buffered `translate_response` path
/// isn't exercised for this adapter in practice -- a deployment wiring this
/// in would mount it behind its own route that forwards
/// `reqwest::Response::bytes_stream()` directly rather than buffering JSON,
/// the same way the reference handler swaps `web.json_response` for a
/// chunked `web.StreamResponse`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenerateStreamAdapter;

#[async_trait]
impl EndpointAdapter for GenerateStreamAdapter {
    type Payload = InputData;

    fn endpoint(&self) -> &str {
        "/generate_stream"
    }

    fn parse_payload(&self, payload: &Value) -> Result<Self::Payload, FieldErrors> {
        parse_input_data(payload)
    }

    async fn translate_response(&self, model_response: Value) -> Result<Value, ApiError> {
        Ok(model_response)
    }

    fn make_benchmark_payload(&self) -> Self::Payload {
        InputData::for_test()
    }
}

/// Log rules for the stock `hello_world` model-server log format (§4.6).
pub fn log_rules() -> Vec<LogRule> {
    vec![
        LogRule::new(LogAction::ModelLoaded, "infer server has started"),
        LogRule::new(LogAction::Info, "\"message\":\"Download"),
        LogRule::new(LogAction::ModelError, "Exception: corrupted model file"),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn workload_counts_words_not_bytes() {
        let payload = InputData {
            prompt: "one two three".to_owned(),
            max_response_tokens: 10,
        };
        assert_eq!(payload.count_workload(), 3.0);
    }

    #[test]
    fn missing_prompt_is_reported_by_field_name() {
        let errors = parse_input_data(&serde_json::json!({ "max_response_tokens": 10 })).unwrap_err();
        assert_eq!(errors.get("prompt").map(String::as_str), Some("missing parameter"));
    }
}
