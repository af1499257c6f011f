//! Log Tailer & lifecycle state machine (§4.6).
//!
//! Watches the model server's log file for the line announcing it has
//! finished loading, runs the one-shot benchmark, and watches thereafter for
//! fatal error substrings. Never propagates an error out of its task (§7):
//! every failure is folded into a `model_errored` call or a retry.
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::adapter::EndpointAdapter;
use crate::benchmark::Benchmarker;
use crate::metrics::Metrics;

const FILE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const EOF_BACKOFF: Duration = Duration::from_millis(100);
const PRE_BENCHMARK_DELAY: Duration = Duration::from_secs(5);

/// What a matched log line means for lifecycle state (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
    /// The model server has finished loading and is ready to accept traffic.
    ModelLoaded,
    /// The model server hit an unrecoverable error; the node transitions to
    /// `Errored` and stays there.
    ModelError,
    /// Worth surfacing in the local debug log; no state transition.
    Info,
}

/// One `(action, substring)` rule, matched against each tailed line in the
/// order supplied to [`run`].
pub struct LogRule {
    pub action: LogAction,
    pub substring: &'static str,
}

impl LogRule {
    pub const fn new(action: LogAction, substring: &'static str) -> Self {
        Self { action, substring }
    }
}

/// Tails `log_path` forever, running the benchmark on the first `ModelLoaded`
/// match and forwarding every `ModelError` match to `metrics.model_errored`.
/// Runs until the process exits; intended to be `tokio::spawn`ed.
pub async fn run<A: EndpointAdapter>(
    log_path: String,
    rules: Vec<LogRule>,
    metrics: Arc<Metrics>,
    benchmarker: Benchmarker<A>,
) {
    let file = loop {
        match File::open(&log_path).await {
            Ok(f) => break f,
            Err(_) => tokio::time::sleep(FILE_POLL_INTERVAL).await,
        }
    };
    // Read from the start: the `ModelLoaded` line may already have been
    // written between the model server creating the file and this tailer's
    // existence poll noticing it.
    let mut reader = BufReader::new(file);
    let mut errored = false;

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tokio::time::sleep(EOF_BACKOFF).await;
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("error reading model log"; "error" => %e);
                tokio::time::sleep(EOF_BACKOFF).await;
                continue;
            }
        }

        for rule in &rules {
            if !line.contains(rule.substring) {
                continue;
            }
            match rule.action {
                LogAction::ModelLoaded if !errored && !metrics.model_is_loaded() => {
                    tokio::time::sleep(PRE_BENCHMARK_DELAY).await;
                    match benchmarker.run().await {
                        Ok(max_throughput) => metrics.model_loaded(max_throughput),
                        Err(e) => {
                            error!("benchmark failed to connect"; "error" => %e);
                            metrics.model_errored(e.to_string());
                            errored = true;
                        }
                    }
                }
                LogAction::ModelLoaded => {}
                LogAction::ModelError => {
                    metrics.model_errored(rule.substring.to_owned());
                    errored = true;
                }
                LogAction::Info => {
                    debug!("model log"; "line" => line.trim_end());
                }
            }
            break;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rule_matches_first_hit_in_order() {
        let rules = vec![
            LogRule::new(LogAction::Info, "Download"),
            LogRule::new(LogAction::ModelLoaded, "has started"),
        ];
        let line = "infer server has started";
        let matched = rules.iter().find(|r| line.contains(r.substring));
        assert_eq!(matched.unwrap().action, LogAction::ModelLoaded);
    }
}
