//! Autoscaler Reporter (§4.5): a periodic task that tells the control plane
//! how loaded this node is.
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::metrics::{AutoscalerStatus, Metrics};

const TICK: Duration = Duration::from_secs(1);
const SEND_ATTEMPTS: u32 = 3;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Runs forever, ticking once a second. Never returns; intended to be
/// `tokio::spawn`ed alongside the HTTP listener and the Log Tailer.
pub async fn run(metrics: Arc<Metrics>, client: reqwest::Client, advertised_url: String) {
    let mut last_tick = Instant::now();
    loop {
        tokio::time::sleep(TICK).await;
        let elapsed = last_tick.elapsed();
        if metrics.should_send(elapsed) {
            let status = metrics.snapshot_and_reset(&advertised_url);
            last_tick = Instant::now();
            send_with_retry(&client, metrics.report_url(), &status).await;
        }
    }
}

/// POSTs the status up to [`SEND_ATTEMPTS`] times, sleeping [`RETRY_DELAY`]
/// between attempts. Every outcome -- success or exhausted retries -- is
/// logged; §7 `ReporterFailure` is swallowed by design, the next tick sends
/// fresh values regardless.
async fn send_with_retry(client: &reqwest::Client, report_url: &str, status: &AutoscalerStatus) {
    let url = format!("{}/worker_status/", report_url.trim_end_matches('/'));
    for attempt in 1..=SEND_ATTEMPTS {
        let result = client
            .post(&url)
            .timeout(ATTEMPT_TIMEOUT)
            .json(status)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("reported status to autoscaler"; "attempt" => attempt);
                return;
            }
            Ok(resp) => {
                warn!("autoscaler report rejected"; "attempt" => attempt, "status" => resp.status().as_u16());
            }
            Err(e) => {
                warn!("autoscaler report failed"; "attempt" => attempt, "error" => %e);
            }
        }
        if attempt < SEND_ATTEMPTS {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    error!("autoscaler report exhausted all retries");
}
