//! Workload accounting (§3, §4.4) and the wire status report (§6) it feeds.
//!
//! `Metrics` is the single mutex-protected shared resource in this process
//! (§5): every event hook below runs under one lock, so updates are atomic
//! with respect to each other without any finer-grained synchronization.
use std::collections::BTreeSet;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use std::sync::Mutex;

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Disk-usage and model-loading bookkeeping (§3 `SystemMetrics`).
#[derive(Debug)]
pub struct SystemMetrics {
    pub model_loading_start: f64,
    pub model_loading_time: Option<f64>,
    pub last_disk_usage_gb: f64,
    pub additional_disk_usage_gb: f64,
    pub model_is_loaded: bool,
}

impl SystemMetrics {
    fn new() -> Self {
        let last_disk_usage_gb = worker_common::disk_usage_gb();
        Self {
            model_loading_start: epoch_seconds(),
            model_loading_time: None,
            last_disk_usage_gb,
            additional_disk_usage_gb: 0.0,
            model_is_loaded: false,
        }
    }

    /// Refreshes `additional_disk_usage_GB` against the last-seen total and
    /// rolls `last_disk_usage_GB` forward. Called once per reporter tick.
    pub fn update_disk_usage(&mut self) {
        let current = worker_common::disk_usage_gb();
        self.additional_disk_usage_gb = (current - self.last_disk_usage_gb).max(0.0);
        self.last_disk_usage_gb = current;
    }

    /// Clears `model_loading_time` after it has been reported once (§3
    /// invariant: the autoscaler gets exactly one non-zero `loadtime`).
    pub fn reset(&mut self) {
        self.model_loading_time = None;
    }
}

/// Per-request workload counters (§3 `ModelMetrics`).
#[derive(Debug, Default)]
pub struct ModelMetrics {
    pub workload_pending: f64,
    pub workload_received: f64,
    pub workload_served: f64,
    pub workload_cancelled: f64,
    pub workload_errored: f64,
    pub cur_perf: f64,
    pub max_throughput: f64,
    pub error_msg: Option<String>,
    pub requests_received: BTreeSet<i64>,
    pub requests_working: BTreeSet<i64>,
}

impl ModelMetrics {
    /// `workload_received − workload_cancelled`, floored at zero: the portion
    /// of accepted workload that is still in flight toward the model server.
    pub fn workload_processing(&self) -> f64 {
        (self.workload_received - self.workload_cancelled).max(0.0)
    }

    /// Clears the per-interval counters after a successful report, leaving
    /// `requests_received` and `max_throughput` untouched (§3).
    pub fn reset_volatile(&mut self) {
        self.workload_received = 0.0;
        self.workload_served = 0.0;
        self.workload_cancelled = 0.0;
        self.workload_errored = 0.0;
        self.requests_working.clear();
    }
}

/// The mutex-protected aggregate the Engine, Log Tailer, and Reporter share.
pub struct Metrics {
    container_id: i64,
    report_url: String,
    inner: Mutex<Inner>,
}

struct Inner {
    system: SystemMetrics,
    model: ModelMetrics,
    last_send: Instant,
    update_pending: bool,
}

impl Metrics {
    pub fn new(container_id: i64, report_url: String) -> Self {
        Self {
            container_id,
            report_url,
            inner: Mutex::new(Inner {
                system: SystemMetrics::new(),
                model: ModelMetrics::default(),
                last_send: Instant::now(),
                update_pending: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("metrics mutex poisoned")
    }

    pub fn request_start(&self, workload: f64, reqnum: i64) {
        let mut inner = self.lock();
        inner.model.workload_pending += workload;
        inner.model.workload_received += workload;
        inner.model.requests_received.insert(reqnum);
        inner.model.requests_working.insert(reqnum);
    }

    pub fn request_end(&self, workload: f64, elapsed: std::time::Duration, reqnum: i64) {
        let mut inner = self.lock();
        inner.model.workload_pending -= workload;
        inner.model.workload_served += workload;
        inner.model.requests_working.remove(&reqnum);
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            inner.model.cur_perf = workload / secs;
        }
        inner.update_pending = true;
    }

    pub fn request_errored(&self, workload: f64, reqnum: i64) {
        let mut inner = self.lock();
        inner.model.workload_pending -= workload;
        inner.model.workload_errored += workload;
        inner.model.requests_working.remove(&reqnum);
    }

    pub fn request_canceled(&self, workload: f64, reqnum: i64) {
        let mut inner = self.lock();
        inner.model.workload_pending -= workload;
        inner.model.workload_cancelled += workload;
        inner.model.requests_working.remove(&reqnum);
    }

    /// The log tailer's sole entry point for a successful first benchmark
    /// (§4.6): announces the measured throughput and the elapsed load time.
    pub fn model_loaded(&self, max_throughput: f64) {
        let mut inner = self.lock();
        let now = epoch_seconds();
        inner.system.model_loading_time = Some(now - inner.system.model_loading_start);
        inner.system.model_is_loaded = true;
        inner.model.max_throughput = max_throughput;
    }

    /// The log tailer's sole entry point for a fatal model-server error
    /// (§4.6): resets volatile workload counters and latches `error_msg`.
    pub fn model_errored(&self, message: String) {
        let mut inner = self.lock();
        inner.model.reset_volatile();
        inner.model.error_msg = Some(message);
        inner.system.model_is_loaded = true;
    }

    pub fn model_is_loaded(&self) -> bool {
        self.lock().system.model_is_loaded
    }

    /// Whether the reporter should send now (§4.5).
    pub fn should_send(&self, elapsed_since_last_send: std::time::Duration) -> bool {
        let inner = self.lock();
        let elapsed = elapsed_since_last_send.as_secs_f64();
        (!inner.system.model_is_loaded && elapsed >= 10.0) || inner.update_pending || elapsed > 10.0
    }

    /// Builds the outbound wire report and, on the caller's signal that the
    /// send attempt is finished (success or exhausted retries), performs the
    /// §4.5 post-send reset atomically with the snapshot just taken.
    pub fn snapshot_and_reset(&self, advertised_url: &str) -> AutoscalerStatus {
        let mut inner = self.lock();
        inner.system.update_disk_usage();
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_send).as_secs_f64().max(f64::EPSILON);

        let status = AutoscalerStatus {
            id: self.container_id,
            loadtime: inner.system.model_loading_time.unwrap_or(0.0),
            cur_load: inner.model.workload_processing() / elapsed,
            error_msg: inner.model.error_msg.clone().unwrap_or_default(),
            max_perf: inner.model.max_throughput,
            cur_perf: inner.model.cur_perf,
            cur_capacity: 0.0,
            max_capacity: 0.0,
            num_requests_working: inner.model.requests_working.len() as u64,
            num_requests_received: inner.model.requests_received.len() as u64,
            additional_disk_usage: inner.system.additional_disk_usage_gb,
            url: advertised_url.to_owned(),
        };

        inner.update_pending = false;
        inner.model.reset_volatile();
        inner.system.reset();
        inner.last_send = now;

        status
    }

    pub fn report_url(&self) -> &str {
        &self.report_url
    }

    #[cfg(test)]
    pub(crate) fn workload_cancelled(&self) -> f64 {
        self.lock().model.workload_cancelled
    }
}

/// The JSON body posted to `{REPORT_ADDR}/worker_status/` (§3, §6). Field
/// names and order are a wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct AutoscalerStatus {
    pub id: i64,
    pub loadtime: f64,
    pub cur_load: f64,
    pub error_msg: String,
    pub max_perf: f64,
    pub cur_perf: f64,
    pub cur_capacity: f64,
    pub max_capacity: f64,
    pub num_requests_working: u64,
    pub num_requests_received: u64,
    pub additional_disk_usage: f64,
    pub url: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn request_start_then_end_clears_pending() {
        let m = Metrics::new(1, "http://autoscaler".to_owned());
        m.request_start(10.0, 1);
        assert_eq!(m.lock().model.workload_pending, 10.0);
        m.request_end(10.0, Duration::from_secs(1), 1);
        let inner = m.lock();
        assert_eq!(inner.model.workload_pending, 0.0);
        assert_eq!(inner.model.workload_served, 10.0);
        assert_eq!(inner.model.cur_perf, 10.0);
        assert!(!inner.model.requests_working.contains(&1));
    }

    #[test]
    fn canceled_request_is_not_double_counted() {
        let m = Metrics::new(1, "http://autoscaler".to_owned());
        m.request_start(5.0, 9);
        m.request_canceled(5.0, 9);
        let inner = m.lock();
        assert_eq!(inner.model.workload_pending, 0.0);
        assert_eq!(inner.model.workload_cancelled, 5.0);
        assert!(!inner.model.requests_working.contains(&9));
    }

    #[test]
    fn model_errored_resets_volatile_but_keeps_received() {
        let m = Metrics::new(1, "http://autoscaler".to_owned());
        m.request_start(3.0, 1);
        m.model_errored("boom".to_owned());
        let inner = m.lock();
        assert_eq!(inner.model.workload_received, 0.0);
        assert!(inner.model.requests_received.contains(&1));
        assert_eq!(inner.model.error_msg.as_deref(), Some("boom"));
    }

    #[test]
    fn loadtime_is_reported_once() {
        let m = Metrics::new(1, "http://autoscaler".to_owned());
        m.model_loaded(200.0);
        let first = m.snapshot_and_reset("http://worker");
        assert!(first.loadtime > 0.0);
        let second = m.snapshot_and_reset("http://worker");
        assert_eq!(second.loadtime, 0.0);
    }
}
