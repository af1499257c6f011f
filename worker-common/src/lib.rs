#![warn(rust_2018_idioms)]

use sysinfo::{DiskExt, System, SystemExt};

/// Implemented by every crate-local error type so callers can decide, uniformly,
/// whether a failure is worth logging at `error!` level and what metric label
/// (if any) it should be folded under.
pub trait ReportableError {
    fn error_backtrace(&self) -> String;
    fn is_reportable(&self) -> bool;
    fn metric_label(&self) -> Option<String>;
}

/// Types that can represent an opaque internal error, used by code that only knows
/// how to produce a message and needs to hand it to a generic error type.
pub trait InternalError {
    fn internal_error(message: String) -> Self;
}

#[macro_export]
macro_rules! from_error {
    ($from:ty, $to:ty, $to_kind:expr) => {
        impl From<$from> for $to {
            fn from(inner: $from) -> $to {
                $to_kind(inner).into()
            }
        }
    };
}

#[macro_export]
macro_rules! impl_fmt_display {
    ($error:ty, $kind:ty) => {
        impl std::fmt::Display for $error {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.kind, formatter)
            }
        }
    };
}

/// Total used space, in GB, across every disk `sysinfo` can see.
///
/// Mirrors the `psutil.disk_usage("/").used` call the Python lineage of this
/// worker made; `sysinfo` doesn't expose a single-mountpoint query on every
/// platform, so we sum used space across all disks instead.
pub fn disk_usage_gb() -> f64 {
    let mut system = System::new();
    system.refresh_disks_list();
    system.refresh_disks();
    let used_bytes: u64 = system
        .disks()
        .iter()
        .map(|disk| disk.total_space().saturating_sub(disk.available_space()))
        .sum();
    used_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}
