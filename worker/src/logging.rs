use slog::{self, slog_o, Drain};

use crate::error::ApiError;

/// `human_logs` selects a terminal-friendly formatter for local runs; the
/// default is machine-parseable (one event per line, envlogger-filterable via
/// `RUST_LOG`), matching how the container this worker runs in collects logs.
pub fn init_logging(human_logs: bool) -> Result<(), ApiError> {
    let drain = if human_logs {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_envlogger::new(drain);
        slog_async::Async::new(drain).build().fuse()
    } else {
        let decorator = slog_term::PlainDecorator::new(std::io::stdout());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_envlogger::new(drain);
        slog_async::Async::new(drain).build().fuse()
    };
    let logger = slog::Logger::root(drain, slog_o!());

    // XXX: cancel slog_scope's NoGlobalLoggerSet for now, it's difficult to
    // prevent it from potentially panicing during tests. reset_logging resets
    // the global logger during shutdown anyway:
    // https://github.com/slog-rs/slog/issues/169
    slog_scope::set_global_logger(logger).cancel_reset();
    slog_stdlog::init().ok();
    Ok(())
}

pub fn reset_logging() {
    let logger = slog::Logger::root(slog::Discard, slog_o!());
    slog_scope::set_global_logger(logger).cancel_reset();
}
