use std::path::Path;
use std::sync::Once;

use tracing_appender::non_blocking::WorkerGuard;

static INIT: Once = Once::new();

/// JSON lines into `log_dir/versetype.jsonl`; the terminal belongs to the UI.
///
/// Only the first call installs a subscriber. The returned guard flushes the
/// writer when dropped, so hold it for the life of the process.
pub fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    let mut guard = None;
    INIT.call_once(|| {
        if std::fs::create_dir_all(log_dir).is_err() {
            return;
        }
        let file_appender = tracing_appender::rolling::never(log_dir, "versetype.jsonl");
        let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);

        let installed = tracing_subscriber::fmt()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("versetype=info")),
            )
            .try_init()
            .is_ok();

        if installed {
            guard = Some(worker);
        }
    });
    guard
}
