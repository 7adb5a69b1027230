use std::fs::OpenOptions;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init_tracing() {
    init_tracing_with_service("chatrelay");
}

/// Log to stderr at INFO (overridable with `CHATRELAY_LOG`), plus a DEBUG
/// file log when `CHATRELAY_LOG_FILE` is set.
pub fn init_tracing_with_service(service_name: &str) {
    let file_logging = std::env::var("CHATRELAY_LOG_FILE").ok();

    let stderr_filter =
        EnvFilter::try_from_env("CHATRELAY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    match file_logging.map(|path| (OpenOptions::new().create(true).append(true).open(&path), path)) {
        Some((Ok(file), path)) => {
            let file_layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG);

            registry.with(file_layer).init();
            tracing::info!(service = service_name, log_file = %path, "file logging enabled");
        }
        Some((Err(e), path)) => {
            registry.init();
            tracing::warn!(service = service_name, log_file = %path, error = %e, "could not open log file");
        }
        None => {
            registry.init();
            tracing::info!(service = service_name, "logging initialized");
        }
    }
}
