use tracing_subscriber::EnvFilter;
use velox_config::{LogConfig, LogFormat};

const SERVER_DEFAULT_FILTER: &str = "velox=info";

/// `RUST_LOG` wins over the configured level when set.
pub fn init_build(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match log.format() {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

pub fn init_server() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(SERVER_DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();
}
