//! Tracing subscriber setup shared by the binaries

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "ec2_optimizer=info";

/// Whether `EC2_OPTIMIZER_LOG_JSON` asks for JSON log lines
pub fn json_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// the invocation summary. Calling it twice is a no-op.
pub fn init() {
    let json = json_requested(std::env::var("EC2_OPTIMIZER_LOG_JSON").ok().as_deref());

    let (json_layer, plain_layer) = if json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(json_layer)
        .with(plain_layer)
        .try_init();
}
