use tracing_subscriber::{fmt, EnvFilter};

/// Used when `RUST_LOG` is unset: SDK events at info, reqwest/hyper chatter only on warn.
pub const DEFAULT_FILTER: &str = "warn,crosswallet=info";

/// Switches the subscriber to JSON lines.
pub const JSON_ENV: &str = "CROSSWALLET_LOG_JSON";

fn json_requested(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

/// Install a stderr subscriber for hosts that don't bring their own.
/// A host that already set a global subscriber keeps it.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let use_json = json_requested(std::env::var(JSON_ENV).ok().as_deref());

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let _ = if use_json { builder.json().try_init() } else { builder.pretty().try_init() };
}
