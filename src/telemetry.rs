use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with a JSON fmt layer and env-based filtering.
///
/// Call once at process startup; library code only emits events.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().json().with_target(false))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,redis=warn")),
        )
        .init();
}
