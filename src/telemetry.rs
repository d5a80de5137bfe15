use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::workflow::TransitionRequest;

/// Initialize structured logging on stderr.
///
/// `RUST_LOG` wins over the configured level. Calling this twice is harmless:
/// the second subscriber is rejected and the first stays installed.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if installed.is_ok() {
        tracing::debug!(json = config.json, level = %config.log_level, "Telemetry initialized");
    }
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one transition request
pub fn create_transition_span(request: &TransitionRequest, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "site_transition",
        site_id = %request.site_id,
        from = %request.from_stage,
        to = %request.to_stage,
        actor.id = %request.actor_id,
        role = %request.actor_role,
        correlation.id = correlation_id,
    )
}
