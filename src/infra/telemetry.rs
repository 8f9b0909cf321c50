use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_gauge!(
            "schemat_pool_available_pages",
            Unit::Count,
            "Render pages currently idle in the pool."
        );
        describe_counter!(
            "schemat_renders_total",
            Unit::Count,
            "Total number of completed renders."
        );
        describe_counter!(
            "schemat_render_failures_total",
            Unit::Count,
            "Total number of failed renders."
        );
        describe_counter!(
            "schemat_page_create_failures_total",
            Unit::Count,
            "Total number of failed render-page creation attempts."
        );
        describe_histogram!(
            "schemat_render_ms",
            Unit::Milliseconds,
            "End-to-end render latency in milliseconds."
        );
        describe_histogram!(
            "schemat_page_create_ms",
            Unit::Milliseconds,
            "Render-page creation latency in milliseconds."
        );
    });
}
