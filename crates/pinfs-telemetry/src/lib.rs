//! OpenTelemetry integration for pinfs.
//!
//! Provides the OTel tracing layer and a sampler with differentiated rates by
//! span category. Built only with the `telemetry` feature; without it,
//! [`otel_enabled`] is still available so callers can warn about ignored
//! settings.
//!
//! # Activation
//!
//! OTel export activates when standard OTel environment variables are set:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 pinfs ls
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{OtelGuard, otel_layer};

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    let var = |name: &str| std::env::var(name).ok();
    otel_enabled_with(var)
}

fn otel_enabled_with(var: impl Fn(&str) -> Option<String>) -> bool {
    // Explicit disable takes priority
    if var("OTEL_SDK_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        return true;
    }

    // Any traces exporter other than "none"
    var("OTEL_TRACES_EXPORTER").is_some_and(|exporter| !exporter.eq_ignore_ascii_case("none"))
}

/// Sampling rate for a span, by name prefix.
///
/// | Prefix      | Rate | Rationale                                  |
/// |-------------|------|--------------------------------------------|
/// | `index.*`   | 100% | Index flushes decide remote consistency    |
/// | `channel.*` | 100% | Remote round trips, where failures happen  |
/// | `fs.*`      | 10%  | High volume facade calls                   |
/// | other       | 10%  | Default for unclassified spans             |
pub fn sample_rate(span_name: &str) -> f64 {
    if span_name.starts_with("index") || span_name.starts_with("channel") {
        1.0
    } else {
        0.1
    }
}
