use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

use crate::HumanDuration;

/// Telemetry configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name for telemetry metadata
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Additional resource attributes
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
    /// OTLP exporter shared by traces and metrics
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
    /// Trace sampling ratio between 0.0 and 1.0
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Log filter directive, overridden by `RUST_LOG`
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            resource_attributes: HashMap::new(),
            exporter: None,
            sampling_rate: default_sampling_rate(),
            log_filter: None,
            json_logs: false,
        }
    }
}

/// OTLP exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// OTLP endpoint URL
    pub endpoint: Url,
    /// Export protocol
    #[serde(default)]
    pub protocol: ExportProtocol,
    /// Metric export interval
    #[serde(default = "default_export_interval")]
    pub export_interval: HumanDuration,
}

/// OTLP export protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    /// gRPC (default)
    #[default]
    Grpc,
    /// HTTP/protobuf
    HttpProto,
}

fn default_service_name() -> String {
    "tollgate".to_string()
}

const fn default_sampling_rate() -> f64 {
    1.0
}

const fn default_export_interval() -> HumanDuration {
    HumanDuration::from_secs(30)
}
