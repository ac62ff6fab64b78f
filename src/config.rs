//! Transport selection and pipeline assembly.
//!
//! [`CollectorConfig`] is a discriminated configuration: the `collector` tag
//! selects the sender variant, and serde's tagged-enum dispatch is the
//! registry mapping discriminator strings to constructors. The hosting
//! process deserializes it from whatever configuration source it uses
//! (loading and merging are external concerns) and calls
//! [`build`](CollectorConfig::build) once to assemble a pipeline.
//!
//! Validation happens at construction: malformed endpoints, out-of-range
//! sample rates, or missing broker addresses fail the build before anything
//! starts.

use crate::amqp::AmqpSender;
use crate::http::HttpSender;
use crate::kafka::KafkaSender;
use crate::lifecycle::{PipelineLifecycle, StartupCheckPolicy};
use crate::metrics::MetricsSink;
use crate::reporter::{BatchingReporter, ReporterConfig, ReporterHandle};
use crate::sampler::SamplingPolicy;
use crate::sender::{ConsoleSender, NoopSender, SenderBoxed};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Construction-time configuration failure. Fatal: the pipeline is not
/// started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint `{url}`: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("sample rate {0} outside [0.0, 1.0]")]
    InvalidSampleRate(f32),
    #[error("bootstrapServers must not be empty")]
    MissingBootstrapServers,
    #[error("addresses must not be empty")]
    MissingAddresses,
    #[error("connectionTimeout must be at least 1ms")]
    ConnectionTimeoutTooSmall,
    #[error("http client error: {0}")]
    HttpClient(String),
    #[error("broker client error: {0}")]
    Broker(String),
}

/// Reporting fields common to every collector variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Local service name announced to the external tracer.
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default = "default_service_host")]
    pub service_host: String,
    #[serde(default = "default_service_port")]
    pub service_port: u16,
    /// Probability in [0, 1] that a new trace is recorded.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,
    /// Whether the external tracer should generate 128-bit trace ids.
    #[serde(default)]
    pub trace_id_128_bit: bool,
    /// Maximum age of a batch before it is flushed.
    #[serde(with = "humantime_serde", default = "default_report_timeout")]
    pub report_timeout: Duration,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            service_name: None,
            service_host: default_service_host(),
            service_port: default_service_port(),
            sample_rate: default_sample_rate(),
            trace_id_128_bit: false,
            report_timeout: default_report_timeout(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_service_host() -> String {
    "127.0.0.1".to_string()
}

fn default_service_port() -> u16 {
    8080
}

fn default_sample_rate() -> f32 {
    1.0
}

fn default_report_timeout() -> Duration {
    Duration::from_secs(1)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleConfig {
    #[serde(flatten)]
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmptyConfig {
    #[serde(flatten)]
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(flatten)]
    pub reporting: ReportingConfig,
    /// Collector base URL; the span endpoint is resolved against it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Full span endpoint, overriding `baseUrl` resolution when set.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
}

impl HttpConfig {
    /// Resolves the span endpoint, validating the URL.
    pub fn endpoint_url(&self) -> Result<reqwest::Url, ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            return reqwest::Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
                url: endpoint.clone(),
                reason: e.to_string(),
            });
        }

        let base =
            reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidEndpoint {
                url: self.base_url.clone(),
                reason: e.to_string(),
            })?;
        base.join("api/v2/spans")
            .map_err(|e| ConfigError::InvalidEndpoint {
                url: self.base_url.clone(),
                reason: e.to_string(),
            })
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:9411/".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConfig {
    #[serde(flatten)]
    pub reporting: ReportingConfig,
    /// Comma-separated broker list, handed to the client verbatim.
    #[serde(default)]
    pub bootstrap_servers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Arbitrary broker-client settings passed through untouched.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

fn default_topic() -> String {
    "zipkin".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmqpConfig {
    #[serde(flatten)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default = "default_amqp_user")]
    pub username: String,
    #[serde(default = "default_amqp_user")]
    pub password: String,
    #[serde(default = "default_virtual_host")]
    pub virtual_host: String,
    #[serde(with = "humantime_serde", default = "default_connection_timeout")]
    pub connection_timeout: Duration,
}

fn default_queue() -> String {
    "zipkin".to_string()
}

fn default_amqp_user() -> String {
    "guest".to_string()
}

fn default_virtual_host() -> String {
    "/".to_string()
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Discriminated collector configuration; the `collector` tag picks the
/// sender variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "collector", rename_all = "lowercase")]
pub enum CollectorConfig {
    Console(ConsoleConfig),
    Http(HttpConfig),
    Kafka(KafkaConfig),
    Amqp(AmqpConfig),
    #[serde(alias = "noop")]
    Empty(EmptyConfig),
}

/// An assembled pipeline: the producer-facing handle, the sampling policy,
/// and the lifecycle the host drives.
pub struct TracingPipeline {
    pub reporter: ReporterHandle,
    pub sampling: SamplingPolicy,
    pub lifecycle: PipelineLifecycle,
}

impl CollectorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Console(_) => "console",
            Self::Http(_) => "http",
            Self::Kafka(_) => "kafka",
            Self::Amqp(_) => "amqp",
            Self::Empty(_) => "empty",
        }
    }

    pub fn reporting(&self) -> &ReportingConfig {
        match self {
            Self::Console(c) => &c.reporting,
            Self::Http(c) => &c.reporting,
            Self::Kafka(c) => &c.reporting,
            Self::Amqp(c) => &c.reporting,
            Self::Empty(c) => &c.reporting,
        }
    }

    /// Constructs the sender this configuration selects.
    pub fn build_sender(&self) -> Result<Arc<dyn SenderBoxed>, ConfigError> {
        let sender: Arc<dyn SenderBoxed> = match self {
            Self::Console(_) => {
                tracing::info!("sending spans to console");
                Arc::new(ConsoleSender::new())
            }
            Self::Http(config) => {
                let sender = HttpSender::new(config)?;
                tracing::info!(endpoint = %sender.endpoint(), "sending spans to HTTP collector");
                Arc::new(sender)
            }
            Self::Kafka(config) => {
                let sender = KafkaSender::new(config)?;
                tracing::info!(
                    topic = %config.topic,
                    servers = %config.bootstrap_servers,
                    "sending spans to Kafka topic"
                );
                Arc::new(sender)
            }
            Self::Amqp(config) => {
                let sender = AmqpSender::new(config)?;
                tracing::info!(
                    queue = %config.queue,
                    addresses = ?config.addresses,
                    "sending spans to AMQP queue"
                );
                Arc::new(sender)
            }
            Self::Empty(_) => {
                tracing::info!("dropping all collected spans");
                Arc::new(NoopSender::new())
            }
        };
        Ok(sender)
    }

    /// Assembles the full pipeline, or `None` when reporting is disabled.
    ///
    /// The caller keeps the returned value explicitly; there is no implicit
    /// process-wide instance.
    pub async fn build(
        &self,
        metrics: Arc<dyn MetricsSink>,
        startup: StartupCheckPolicy,
    ) -> Result<Option<TracingPipeline>, ConfigError> {
        let reporting = self.reporting();
        if !reporting.enabled {
            tracing::warn!("tracing is disabled");
            return Ok(None);
        }

        let sampling = SamplingPolicy::with_rate(reporting.sample_rate)?;
        let sender = self.build_sender()?;

        tracing::info!(
            service = reporting.service_name.as_deref().unwrap_or("<unnamed>"),
            host = %reporting.service_host,
            port = reporting.service_port,
            "registering tracing service"
        );

        let reporter_config = ReporterConfig {
            report_timeout: reporting.report_timeout,
            ..Default::default()
        };
        let reporter =
            BatchingReporter::new(reporter_config, Arc::clone(&sender), metrics).await;
        let lifecycle = PipelineLifecycle::new(reporter, sender, startup);
        let reporter = lifecycle.reporter();

        Ok(Some(TracingPipeline {
            reporter,
            sampling,
            lifecycle,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;

    #[test]
    fn test_http_config_from_yaml() {
        let config: CollectorConfig = serde_yaml::from_str(
            "enabled: true\n\
             collector: http\n\
             baseUrl: http://example.com:1234/zipkin/\n\
             connectTimeout: 10s\n\
             readTimeout: 2s\n\
             reportTimeout: 3s\n",
        )
        .unwrap();

        assert_eq!(config.kind(), "http");
        assert_eq!(config.reporting().report_timeout, Duration::from_secs(3));

        let CollectorConfig::Http(http) = config else {
            panic!("expected http variant");
        };
        assert_eq!(http.base_url, "http://example.com:1234/zipkin/");
        assert_eq!(http.connect_timeout, Duration::from_secs(10));
        assert_eq!(http.read_timeout, Duration::from_secs(2));
        assert_eq!(
            http.endpoint_url().unwrap().as_str(),
            "http://example.com:1234/zipkin/api/v2/spans"
        );
    }

    #[test]
    fn test_explicit_endpoint_overrides_base_url() {
        let config: CollectorConfig = serde_yaml::from_str(
            "collector: http\n\
             endpoint: http://collector:9411/custom/spans\n",
        )
        .unwrap();

        let CollectorConfig::Http(http) = config else {
            panic!("expected http variant");
        };
        assert_eq!(
            http.endpoint_url().unwrap().as_str(),
            "http://collector:9411/custom/spans"
        );
    }

    #[test]
    fn test_kafka_config_from_yaml() {
        let config: CollectorConfig = serde_yaml::from_str(
            "collector: kafka\n\
             bootstrapServers: broker1:9092,broker2:9092\n\
             overrides:\n\
             \x20 compression.type: lz4\n",
        )
        .unwrap();

        let CollectorConfig::Kafka(kafka) = config else {
            panic!("expected kafka variant");
        };
        assert_eq!(kafka.bootstrap_servers, "broker1:9092,broker2:9092");
        assert_eq!(kafka.topic, "zipkin");
        assert_eq!(kafka.overrides.get("compression.type").unwrap(), "lz4");
    }

    #[test]
    fn test_amqp_config_defaults() {
        let config: CollectorConfig = serde_yaml::from_str(
            "collector: amqp\n\
             addresses:\n\
             \x20 - rabbit1:5672\n\
             \x20 - rabbit2:5672\n",
        )
        .unwrap();

        let CollectorConfig::Amqp(amqp) = config else {
            panic!("expected amqp variant");
        };
        assert_eq!(amqp.addresses.len(), 2);
        assert_eq!(amqp.queue, "zipkin");
        assert_eq!(amqp.username, "guest");
        assert_eq!(amqp.password, "guest");
        assert_eq!(amqp.virtual_host, "/");
        assert_eq!(amqp.connection_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_reporting_defaults() {
        let config: CollectorConfig = serde_yaml::from_str("collector: console\n").unwrap();
        let reporting = config.reporting();

        assert!(reporting.enabled);
        assert_eq!(reporting.service_name, None);
        assert_eq!(reporting.service_host, "127.0.0.1");
        assert_eq!(reporting.service_port, 8080);
        assert_eq!(reporting.sample_rate, 1.0);
        assert!(!reporting.trace_id_128_bit);
        assert_eq!(reporting.report_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_empty_variant_accepts_noop_alias() {
        let config: CollectorConfig = serde_yaml::from_str("collector: empty\n").unwrap();
        assert_eq!(config.kind(), "empty");

        let config: CollectorConfig = serde_yaml::from_str("collector: noop\n").unwrap();
        assert_eq!(config.kind(), "empty");
    }

    #[test]
    fn test_unknown_collector_rejected() {
        assert!(serde_yaml::from_str::<CollectorConfig>("collector: scribe\n").is_err());
    }

    #[tokio::test]
    async fn test_disabled_config_builds_no_pipeline() {
        let config: CollectorConfig =
            serde_yaml::from_str("collector: console\nenabled: false\n").unwrap();

        let pipeline = config
            .build(Arc::new(NoopMetrics::new()), StartupCheckPolicy::default())
            .await
            .unwrap();
        assert!(pipeline.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_sample_rate_fails_build() {
        let config: CollectorConfig =
            serde_yaml::from_str("collector: console\nsampleRate: 1.5\n").unwrap();

        assert!(matches!(
            config
                .build(Arc::new(NoopMetrics::new()), StartupCheckPolicy::default())
                .await,
            Err(ConfigError::InvalidSampleRate(_))
        ));
    }

    #[tokio::test]
    async fn test_console_pipeline_builds_and_stops() {
        let config: CollectorConfig = serde_yaml::from_str("collector: console\n").unwrap();

        let mut pipeline = config
            .build(Arc::new(NoopMetrics::new()), StartupCheckPolicy::FailFast)
            .await
            .unwrap()
            .expect("enabled pipeline");

        pipeline.lifecycle.start().await.unwrap();
        pipeline.lifecycle.stop().await.unwrap();
    }

    #[test]
    fn test_malformed_base_url_fails_sender_build() {
        let config: CollectorConfig =
            serde_yaml::from_str("collector: http\nbaseUrl: '::not a url::'\n").unwrap();

        assert!(matches!(
            config.build_sender(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }
}
