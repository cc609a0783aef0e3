use procprom_common::error::{ProcpromError, Result};
use serde::Deserialize;
use tracing::debug;

use crate::collectors::{DEFAULT_SYSTEM_PREFIX, SystemMetrics, shared_system_metrics};
use crate::encoder::PrometheusEncoder;
use crate::types::{Metric, MetricType, MetricValue, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTupleKind")]
pub enum TupleKind {
    Counter,
    Gauge,
}

impl TupleKind {
    pub fn metric_type(&self) -> MetricType {
        match self {
            Self::Counter => MetricType::Counter,
            Self::Gauge => MetricType::Gauge,
        }
    }
}

impl TryFrom<u8> for TupleKind {
    type Error = ProcpromError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Counter),
            1 => Ok(Self::Gauge),
            other => Err(ProcpromError::InvalidArgument(format!(
                "unknown metric tuple kind: {other}"
            ))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTupleKind {
    Code(u8),
    Name(String),
}

impl TryFrom<RawTupleKind> for TupleKind {
    type Error = ProcpromError;

    fn try_from(raw: RawTupleKind) -> Result<Self> {
        match raw {
            RawTupleKind::Code(code) => Self::try_from(code),
            RawTupleKind::Name(name) => match name.as_str() {
                "counter" => Ok(Self::Counter),
                "gauge" => Ok(Self::Gauge),
                other => Err(ProcpromError::InvalidArgument(format!(
                    "unknown metric tuple kind: {other}"
                ))),
            },
        }
    }
}

/// Flat description of a single-sample metric.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricTuple {
    pub kind: TupleKind,
    pub name: String,
    pub help: String,
    pub value: MetricValue,
}

impl MetricTuple {
    pub fn new(
        kind: TupleKind,
        name: impl Into<String>,
        help: impl Into<String>,
        value: impl Into<MetricValue>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            help: help.into(),
            value: value.into(),
        }
    }

    pub fn into_metric(self) -> Metric {
        Metric::new(self.name, self.help, self.kind.metric_type())
            .with_sample(Sample::new(self.value))
    }
}

#[derive(Debug, Clone)]
pub struct TupleConfig {
    pub prefix: String,
    pub tuples: Vec<MetricTuple>,
    pub sys_metrics: bool,
    /// Prefix for the system metrics only; `process_` when unset.
    pub sys_prefix: Option<String>,
}

impl TupleConfig {
    pub fn new(prefix: impl Into<String>, tuples: Vec<MetricTuple>) -> Self {
        Self {
            prefix: prefix.into(),
            tuples,
            sys_metrics: true,
            sys_prefix: None,
        }
    }
}

impl PrometheusEncoder {
    /// Builds an encoder from tuples, snapshotting the process-wide system
    /// collector first when `sys_metrics` is set.
    pub async fn from_tuples(config: TupleConfig) -> Self {
        Self::from_tuples_with(config, shared_system_metrics()).await
    }

    pub async fn from_tuples_with(config: TupleConfig, system: &SystemMetrics) -> Self {
        let TupleConfig {
            prefix,
            tuples,
            sys_metrics,
            sys_prefix,
        } = config;

        let encoder = Self::new(prefix);
        if sys_metrics {
            let sys_prefix = sys_prefix.as_deref().unwrap_or(DEFAULT_SYSTEM_PREFIX);
            encoder.append(system.collect(sys_prefix).await);
        }

        debug!(count = tuples.len(), "appending tuple metrics");
        encoder.append(tuples.into_iter().map(MetricTuple::into_metric));
        encoder
    }

    /// Positional form of [`PrometheusEncoder::from_tuples`] with system
    /// metrics enabled.
    pub async fn with_tuples(prefix: impl Into<String>, tuples: Vec<MetricTuple>) -> Self {
        Self::from_tuples(TupleConfig::new(prefix, tuples)).await
    }
}
