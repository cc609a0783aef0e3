//! Process telemetry rendered in the Prometheus text exposition format.
//!
//! [`SystemMetrics`] snapshots CPU, memory, descriptor and runtime statistics
//! as plain [`Metric`] values; [`PrometheusEncoder`] collects metrics from any
//! source and renders them with a common name prefix.

pub mod collectors;
pub mod encoder;
pub mod tuples;
pub mod types;

pub use collectors::{
    DEFAULT_SYSTEM_PREFIX, HostProbe, ProcessProbe, SystemMetrics, shared_system_metrics,
};
pub use encoder::{CONTENT_TYPE, PrometheusEncoder};
pub use tuples::{MetricTuple, TupleConfig, TupleKind};
pub use types::{Labels, Metric, MetricType, MetricValue, Sample};
