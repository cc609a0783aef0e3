use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
            Self::Untyped => "untyped",
        }
    }
}

/// A sample value. Numbers are classified on construction; the explicit
/// variants cover callers that already hold one of the special tokens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawMetricValue")]
pub enum MetricValue {
    Number(f64),
    PositiveInfinity,
    NegativeInfinity,
    NotANumber,
}

impl MetricValue {
    pub fn classify(value: f64) -> Self {
        if value.is_nan() {
            Self::NotANumber
        } else if value == f64::INFINITY {
            Self::PositiveInfinity
        } else if value == f64::NEG_INFINITY {
            Self::NegativeInfinity
        } else {
            Self::Number(value)
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => match Self::classify(*value) {
                Self::Number(finite) => write!(f, "{finite}"),
                special => fmt::Display::fmt(&special, f),
            },
            Self::PositiveInfinity => f.write_str("+Inf"),
            Self::NegativeInfinity => f.write_str("-Inf"),
            Self::NotANumber => f.write_str("Nan"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMetricValue {
    Number(f64),
    Token(String),
}

impl TryFrom<RawMetricValue> for MetricValue {
    type Error = String;

    fn try_from(raw: RawMetricValue) -> Result<Self, Self::Error> {
        match raw {
            RawMetricValue::Number(value) => Ok(Self::classify(value)),
            RawMetricValue::Token(token) => match token.as_str() {
                "+Inf" => Ok(Self::PositiveInfinity),
                "-Inf" => Ok(Self::NegativeInfinity),
                "Nan" => Ok(Self::NotANumber),
                other => Err(format!("unsupported metric value: {other}")),
            },
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::classify(value)
    }
}

macro_rules! metric_value_from_integer {
    ($($int:ty),*) => {
        $(
            impl From<$int> for MetricValue {
                fn from(value: $int) -> Self {
                    Self::Number(value as f64)
                }
            }
        )*
    };
}

metric_value_from_integer!(i32, i64, u32, u64, usize);

/// Ordered label set. Keys are unique; re-inserting a key overwrites the
/// value without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut labels = Self::new();
        for (key, value) in iter {
            labels.insert(key, value);
        }
        labels
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub value: MetricValue,
    /// Milliseconds since the Unix epoch.
    pub timestamp: Option<i64>,
}

impl Sample {
    pub fn new(value: impl Into<MetricValue>) -> Self {
        Self {
            labels: Labels::new(),
            value: value.into(),
            timestamp: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key, value);
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// One metric family: a HELP/TYPE header and any number of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub samples: Vec<Sample>,
    /// Skipped families stay in the encoder but are left out of the output.
    pub skip: bool,
}

impl Metric {
    pub fn new(name: impl Into<String>, help: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            samples: Vec::new(),
            skip: false,
        }
    }

    pub fn counter(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::new(name, help, MetricType::Counter)
    }

    pub fn gauge(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::new(name, help, MetricType::Gauge)
    }

    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}
