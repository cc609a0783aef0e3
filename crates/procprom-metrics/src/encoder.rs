use std::sync::RwLock;

use crate::types::{Labels, Metric, MetricValue, Sample};

/// Content type of the text exposition format produced by [`PrometheusEncoder::render`].
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Append-only collection of metric families rendered with a shared name prefix.
///
/// The prefix is prepended verbatim, so callers include their own separator
/// (`"myapp_"`). Families are rendered in append order and nothing is
/// deduplicated: appending the same name twice yields two blocks.
pub struct PrometheusEncoder {
    prefix: String,
    metrics: RwLock<Vec<Metric>>,
}

impl PrometheusEncoder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            metrics: RwLock::new(Vec::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn append<I>(&self, metrics: I)
    where
        I: IntoIterator<Item = Metric>,
    {
        let mut guard = match self.metrics.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.extend(metrics);
    }

    pub fn append_one(&self, metric: Metric) {
        self.append(std::iter::once(metric));
    }

    pub fn len(&self) -> usize {
        match self.metrics.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn render(&self) -> String {
        let metrics = match self.metrics.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut output = String::new();
        for metric in metrics.iter().filter(|metric| !metric.skip) {
            output.push_str(render_metric(&self.prefix, metric).trim_end());
            output.push_str("\n\n");
        }

        output
    }
}

fn render_metric(prefix: &str, metric: &Metric) -> String {
    let name = format!("{prefix}{}", escape_string(&metric.name));

    let mut block = String::new();
    block.push_str("# HELP ");
    block.push_str(&name);
    block.push(' ');
    block.push_str(&escape_string(&metric.help));
    block.push('\n');

    block.push_str("# TYPE ");
    block.push_str(&name);
    block.push(' ');
    block.push_str(metric.metric_type.as_prometheus_type());
    block.push('\n');

    for sample in &metric.samples {
        block.push_str(render_sample_line(&name, sample).trim_end());
        block.push('\n');
    }

    block
}

// `name` is the escaped family name, so sample lines always match the
// HELP/TYPE header even for names that need escaping.
fn render_sample_line(name: &str, sample: &Sample) -> String {
    let mut rendered = String::new();
    rendered.push_str(name);
    rendered.push_str(&render_labels(&sample.labels));

    rendered.push(' ');
    rendered.push_str(&format_value(&sample.value));

    if let Some(ts) = sample.timestamp {
        rendered.push(' ');
        rendered.push_str(&ts.to_string());
    }

    rendered
}

fn render_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let pairs = labels
        .iter()
        .map(|(key, value)| format!("{key}=\"{}\"", escape_label_value(value)))
        .collect::<Vec<_>>();
    format!("{{{}}}", pairs.join(","))
}

pub fn format_value(value: &MetricValue) -> String {
    value.to_string()
}

/// Escapes metric names and help text: newlines become `\n` and every
/// backslash that does not already start a `\n` escape is doubled.
pub fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\n' => escaped.push_str("\\n"),
            '\\' if chars.peek() == Some(&'n') => escaped.push('\\'),
            '\\' => escaped.push_str("\\\\"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn escape_label_value(value: &str) -> String {
    escape_string(value).replace('"', "\\\"")
}
