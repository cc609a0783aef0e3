use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use procprom_common::time::now_millis;
use tracing::debug;

use crate::collectors::probe::{CpuUsage, HostProbe, ProcessProbe};
use crate::types::{Metric, Sample};

pub const DEFAULT_SYSTEM_PREFIX: &str = "process_";

/// Snapshots process-level metrics through a [`ProcessProbe`].
///
/// CPU time is exposed as the delta since the previous snapshot taken by the
/// same collector, so every collector owns its own baseline.
pub struct SystemMetrics {
    probe: Arc<dyn ProcessProbe>,
    previous_cpu: Mutex<Option<CpuUsage>>,
}

impl SystemMetrics {
    /// Host collector. The first CPU snapshot covers everything consumed
    /// since the process started, when the kernel counters were zero.
    pub fn new() -> Self {
        Self::with_baseline(Arc::new(HostProbe), Some(CpuUsage::default()))
    }

    /// Collector whose CPU baseline is the probe's reading right now.
    pub fn with_probe(probe: Arc<dyn ProcessProbe>) -> Self {
        let baseline = probe.cpu_usage();
        Self::with_baseline(probe, baseline)
    }

    pub fn with_baseline(probe: Arc<dyn ProcessProbe>, baseline: Option<CpuUsage>) -> Self {
        Self {
            probe,
            previous_cpu: Mutex::new(baseline),
        }
    }

    /// Runs every sub-collection concurrently. Metrics come back ordered as
    /// event loop lag, cpu, memory, descriptors, requests, handles.
    pub async fn collect(&self, prefix: &str) -> Vec<Metric> {
        let (event_loop, cpu, memory, fds, requests, handles) = tokio::join!(
            self.event_loop_lag(prefix),
            self.cpu(prefix),
            self.memory(prefix),
            self.file_descriptors(prefix),
            self.active_requests(prefix),
            self.active_handles(prefix),
        );

        let mut metrics = Vec::with_capacity(6);
        for group in [event_loop, cpu, memory, fds, requests, handles] {
            metrics.extend(group);
        }
        debug!(count = metrics.len(), "collected system metrics");
        metrics
    }

    pub async fn event_loop_lag(&self, prefix: &str) -> Vec<Metric> {
        let started_at = Instant::now();
        tokio::task::yield_now().await;
        let lag = started_at.elapsed().as_secs_f64();

        vec![
            Metric::gauge(
                format!("{prefix}eventloop_lag_per_second"),
                "Event loop lag in seconds",
            )
            .with_sample(Sample::new(lag).at(now_millis())),
        ]
    }

    pub async fn cpu(&self, prefix: &str) -> Vec<Metric> {
        let mut previous = match self.previous_cpu.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(current) = self.probe.cpu_usage() else {
            return Vec::new();
        };
        let baseline = previous.replace(current).unwrap_or_default();
        drop(previous);

        let now = now_millis();
        let user = micros_delta_seconds(current.user_micros, baseline.user_micros);
        let system = micros_delta_seconds(current.system_micros, baseline.system_micros);

        vec![
            Metric::counter(
                format!("{prefix}cpu_time_per_second"),
                "CPU usage time spent in seconds",
            )
            .with_sample(Sample::new(user).with_label("source", "user").at(now))
            .with_sample(Sample::new(system).with_label("source", "system").at(now)),
        ]
    }

    pub async fn memory(&self, prefix: &str) -> Vec<Metric> {
        let Some(usage) = self.probe.memory_usage() else {
            return Vec::new();
        };
        let now = now_millis();

        let metric = [
            ("heap_total", usage.heap_total),
            ("heap_used", usage.heap_used),
            ("external_memory", usage.external),
            ("resident_memory", usage.resident),
        ]
        .into_iter()
        .fold(
            Metric::gauge(format!("{prefix}mem_usage"), "Memory usage"),
            |metric, (source, bytes)| {
                metric.with_sample(Sample::new(bytes).with_label("source", source).at(now))
            },
        );

        vec![metric]
    }

    pub async fn file_descriptors(&self, prefix: &str) -> Vec<Metric> {
        let now = now_millis();
        match self.probe.open_file_descriptors().await {
            Some(count) => vec![single_gauge(
                format!("{prefix}open_file_descriptors"),
                "Number of open file descriptors",
                count,
                now,
            )],
            None => Vec::new(),
        }
    }

    pub async fn active_requests(&self, prefix: &str) -> Vec<Metric> {
        match self.probe.active_requests() {
            Some(count) => vec![single_gauge(
                format!("{prefix}active_requests"),
                "Number of active requests",
                count,
                now_millis(),
            )],
            None => Vec::new(),
        }
    }

    pub async fn active_handles(&self, prefix: &str) -> Vec<Metric> {
        match self.probe.active_handles() {
            Some(count) => vec![single_gauge(
                format!("{prefix}active_handles"),
                "Number of active handles",
                count,
                now_millis(),
            )],
            None => Vec::new(),
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn single_gauge(name: String, help: &str, value: u64, timestamp: i64) -> Metric {
    Metric::gauge(name, help).with_sample(Sample::new(value).at(timestamp))
}

fn micros_delta_seconds(current: u64, previous: u64) -> f64 {
    (current as f64 - previous as f64) / 1e6
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    };

    use async_trait::async_trait;

    use super::{DEFAULT_SYSTEM_PREFIX, SystemMetrics};
    use crate::collectors::probe::{CpuUsage, MemoryUsage, ProcessProbe};
    use crate::types::{MetricType, MetricValue};

    #[derive(Default)]
    struct FakeProbe {
        cpu: Mutex<Option<CpuUsage>>,
        memory: Option<MemoryUsage>,
        fds: Option<u64>,
        requests: Option<u64>,
        handles: Option<u64>,
        cpu_reads: AtomicU64,
    }

    impl FakeProbe {
        fn set_cpu(&self, user_micros: u64, system_micros: u64) {
            *self.cpu.lock().unwrap() = Some(CpuUsage {
                user_micros,
                system_micros,
            });
        }
    }

    #[async_trait]
    impl ProcessProbe for FakeProbe {
        fn cpu_usage(&self) -> Option<CpuUsage> {
            self.cpu_reads.fetch_add(1, Ordering::Relaxed);
            *self.cpu.lock().unwrap()
        }

        fn memory_usage(&self) -> Option<MemoryUsage> {
            self.memory
        }

        async fn open_file_descriptors(&self) -> Option<u64> {
            self.fds
        }

        fn active_requests(&self) -> Option<u64> {
            self.requests
        }

        fn active_handles(&self) -> Option<u64> {
            self.handles
        }
    }

    fn full_probe() -> FakeProbe {
        let probe = FakeProbe {
            memory: Some(MemoryUsage {
                heap_total: 4096,
                heap_used: 2048,
                external: 512,
                resident: 8192,
            }),
            fds: Some(12),
            requests: Some(3),
            handles: Some(7),
            ..FakeProbe::default()
        };
        probe.set_cpu(0, 0);
        probe
    }

    #[tokio::test]
    async fn cpu_delta_is_reported_in_seconds() {
        let probe = Arc::new(full_probe());
        let collector = SystemMetrics::with_probe(probe.clone());

        probe.set_cpu(1_000_000, 250_000);
        let metrics = collector.cpu(DEFAULT_SYSTEM_PREFIX).await;

        assert_eq!(metrics.len(), 1);
        let cpu = &metrics[0];
        assert_eq!(cpu.name, "process_cpu_time_per_second");
        assert_eq!(cpu.metric_type, MetricType::Counter);
        assert_eq!(cpu.samples[0].labels.get("source"), Some("user"));
        assert_eq!(cpu.samples[0].value, MetricValue::Number(1.0));
        assert_eq!(cpu.samples[1].labels.get("source"), Some("system"));
        assert_eq!(cpu.samples[1].value, MetricValue::Number(0.25));
        assert!(cpu.samples.iter().all(|sample| sample.timestamp.is_some()));
    }

    #[tokio::test]
    async fn cpu_baseline_advances_between_snapshots() {
        let probe = Arc::new(full_probe());
        let collector = SystemMetrics::with_probe(probe.clone());

        probe.set_cpu(2_000_000, 0);
        collector.cpu("").await;
        probe.set_cpu(2_500_000, 0);
        let metrics = collector.cpu("").await;

        assert_eq!(metrics[0].samples[0].value, MetricValue::Number(0.5));
    }

    #[tokio::test]
    async fn collectors_keep_independent_baselines() {
        let probe = Arc::new(full_probe());
        let first = SystemMetrics::with_probe(probe.clone());
        let second = SystemMetrics::with_probe(probe.clone());

        probe.set_cpu(1_000_000, 0);
        first.cpu("").await;
        let metrics = second.cpu("").await;

        assert_eq!(metrics[0].samples[0].value, MetricValue::Number(1.0));
    }

    #[tokio::test]
    async fn collect_orders_all_groups() {
        let probe = Arc::new(full_probe());
        let collector = SystemMetrics::with_probe(probe);

        let names = collector
            .collect("node_")
            .await
            .into_iter()
            .map(|metric| metric.name)
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec![
                "node_eventloop_lag_per_second",
                "node_cpu_time_per_second",
                "node_mem_usage",
                "node_open_file_descriptors",
                "node_active_requests",
                "node_active_handles",
            ]
        );
    }

    #[tokio::test]
    async fn memory_sources_are_labelled() {
        let collector = SystemMetrics::with_probe(Arc::new(full_probe()));
        let metrics = collector.memory(DEFAULT_SYSTEM_PREFIX).await;

        let sources = metrics[0]
            .samples
            .iter()
            .map(|sample| (sample.labels.get("source").unwrap(), sample.value))
            .collect::<Vec<_>>();
        assert_eq!(
            sources,
            vec![
                ("heap_total", MetricValue::Number(4096.0)),
                ("heap_used", MetricValue::Number(2048.0)),
                ("external_memory", MetricValue::Number(512.0)),
                ("resident_memory", MetricValue::Number(8192.0)),
            ]
        );
    }

    #[tokio::test]
    async fn missing_capabilities_degrade_to_nothing() {
        let probe = Arc::new(FakeProbe::default());
        let collector = SystemMetrics::with_probe(probe.clone());

        let metrics = collector.collect(DEFAULT_SYSTEM_PREFIX).await;

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "process_eventloop_lag_per_second");
        assert!(probe.cpu_reads.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test]
    async fn event_loop_lag_is_non_negative_gauge() {
        let collector = SystemMetrics::with_probe(Arc::new(FakeProbe::default()));
        let metrics = collector.event_loop_lag("").await;

        assert_eq!(metrics[0].metric_type, MetricType::Gauge);
        match metrics[0].samples[0].value {
            MetricValue::Number(seconds) => assert!(seconds >= 0.0),
            other => panic!("unexpected lag value {other:?}"),
        }
    }

    struct TickingProbe {
        user_micros: AtomicU64,
        step_micros: u64,
    }

    #[async_trait]
    impl ProcessProbe for TickingProbe {
        fn cpu_usage(&self) -> Option<CpuUsage> {
            let previous = self.user_micros.fetch_add(self.step_micros, Ordering::SeqCst);
            Some(CpuUsage {
                user_micros: previous + self.step_micros,
                system_micros: 0,
            })
        }

        fn memory_usage(&self) -> Option<MemoryUsage> {
            None
        }

        async fn open_file_descriptors(&self) -> Option<u64> {
            None
        }

        fn active_requests(&self) -> Option<u64> {
            None
        }

        fn active_handles(&self) -> Option<u64> {
            None
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_cpu_snapshots_account_for_every_tick() {
        let probe = Arc::new(TickingProbe {
            user_micros: AtomicU64::new(0),
            step_micros: 1_000_000,
        });
        let collector = Arc::new(SystemMetrics::with_probe(probe.clone()));

        let tasks = (0..16)
            .map(|_| {
                let collector = Arc::clone(&collector);
                tokio::spawn(async move { collector.cpu("").await })
            })
            .collect::<Vec<_>>();

        let mut total = 0.0;
        for task in tasks {
            let metrics = task.await.unwrap();
            match metrics[0].samples[0].value {
                MetricValue::Number(seconds) => {
                    assert_eq!(seconds, 1.0);
                    total += seconds;
                }
                other => panic!("unexpected cpu value {other:?}"),
            }
        }

        // One read for the baseline, one per snapshot.
        assert_eq!(probe.user_micros.load(Ordering::SeqCst), 17_000_000);
        assert_eq!(total, 16.0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn first_host_snapshot_includes_cpu_used_before_it() {
        let started_at = std::time::Instant::now();
        let mut spin = 0_u64;
        while started_at.elapsed() < std::time::Duration::from_millis(300) {
            spin = std::hint::black_box(spin.wrapping_add(1));
        }

        let collector = SystemMetrics::new();
        let metrics = collector.cpu(DEFAULT_SYSTEM_PREFIX).await;

        let spent = metrics[0]
            .samples
            .iter()
            .map(|sample| match sample.value {
                MetricValue::Number(seconds) => seconds,
                other => panic!("unexpected cpu value {other:?}"),
            })
            .sum::<f64>();
        assert!(spent >= 0.2, "cpu before first snapshot was dropped: {spent}");
    }
}
