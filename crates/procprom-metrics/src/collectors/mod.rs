pub mod probe;
pub mod system;

use std::sync::OnceLock;

pub use probe::{CpuUsage, HostProbe, MemoryUsage, ProcessProbe};
pub use system::{DEFAULT_SYSTEM_PREFIX, SystemMetrics};

static SHARED_SYSTEM_METRICS: OnceLock<SystemMetrics> = OnceLock::new();

/// Host-probing collector shared by the whole process. Its CPU baseline is
/// process start, however late it is first used.
pub fn shared_system_metrics() -> &'static SystemMetrics {
    SHARED_SYSTEM_METRICS.get_or_init(SystemMetrics::new)
}
