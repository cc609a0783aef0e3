use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

/// Cumulative CPU time consumed by the process, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuUsage {
    pub user_micros: u64,
    pub system_micros: u64,
}

/// Memory footprint of the process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub heap_total: u64,
    pub heap_used: u64,
    pub external: u64,
    pub resident: u64,
}

/// Host and runtime capabilities the system collector reads from.
///
/// Every method returns `None` when the platform does not offer the value
/// or reading it failed.
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    fn cpu_usage(&self) -> Option<CpuUsage>;

    fn memory_usage(&self) -> Option<MemoryUsage>;

    async fn open_file_descriptors(&self) -> Option<u64>;

    fn active_requests(&self) -> Option<u64>;

    fn active_handles(&self) -> Option<u64>;
}

/// Reads `/proc/self` on Linux and the metrics of the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

#[async_trait]
impl ProcessProbe for HostProbe {
    fn cpu_usage(&self) -> Option<CpuUsage> {
        read_cpu_usage()
    }

    fn memory_usage(&self) -> Option<MemoryUsage> {
        read_memory_usage()
    }

    async fn open_file_descriptors(&self) -> Option<u64> {
        count_open_file_descriptors().await
    }

    fn active_requests(&self) -> Option<u64> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        Some(handle.metrics().global_queue_depth() as u64)
    }

    fn active_handles(&self) -> Option<u64> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        Some(handle.metrics().num_alive_tasks() as u64)
    }
}

// USER_HZ is fixed at 100 for the /proc ABI.
#[cfg(target_os = "linux")]
const MICROS_PER_CLOCK_TICK: u64 = 10_000;

#[cfg(target_os = "linux")]
fn read_cpu_usage() -> Option<CpuUsage> {
    let stat = match std::fs::read_to_string("/proc/self/stat") {
        Ok(stat) => stat,
        Err(err) => {
            debug!(error = %err, "failed to read /proc/self/stat");
            return None;
        }
    };
    parse_proc_stat(&stat)
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_usage() -> Option<CpuUsage> {
    None
}

#[cfg(target_os = "linux")]
fn parse_proc_stat(stat: &str) -> Option<CpuUsage> {
    // The command name is parenthesised and may itself contain spaces.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    // utime and stime are fields 14 and 15; `rest` starts at field 3.
    let utime = fields.nth(11)?.parse::<u64>().ok()?;
    let stime = fields.next()?.parse::<u64>().ok()?;
    Some(CpuUsage {
        user_micros: utime.saturating_mul(MICROS_PER_CLOCK_TICK),
        system_micros: stime.saturating_mul(MICROS_PER_CLOCK_TICK),
    })
}

#[cfg(target_os = "linux")]
fn read_memory_usage() -> Option<MemoryUsage> {
    let status = match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => status,
        Err(err) => {
            debug!(error = %err, "failed to read /proc/self/status");
            return None;
        }
    };
    parse_proc_status(&status)
}

#[cfg(not(target_os = "linux"))]
fn read_memory_usage() -> Option<MemoryUsage> {
    None
}

#[cfg(target_os = "linux")]
fn parse_proc_status(status: &str) -> Option<MemoryUsage> {
    let field = |name: &str| -> Option<u64> {
        status.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            let kb = rest
                .split_whitespace()
                .next()
                .and_then(|value| value.parse::<u64>().ok())?;
            kb.checked_mul(1024)
        })
    };

    let resident = field("VmRSS")?;
    Some(MemoryUsage {
        heap_total: field("VmData").unwrap_or_default(),
        heap_used: field("RssAnon").unwrap_or_default(),
        external: field("RssFile")
            .unwrap_or_default()
            .saturating_add(field("RssShmem").unwrap_or_default()),
        resident,
    })
}

#[cfg(target_os = "linux")]
async fn count_open_file_descriptors() -> Option<u64> {
    count_dir_entries(Path::new("/proc/self/fd")).await
}

/// Counts the entries of a descriptor-table directory, minus the descriptor
/// the listing itself holds open. `None` when the directory cannot be read.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
async fn count_dir_entries(path: &Path) -> Option<u64> {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(err) => {
            debug!(error = %err, path = %path.display(), "failed to list descriptor directory");
            return None;
        }
    };

    let mut count = 0_u64;
    loop {
        match entries.next_entry().await {
            Ok(Some(_)) => count += 1,
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, path = %path.display(), "failed to enumerate descriptor directory");
                return None;
            }
        }
    }

    Some(count.saturating_sub(1))
}

#[cfg(not(target_os = "linux"))]
async fn count_open_file_descriptors() -> Option<u64> {
    None
}
