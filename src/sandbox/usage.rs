//! Best-effort resource sampling of the sandboxed process.

use super::ResourceUsage;
use std::time::Duration;

/// Collects memory and CPU readings while the child runs. Only Linux has
/// a source for them; elsewhere every reading stays zero.
#[derive(Debug, Default)]
pub(super) struct UsageSampler {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    pid: Option<u32>,
    samples: usize,
    last_rss_kb: u64,
    peak_kb: u64,
    cpu_ticks: u64,
}

impl UsageSampler {
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            ..Default::default()
        }
    }

    #[cfg(target_os = "linux")]
    pub fn sample(&mut self) {
        let Some(pid) = self.pid else {
            return;
        };
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{pid}/status")) {
            let rss = status_kb(&status, "VmRSS").unwrap_or(0);
            let hwm = status_kb(&status, "VmHWM").unwrap_or(0);
            self.samples += 1;
            self.last_rss_kb = rss;
            self.peak_kb = self.peak_kb.max(rss).max(hwm);
        }
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            && let Some(ticks) = cpu_ticks(&stat)
        {
            self.cpu_ticks = self.cpu_ticks.max(ticks);
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn sample(&mut self) {}

    pub fn finish(self, elapsed: Duration) -> ResourceUsage {
        let elapsed_ms = elapsed.as_millis() as u64;
        let cpu_ms = self.cpu_ticks as f64 * 1000.0 / clock_ticks_per_second();
        let cpu_usage = if elapsed_ms == 0 {
            0.0
        } else {
            cpu_ms / elapsed_ms as f64 * 100.0
        };
        ResourceUsage {
            memory_mb: kb_to_mb(self.last_rss_kb),
            execution_time_ms: elapsed_ms,
            cpu_usage,
            peak_memory_mb: (self.samples > 0).then(|| kb_to_mb(self.peak_kb)),
            system_calls: None,
        }
    }
}

fn kb_to_mb(kb: u64) -> f64 {
    kb as f64 / 1024.0
}

#[cfg(unix)]
fn clock_ticks_per_second() -> f64 {
    // SAFETY: sysconf has no preconditions.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as f64 } else { 100.0 }
}

#[cfg(not(unix))]
fn clock_ticks_per_second() -> f64 {
    100.0
}

/// Value of a `Key:   1234 kB` line from `/proc/<pid>/status`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn status_kb(status: &str, key: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// utime + stime from `/proc/<pid>/stat`. The command name may contain
/// spaces and parentheses, so fields are counted from the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn cpu_ticks(stat: &str) -> Option<u64> {
    let after_name = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_name.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}
