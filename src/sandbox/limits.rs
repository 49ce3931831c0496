use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest file the sandboxed process may write.
#[cfg(unix)]
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Per-run resource ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLimits {
    #[serde(rename = "maxMemoryMB")]
    pub max_memory_mb: u64,
    pub max_execution_time_ms: u64,
    pub max_cpu_cores: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 256,
            max_execution_time_ms: 5000,
            max_cpu_cores: 1,
        }
    }
}

impl ResourceLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.max_execution_time_ms)
    }

    /// Reason the limits cannot be enforced, if any.
    pub fn invalid_reason(&self) -> Option<String> {
        if self.max_memory_mb == 0 {
            return Some("maxMemoryMB must be greater than 0".to_string());
        }
        if self.max_execution_time_ms == 0 {
            return Some("maxExecutionTimeMs must be greater than 0".to_string());
        }
        if self.max_cpu_cores == 0 {
            return Some("maxCpuCores must be greater than 0".to_string());
        }
        None
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type RlimitResource = libc::c_int;

#[cfg(unix)]
fn set_limit(resource: RlimitResource, soft: u64, hard: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };
    // SAFETY: setrlimit only reads the struct passed by reference.
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Restrict the child to the first `cores` CPUs it is allowed to run on.
#[cfg(target_os = "linux")]
fn pin_cores(cores: usize) {
    // SAFETY: cpu_set_t is plain data; the calls only touch the sets we own.
    unsafe {
        let mut allowed: libc::cpu_set_t = std::mem::zeroed();
        let size = std::mem::size_of::<libc::cpu_set_t>();
        if libc::sched_getaffinity(0, size, &mut allowed) != 0 {
            return;
        }
        let mut chosen: libc::cpu_set_t = std::mem::zeroed();
        let mut taken = 0;
        for cpu in 0..libc::CPU_SETSIZE as usize {
            if taken == cores {
                break;
            }
            if libc::CPU_ISSET(cpu, &allowed) {
                libc::CPU_SET(cpu, &mut chosen);
                taken += 1;
            }
        }
        if taken > 0 {
            libc::sched_setaffinity(0, size, &chosen);
        }
    }
}

/// Install the limits on `command`, applied in the child between fork and
/// exec. The child also gets its own process group so the supervisor can
/// kill everything it spawned.
#[cfg(unix)]
pub(crate) fn confine(command: &mut tokio::process::Command, limits: &ResourceLimits) {
    let memory = limits.max_memory_mb.saturating_mul(1024 * 1024);
    let cpu_seconds = limits.max_execution_time_ms.div_ceil(1000) + 1;
    #[cfg(target_os = "linux")]
    let cores = limits.max_cpu_cores;

    // SAFETY: the hook only makes async-signal-safe libc calls.
    unsafe {
        command.pre_exec(move || {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            set_limit(libc::RLIMIT_AS, memory, memory)?;
            set_limit(libc::RLIMIT_CPU, cpu_seconds, cpu_seconds + 1)?;
            set_limit(libc::RLIMIT_FSIZE, MAX_FILE_SIZE, MAX_FILE_SIZE)?;
            set_limit(libc::RLIMIT_CORE, 0, 0)?;
            #[cfg(target_os = "linux")]
            pin_cores(cores);
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub(crate) fn confine(_command: &mut tokio::process::Command, _limits: &ResourceLimits) {}
