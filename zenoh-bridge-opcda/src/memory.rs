//! Resident-set sampling for the resource-ceiling watcher.
//!
//! Long-running DA connections are known to leak in some vendor stacks;
//! the bridge watches its own RSS and, past the configured ceiling, drains
//! and exits with the reserved restart status so a supervisor can recycle
//! the process.

use std::time::Duration;

use dabridge_engine::ShutdownHandle;

/// Current resident set size in megabytes, or `None` off Linux/procfs.
pub fn resident_mb() -> Option<u64> {
    let me = procfs::process::Process::myself().ok()?;
    let statm = me.statm().ok()?;
    let page_size = procfs::page_size();
    Some(statm.resident * page_size / (1024 * 1024))
}

/// Watch RSS once per second; past `ceiling_mb`, trigger shutdown.
///
/// Returns `true` once the ceiling trips (the caller maps that to the
/// reserved exit status); `false` only when the process memory cannot be
/// read at all. Runs until one of those happens.
pub async fn watch_ceiling(ceiling_mb: u64, shutdown: ShutdownHandle) -> bool {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        ticker.tick().await;

        let Some(resident) = resident_mb() else {
            tracing::warn!("Cannot read process memory, ceiling watcher disabled");
            return false;
        };
        if resident > ceiling_mb {
            tracing::warn!(
                resident_mb = resident,
                ceiling_mb,
                "Memory ceiling exceeded, requesting restart"
            );
            shutdown.signal();
            return true;
        }
    }
}
