//! Watch command implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use memwatch_core::{TargetProcess, WatchList, build_watch_list, load_watch_list};
use tracing::{debug, info, warn};

use crate::shutdown::ShutdownSignal;
use crate::target;

const REATTACH_INTERVAL: Duration = Duration::from_secs(2);

/// Run the watch command
pub fn run(
    config_path: &Path,
    pid: Option<u32>,
    name: Option<&str>,
    interval_override: Option<u64>,
) -> Result<()> {
    let config = load_watch_list(config_path)
        .with_context(|| format!("Failed to load watch list {}", config_path.display()))?;
    let mut watches = build_watch_list(&config)?;
    if watches.is_empty() {
        bail!("{} defines no watches", config_path.display());
    }

    let interval_ms = interval_override.unwrap_or(config.poll_interval_ms);
    if interval_ms == 0 {
        bail!("Poll interval must be greater than zero");
    }
    let interval = Duration::from_millis(interval_ms);
    let name = name.or(config.process.as_deref());
    info!(
        "Loaded {} watches, polling every {}ms",
        watches.len(),
        interval_ms
    );

    let shutdown = setup_shutdown_handler()?;

    while !shutdown.is_shutdown() {
        match target::attach(pid, name) {
            Ok(process) => {
                info!("Attached to PID {}", process.pid());
                watches.reset();
                poll(&process, &mut watches, interval, &shutdown)?;
                if !shutdown.is_shutdown() {
                    info!("Target exited, waiting for it to come back...");
                }
            }
            Err(e) => debug!("{:#}", e),
        }

        if shutdown.wait(REATTACH_INTERVAL) {
            break;
        }
    }

    println!("Shutdown complete.");
    Ok(())
}

fn setup_shutdown_handler() -> Result<Arc<ShutdownSignal>> {
    let shutdown = Arc::new(ShutdownSignal::new());

    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!("\nShutting down...");
        shutdown_ctrlc.trigger();
    })?;

    Ok(shutdown)
}

/// Poll until the target disappears or shutdown is requested.
///
/// Returns `Ok` when the process is gone; any other failure is fatal.
fn poll(
    process: &impl TargetProcess,
    watches: &mut WatchList,
    interval: Duration,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    let mut unavailable: Vec<String> = Vec::new();

    loop {
        match watches.update(process) {
            Ok(changes) => {
                for change in changes {
                    println!("{}", change);
                }
            }
            Err(e) if e.is_process_gone() => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // Only report transitions so a missing value does not flood the log
        for watch in watches.iter() {
            let known = unavailable.iter().any(|n| n == watch.name());
            if !watch.is_available() && !known {
                warn!("Watch '{}' is unavailable", watch.name());
                unavailable.push(watch.name().to_string());
            } else if watch.is_available() && known {
                info!("Watch '{}' is available again", watch.name());
                unavailable.retain(|n| n != watch.name());
            }
        }

        if shutdown.wait(interval) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memwatch_core::process::MockProcessBuilder;
    use memwatch_core::{DeepPointer, ValueType, Watch};

    #[test]
    fn test_poll_returns_when_process_gone() {
        let process = MockProcessBuilder::new()
            .write_i32(0x1000, 1)
            .build();
        let mut watches: WatchList =
            std::iter::once(Watch::new("v", DeepPointer::absolute(0x1000, &[]), ValueType::I32))
                .collect();
        process.kill();

        let shutdown = ShutdownSignal::new();
        poll(&process, &mut watches, Duration::from_millis(1), &shutdown).unwrap();
        assert!(!shutdown.is_shutdown());
    }

    #[test]
    fn test_poll_stops_on_shutdown() {
        let process = MockProcessBuilder::new()
            .write_i32(0x1000, 1)
            .build();
        let mut watches: WatchList = [
            Watch::new("v", DeepPointer::absolute(0x1000, &[]), ValueType::I32),
            Watch::new("missing", DeepPointer::absolute(0x9000, &[]), ValueType::I32),
        ]
        .into_iter()
        .collect();

        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        poll(&process, &mut watches, Duration::from_secs(60), &shutdown).unwrap();
        assert!(matches!(
            watches.get("v").and_then(|w| w.current()),
            Some(memwatch_core::WatchValue::I32(1))
        ));
        assert!(!watches.get("missing").unwrap().is_available());
    }
}
