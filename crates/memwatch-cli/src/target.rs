//! Attaching to the target process.

use anyhow::{Context, Result, bail};
use memwatch_core::process::{self, NativeProcess};
use tracing::debug;

/// Open the target by PID, or by executable name when no PID is given.
pub fn attach(pid: Option<u32>, name: Option<&str>) -> Result<NativeProcess> {
    match (pid, name) {
        (Some(pid), _) => {
            debug!("Opening process with PID {}", pid);
            process::open_process(pid).with_context(|| format!("Cannot attach to PID {}", pid))
        }
        (None, Some(name)) => {
            debug!("Searching for {}", name);
            process::find_and_open(name).with_context(|| format!("Cannot attach to {}", name))
        }
        (None, None) => bail!("No target given; use --pid or --name"),
    }
}
