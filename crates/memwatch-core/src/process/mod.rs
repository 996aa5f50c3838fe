mod module;
mod strings;
mod target;

#[cfg(target_os = "linux")]
mod procfs;
#[cfg(target_os = "windows")]
mod win32;

// In-memory target process for testing (always available for unit and integration tests)
#[doc(hidden)]
pub mod mock;

pub use module::ModuleInfo;
pub use strings::{ReadString, ReadStringType, decode_string, detect_string_type};
pub use target::{MAX_READ_SIZE, TargetProcess};

#[cfg(target_os = "linux")]
pub use procfs::{LinuxProcess, find_process_id};
#[cfg(target_os = "windows")]
pub use win32::{WindowsProcess, find_process_id};

/// The backend for the operating system this crate was built for.
#[cfg(target_os = "linux")]
pub type NativeProcess = LinuxProcess;
/// The backend for the operating system this crate was built for.
#[cfg(target_os = "windows")]
pub type NativeProcess = WindowsProcess;

#[doc(hidden)]
pub use mock::{MockProcess, MockProcessBuilder};

/// Open a process by PID with the native backend.
#[cfg(any(target_os = "linux", target_os = "windows"))]
pub fn open_process(pid: u32) -> crate::error::Result<NativeProcess> {
    NativeProcess::open(pid)
}

/// Find a process by executable name and open it with the native backend.
#[cfg(any(target_os = "linux", target_os = "windows"))]
pub fn find_and_open(name: &str) -> crate::error::Result<NativeProcess> {
    NativeProcess::find_and_open(name)
}
