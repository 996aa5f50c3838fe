//! `ReadProcessMemory`-based backend for Windows targets.

use std::ffi::OsString;
use std::mem::size_of;
use std::os::windows::ffi::OsStringExt;

use tracing::{debug, warn};
use windows::Win32::Foundation::{BOOL, CloseHandle, HANDLE, HMODULE};
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::ProcessStatus::{
    ENUM_PROCESS_MODULES_EX_FLAGS, EnumProcessModulesEx, GetModuleBaseNameW, GetModuleInformation,
    LIST_MODULES_32BIT, LIST_MODULES_ALL, MODULEINFO,
};
use windows::Win32::System::Threading::{
    GetCurrentProcess, GetExitCodeProcess, IsWow64Process, OpenProcess, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_READ,
};

use crate::error::{Error, Result};
use crate::process::target::read_buffer;
use crate::process::{ModuleInfo, TargetProcess};

const STILL_ACTIVE: u32 = 259;

/// An open handle to a Windows process with read access.
pub struct WindowsProcess {
    handle: HANDLE,
    pid: u32,
    is_wow64: bool,
    is_64_bit: bool,
}

// SAFETY: the handle is only used for read-only queries, which Windows allows
// from any thread, and it is closed exactly once in Drop.
unsafe impl Send for WindowsProcess {}
// SAFETY: see above; no method mutates the handle.
unsafe impl Sync for WindowsProcess {}

impl WindowsProcess {
    pub fn open(pid: u32) -> Result<Self> {
        // SAFETY: OpenProcess is called with valid access flags; the returned handle is
        // owned by this struct and closed in Drop.
        let handle = unsafe {
            OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid).map_err(|e| {
                debug!("OpenProcess failed for PID {}: {}", pid, e);
                Error::ProcessOpenFailed(e.to_string())
            })?
        };

        let is_wow64 = match is_wow64(handle) {
            Ok(value) => value,
            Err(e) => {
                // SAFETY: handle was just returned by OpenProcess and is not stored anywhere.
                let _ = unsafe { CloseHandle(handle) };
                return Err(e);
            }
        };
        let is_64_bit = os_is_64_bit() && !is_wow64;
        debug!(
            "Opened PID {} (64-bit: {}, WOW64: {})",
            pid, is_64_bit, is_wow64
        );

        Ok(Self {
            handle,
            pid,
            is_wow64,
            is_64_bit,
        })
    }

    pub fn find_and_open(name: &str) -> Result<Self> {
        let pid = find_process_id(name)?;
        debug!("Found {} with PID {}", name, pid);
        Self::open(pid)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Check if the process is still running
    pub fn is_alive(&self) -> bool {
        let mut exit_code: u32 = 0;
        // SAFETY: GetExitCodeProcess is called with the handle owned by self and a
        // properly initialized out parameter.
        unsafe {
            GetExitCodeProcess(self.handle, &mut exit_code).is_ok() && exit_code == STILL_ACTIVE
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::ProcessGone)
        }
    }

    fn module_filter(&self) -> ENUM_PROCESS_MODULES_EX_FLAGS {
        if self.is_wow64 {
            LIST_MODULES_32BIT
        } else {
            LIST_MODULES_ALL
        }
    }

    fn module_info(&self, module: HMODULE) -> Result<ModuleInfo> {
        let mut name = [0u16; 260];
        // SAFETY: module was returned by EnumProcessModulesEx for this handle and the
        // name buffer is a valid mutable slice.
        let len = unsafe { GetModuleBaseNameW(self.handle, module, &mut name) } as usize;

        let mut info = MODULEINFO::default();
        // SAFETY: info is a properly sized MODULEINFO owned by this frame.
        unsafe {
            GetModuleInformation(
                self.handle,
                module,
                &mut info,
                size_of::<MODULEINFO>() as u32,
            )
            .map_err(|e| {
                Error::unreadable(module.0 as u64, format!("Failed to get module info: {}", e))
            })?;
        }

        Ok(ModuleInfo {
            name: OsString::from_wide(&name[..len])
                .to_string_lossy()
                .into_owned(),
            base_address: info.lpBaseOfDll as u64,
            size: info.SizeOfImage as u64,
        })
    }
}

impl TargetProcess for WindowsProcess {
    fn is_64_bit(&self) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.is_64_bit)
    }

    fn modules_wow64_safe(&self) -> Result<Vec<ModuleInfo>> {
        self.ensure_alive()?;

        let mut modules = vec![HMODULE::default(); 1024];
        loop {
            let mut needed: u32 = 0;
            let capacity = (modules.len() * size_of::<HMODULE>()) as u32;
            // SAFETY: the modules buffer holds `capacity` bytes and needed is a valid
            // out parameter.
            unsafe {
                EnumProcessModulesEx(
                    self.handle,
                    modules.as_mut_ptr(),
                    capacity,
                    &mut needed,
                    self.module_filter(),
                )
                .map_err(|e| {
                    if !self.is_alive() {
                        return Error::ProcessGone;
                    }
                    Error::unreadable(0, format!("Failed to enumerate modules: {}", e))
                })?;
            }

            let count = needed as usize / size_of::<HMODULE>();
            if count > modules.len() {
                modules.resize(count, HMODULE::default());
                continue;
            }
            modules.truncate(count);
            break;
        }

        modules
            .into_iter()
            .map(|module| self.module_info(module))
            .collect()
    }

    fn read_bytes(&self, address: u64, count: usize) -> Result<Vec<u8>> {
        let mut buffer = read_buffer(count)?;
        if count == 0 {
            return Ok(buffer);
        }
        let mut bytes_read = 0;

        // SAFETY: ReadProcessMemory is called with:
        // - the handle owned by self (opened with PROCESS_VM_READ)
        // - an address in the target's address space, validated by the OS
        // - a buffer of exactly `count` bytes
        // Invalid addresses are reported through the returned Result.
        let result = unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const _,
                buffer.as_mut_ptr() as *mut _,
                count,
                Some(&mut bytes_read),
            )
        };

        if let Err(e) = result {
            if !self.is_alive() {
                return Err(Error::ProcessGone);
            }
            return Err(Error::unreadable(address, e.to_string()));
        }

        // All-or-nothing: a short read is never handed out as data.
        if bytes_read != count {
            return Err(Error::Truncated {
                requested: count,
                read: bytes_read,
            });
        }

        Ok(buffer)
    }
}

impl Drop for WindowsProcess {
    fn drop(&mut self) {
        if !self.handle.is_invalid() {
            // SAFETY: self.handle came from OpenProcess and has not been closed yet.
            if let Err(e) = unsafe { CloseHandle(self.handle) } {
                warn!("Failed to close process handle: {}", e);
            }
        }
    }
}

fn os_is_64_bit() -> bool {
    if cfg!(target_pointer_width = "64") {
        return true;
    }
    // A 32-bit monitor is itself running under WOW64 on a 64-bit OS.
    let mut wow64 = BOOL::default();
    // SAFETY: GetCurrentProcess returns a pseudo handle that is always valid.
    unsafe { IsWow64Process(GetCurrentProcess(), &mut wow64).is_ok() && wow64.as_bool() }
}

fn is_wow64(handle: HANDLE) -> Result<bool> {
    let mut wow64 = BOOL::default();
    // SAFETY: handle is a valid process handle opened with PROCESS_QUERY_INFORMATION.
    unsafe {
        IsWow64Process(handle, &mut wow64)
            .map_err(|e| Error::ProcessOpenFailed(format!("IsWow64Process failed: {}", e)))?;
    }
    Ok(wow64.as_bool())
}

/// Find the PID of the first process whose executable name matches `name`.
pub fn find_process_id(name: &str) -> Result<u32> {
    // SAFETY: CreateToolhelp32Snapshot with TH32CS_SNAPPROCESS is safe to call.
    // The returned handle is closed at the end of this function.
    let snapshot = unsafe {
        CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
            .map_err(|e| Error::ProcessNotFound(e.to_string()))?
    };

    let mut entry = PROCESSENTRY32W {
        dwSize: size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    let mut found = None;
    // SAFETY: Process32FirstW and Process32NextW are called with a valid snapshot
    // handle and a properly initialized PROCESSENTRY32W structure.
    unsafe {
        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                let exe_name = OsString::from_wide(&entry.szExeFile[..len]);

                if exe_name.to_string_lossy().eq_ignore_ascii_case(name) {
                    found = Some(entry.th32ProcessID);
                    break;
                }

                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
    }

    // SAFETY: snapshot is a valid handle from CreateToolhelp32Snapshot
    let _ = unsafe { CloseHandle(snapshot) };
    found.ok_or_else(|| Error::ProcessNotFound(format!("Process '{}' not found", name)))
}
