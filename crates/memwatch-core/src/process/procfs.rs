//! procfs + `process_vm_readv` backend for Linux targets.

use std::fs::{self, File};
use std::io::{ErrorKind, IoSliceMut, Read};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::uio::{RemoteIoVec, process_vm_readv};
use nix::unistd::Pid;
use tracing::debug;

use crate::error::{Error, Result};
use crate::process::target::read_buffer;
use crate::process::{ModuleInfo, TargetProcess};

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELF_CLASS_64: u8 = 2;

/// A Linux process read through `/proc/<pid>` and `process_vm_readv`.
///
/// A PID alone does not identify a process once it has exited, so the start
/// time seen at `open` is checked again on every call; a reused PID reports
/// `ProcessGone` like an exited one.
#[derive(Debug)]
pub struct LinuxProcess {
    pid: Pid,
    root: PathBuf,
    exe_path: String,
    is_64_bit: bool,
    start_time: u64,
}

impl LinuxProcess {
    pub fn open(pid: u32) -> Result<Self> {
        let root = PathBuf::from(format!("/proc/{}", pid));
        let stat = read_stat(&root)
            .filter(|stat| !stat.is_dead())
            .ok_or_else(|| Error::ProcessNotFound(format!("No process with PID {}", pid)))?;

        let exe = fs::read_link(root.join("exe")).map_err(|e| {
            debug!("Reading exe link failed for PID {}: {}", pid, e);
            Error::ProcessOpenFailed(format!("Cannot resolve executable of PID {}: {}", pid, e))
        })?;
        let is_64_bit = read_elf_is_64_bit(&root.join("exe"))?;
        debug!("Opened PID {} ({}, 64-bit: {})", pid, exe.display(), is_64_bit);

        Ok(Self {
            pid: Pid::from_raw(pid as i32),
            root,
            exe_path: exe.to_string_lossy().into_owned(),
            is_64_bit,
            start_time: stat.start_time,
        })
    }

    pub fn find_and_open(name: &str) -> Result<Self> {
        let pid = find_process_id(name)?;
        debug!("Found {} with PID {}", name, pid);
        Self::open(pid)
    }

    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Check if the process opened at `open` is still running
    pub fn is_alive(&self) -> bool {
        read_stat(&self.root).is_some_and(|stat| stat.is_running_as(self.start_time))
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::ProcessGone)
        }
    }

    fn mapped_modules(&self) -> Result<Vec<MappedModule>> {
        self.ensure_alive()?;
        let content = fs::read_to_string(self.root.join("maps")).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::ProcessGone
            } else {
                Error::Io(e)
            }
        })?;
        // The maps may belong to a new process that took over the PID
        self.ensure_alive()?;
        Ok(parse_maps(&content))
    }
}

impl TargetProcess for LinuxProcess {
    fn is_64_bit(&self) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.is_64_bit)
    }

    fn modules_wow64_safe(&self) -> Result<Vec<ModuleInfo>> {
        Ok(self
            .mapped_modules()?
            .into_iter()
            .map(|mapped| mapped.info)
            .collect())
    }

    fn main_module_wow64_safe(&self) -> Result<ModuleInfo> {
        let mut mapped = self.mapped_modules()?;
        let index = mapped
            .iter()
            .position(|m| m.path == self.exe_path)
            .ok_or_else(|| Error::ModuleNotFound(self.exe_path.clone()))?;
        Ok(mapped.swap_remove(index).info)
    }

    fn read_bytes(&self, address: u64, count: usize) -> Result<Vec<u8>> {
        let mut buffer = read_buffer(count)?;
        if count == 0 {
            return Ok(buffer);
        }

        let remote = [RemoteIoVec {
            base: address as usize,
            len: count,
        }];
        let mut local = [IoSliceMut::new(&mut buffer)];

        let bytes_read = match process_vm_readv(self.pid, &mut local, &remote) {
            Ok(n) => n,
            Err(Errno::ESRCH) => return Err(Error::ProcessGone),
            Err(e) => {
                self.ensure_alive()?;
                return Err(Error::unreadable(address, e.desc()));
            }
        };
        // Checked after the read so bytes from a reused PID are never returned
        self.ensure_alive()?;

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

/// A file-backed mapping collapsed to one module entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MappedModule {
    path: String,
    info: ModuleInfo,
}

/// Collapse `/proc/<pid>/maps` into one module per mapped file, in order of
/// first appearance; base is the lowest start, size spans to the highest end.
fn parse_maps(content: &str) -> Vec<MappedModule> {
    let mut modules: Vec<MappedModule> = Vec::new();

    for line in content.lines() {
        // "START-END perms offset dev inode path"
        let mut parts = line.split_whitespace();
        let Some(range) = parts.next() else {
            continue;
        };
        let Some(path) = parts.nth(4) else {
            continue;
        };
        if !path.starts_with('/') {
            continue;
        }
        // Paths may contain spaces; keep everything after the inode column.
        let path = match line.find(path) {
            Some(index) => line[index..].trim_end(),
            None => path,
        };

        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            u64::from_str_radix(start, 16),
            u64::from_str_radix(end, 16),
        ) else {
            continue;
        };

        match modules.iter_mut().find(|m| m.path == path) {
            Some(existing) => {
                let current_end = existing.info.base_address + existing.info.size;
                existing.info.base_address = existing.info.base_address.min(start);
                existing.info.size = current_end.max(end) - existing.info.base_address;
            }
            None => {
                let name = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string());
                modules.push(MappedModule {
                    path: path.to_string(),
                    info: ModuleInfo::new(name, start, end.saturating_sub(start)),
                });
            }
        }
    }

    modules
}

/// The parts of `/proc/<pid>/stat` that identify one run of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatInfo {
    state: char,
    /// Field 22, in clock ticks since boot.
    start_time: u64,
}

impl StatInfo {
    fn is_dead(&self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }

    fn is_running_as(&self, start_time: u64) -> bool {
        !self.is_dead() && self.start_time == start_time
    }
}

fn read_stat(root: &Path) -> Option<StatInfo> {
    let content = fs::read_to_string(root.join("stat")).ok()?;
    parse_stat(&content)
}

fn parse_stat(content: &str) -> Option<StatInfo> {
    // comm (field 2) is parenthesised and may itself contain spaces or ')'
    let rest = &content[content.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    // state is field 3; skip fields 4..=21
    let start_time = fields.nth(18)?.parse().ok()?;
    Some(StatInfo { state, start_time })
}

fn read_elf_is_64_bit(exe: &Path) -> Result<bool> {
    let mut header = [0u8; 5];
    File::open(exe)
        .and_then(|mut file| file.read_exact(&mut header))
        .map_err(|e| Error::ProcessOpenFailed(format!("Cannot read ELF header: {}", e)))?;
    parse_elf_class(&header)
}

fn parse_elf_class(header: &[u8]) -> Result<bool> {
    if header.len() < 5 || header[..4] != ELF_MAGIC {
        return Err(Error::Unsupported("Executable is not an ELF image".to_string()));
    }
    Ok(header[4] == ELF_CLASS_64)
}

fn comm_matches(pid_dir: &Path, name: &str) -> bool {
    // comm is cut to 15 bytes, so fall back to the exe link for long names.
    let comm_match = fs::read_to_string(pid_dir.join("comm"))
        .map(|comm| comm.trim_end().eq_ignore_ascii_case(name))
        .unwrap_or(false);
    comm_match
        || fs::read_link(pid_dir.join("exe"))
            .ok()
            .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
            .is_some_and(|exe| exe.eq_ignore_ascii_case(name))
}

/// Find the PID of the first process whose executable name matches `name`.
pub fn find_process_id(name: &str) -> Result<u32> {
    let entries = fs::read_dir("/proc")?;
    let mut pids: Vec<u32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();

    pids.into_iter()
        .find(|pid| comm_matches(&Path::new("/proc").join(pid.to_string()), name))
        .ok_or_else(|| Error::ProcessNotFound(format!("Process '{}' not found", name)))
}
