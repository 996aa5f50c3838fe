//! In-memory target process for testing
//!
//! Provides a `TargetProcess` implementation backed by sparse byte storage
//! with a configurable module list and bitness, so pointer-chain logic can be
//! exercised without attaching to a real process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytemuck::Pod;

use crate::error::{Error, Result};
use crate::process::target::read_buffer;
use crate::process::{ModuleInfo, TargetProcess};

/// In-memory target process
///
/// Only bytes that were explicitly written (or mapped as zeroes) are readable;
/// any read touching an unmapped byte fails as `UnreadableMemory`, and no
/// partial data is returned.
#[derive(Debug, Default)]
pub struct MockProcess {
    memory: BTreeMap<u64, u8>,
    modules: Vec<ModuleInfo>,
    is_64_bit: bool,
    gone: AtomicBool,
    pointer_reads: AtomicUsize,
}

impl MockProcess {
    /// Simulate the process exiting; every later call reports `ProcessGone`.
    pub fn kill(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }

    /// Number of pointer-sized reads performed so far
    pub fn pointer_reads(&self) -> usize {
        self.pointer_reads.load(Ordering::SeqCst)
    }

    /// Reset the pointer read counter
    pub fn reset_pointer_reads(&self) {
        self.pointer_reads.store(0, Ordering::SeqCst);
    }

    /// Number of readable bytes
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Check if no memory is mapped
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.gone.load(Ordering::SeqCst) {
            Err(Error::ProcessGone)
        } else {
            Ok(())
        }
    }
}

impl TargetProcess for MockProcess {
    fn is_64_bit(&self) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.is_64_bit)
    }

    fn modules_wow64_safe(&self) -> Result<Vec<ModuleInfo>> {
        self.ensure_alive()?;
        Ok(self.modules.clone())
    }

    fn read_bytes(&self, address: u64, count: usize) -> Result<Vec<u8>> {
        self.ensure_alive()?;

        let mut buffer = read_buffer(count)?;
        for (i, slot) in buffer.iter_mut().enumerate() {
            let current = address
                .checked_add(i as u64)
                .ok_or_else(|| Error::unreadable(address, "Address overflow"))?;
            match self.memory.get(&current) {
                Some(&byte) => *slot = byte,
                None => {
                    return Err(Error::unreadable(
                        address,
                        format!("Unmapped byte at {:#x}", current),
                    ));
                }
            }
        }
        Ok(buffer)
    }

    fn read_pointer(&self, address: u64, is_64_bit: bool) -> Result<u64> {
        self.pointer_reads.fetch_add(1, Ordering::SeqCst);
        if is_64_bit {
            self.read_value::<u64>(address)
        } else {
            self.read_value::<u32>(address).map(u64::from)
        }
    }
}

/// Builder for creating in-memory target processes
///
/// Provides a fluent API for laying out modules and memory contents. All
/// addresses are absolute virtual addresses in the simulated process.
#[derive(Debug, Clone)]
pub struct MockProcessBuilder {
    memory: BTreeMap<u64, u8>,
    pointers: Vec<(u64, u64)>,
    modules: Vec<ModuleInfo>,
    is_64_bit: bool,
}

impl Default for MockProcessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessBuilder {
    /// Create a new builder for a 64-bit process with no memory or modules
    pub fn new() -> Self {
        Self {
            memory: BTreeMap::new(),
            pointers: Vec::new(),
            modules: Vec::new(),
            is_64_bit: true,
        }
    }

    /// Set the pointer width of the simulated process
    pub fn is_64_bit(mut self, is_64_bit: bool) -> Self {
        self.is_64_bit = is_64_bit;
        self
    }

    /// Append a module to the module list
    pub fn module(mut self, name: &str, base_address: u64, size: u64) -> Self {
        self.modules.push(ModuleInfo::new(name, base_address, size));
        self
    }

    /// Insert the main module at the front of the module list
    pub fn main_module(mut self, name: &str, base_address: u64, size: u64) -> Self {
        self.modules
            .insert(0, ModuleInfo::new(name, base_address, size));
        self
    }

    /// Map `size` zeroed bytes starting at `address`, keeping existing contents
    pub fn map(mut self, address: u64, size: usize) -> Self {
        for i in 0..size as u64 {
            self.memory.entry(address + i).or_insert(0);
        }
        self
    }

    /// Write raw bytes at the specified address
    pub fn write_bytes(mut self, address: u64, bytes: &[u8]) -> Self {
        for (i, &byte) in bytes.iter().enumerate() {
            self.memory.insert(address + i as u64, byte);
        }
        self
    }

    /// Write any plain-data value at the specified address
    pub fn write_value<T: Pod>(self, address: u64, value: T) -> Self {
        self.write_bytes(address, bytemuck::bytes_of(&value))
    }

    /// Write a signed 32-bit integer at the specified address
    pub fn write_i32(self, address: u64, value: i32) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Write an unsigned 32-bit integer at the specified address
    pub fn write_u32(self, address: u64, value: u32) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Write an unsigned 64-bit integer at the specified address
    pub fn write_u64(self, address: u64, value: u64) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Write a single-precision float at the specified address
    pub fn write_f32(self, address: u64, value: f32) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Write a pointer sized by the process bitness, resolved at `build()`
    pub fn write_pointer(mut self, address: u64, value: u64) -> Self {
        self.pointers.push((address, value));
        self
    }

    /// Write a null-terminated UTF-8 string at the specified address
    pub fn write_utf8(self, address: u64, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0); // null terminator
        self.write_bytes(address, &bytes)
    }

    /// Write a null-terminated UTF-16LE string at the specified address
    pub fn write_utf16(self, address: u64, text: &str) -> Self {
        let mut bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        bytes.extend_from_slice(&[0, 0]);
        self.write_bytes(address, &bytes)
    }

    /// Build the MockProcess
    pub fn build(self) -> MockProcess {
        let is_64_bit = self.is_64_bit;
        let mut builder = self;
        for (address, value) in std::mem::take(&mut builder.pointers) {
            builder = if is_64_bit {
                builder.write_u64(address, value)
            } else {
                builder.write_u32(address, value as u32)
            };
        }

        MockProcess {
            memory: builder.memory,
            modules: builder.modules,
            is_64_bit,
            gone: AtomicBool::new(false),
            pointer_reads: AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_written_bytes() {
        let process = MockProcessBuilder::new()
            .write_bytes(0x1000, &[0xDE, 0xAD, 0xBE, 0xEF])
            .build();

        let bytes = process.read_bytes(0x1000, 4).unwrap();
        assert_eq!(bytes, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_mock_oversized_read_is_refused() {
        let process = MockProcessBuilder::new().map(0x1000, 0x10).build();

        let result = process.read_bytes(0x1000, usize::MAX);
        assert!(matches!(
            result,
            Err(Error::ReadTooLarge { requested: usize::MAX, .. })
        ));
    }

    #[test]
    fn test_mock_unmapped_read_fails() {
        let process = MockProcessBuilder::new()
            .write_bytes(0x1000, &[0x01, 0x02])
            .build();

        let result = process.read_bytes(0x1000, 4);
        assert!(matches!(result, Err(Error::UnreadableMemory { address: 0x1000, .. })));
    }

    #[test]
    fn test_mock_map_zeroes_keeps_contents() {
        let process = MockProcessBuilder::new()
            .write_u32(0x2004, 7)
            .map(0x2000, 0x10)
            .build();

        assert_eq!(process.len(), 0x10);
        assert_eq!(process.read_value::<u32>(0x2000).unwrap(), 0);
        assert_eq!(process.read_value::<u32>(0x2004).unwrap(), 7);
    }

    #[test]
    fn test_mock_pointer_width_follows_bitness() {
        let process = MockProcessBuilder::new()
            .is_64_bit(false)
            .write_pointer(0x1000, 0x30000)
            .write_u32(0x1004, 0xFFFF_FFFF)
            .build();

        assert!(!process.is_64_bit().unwrap());
        assert_eq!(process.read_pointer(0x1000, false).unwrap(), 0x30000);
        // Only 4 bytes were laid out for the pointer
        assert_eq!(
            process.read_value::<u64>(0x1000).unwrap(),
            0xFFFF_FFFF_0003_0000
        );
    }

    #[test]
    fn test_mock_counts_pointer_reads() {
        let process = MockProcessBuilder::new()
            .write_pointer(0x1000, 0x2000)
            .build();

        process.read_pointer(0x1000, true).unwrap();
        process.read_pointer(0x1000, true).unwrap();
        assert_eq!(process.pointer_reads(), 2);

        process.reset_pointer_reads();
        assert_eq!(process.pointer_reads(), 0);
    }

    #[test]
    fn test_mock_kill() {
        let process = MockProcessBuilder::new()
            .module("game.exe", 0x10000, 0x1000)
            .write_u32(0x1000, 1)
            .build();

        process.kill();
        assert!(matches!(process.is_64_bit(), Err(Error::ProcessGone)));
        assert!(matches!(process.modules_wow64_safe(), Err(Error::ProcessGone)));
        assert!(matches!(process.read_bytes(0x1000, 4), Err(Error::ProcessGone)));
    }

    #[test]
    fn test_builder_main_module_first() {
        let process = MockProcessBuilder::new()
            .module("engine.dll", 0x800000, 0x1000)
            .main_module("game.exe", 0x400000, 0x2000)
            .build();

        let main = process.main_module_wow64_safe().unwrap();
        assert_eq!(main.name, "game.exe");
        assert_eq!(main.base_address, 0x400000);
        assert_eq!(process.modules_wow64_safe().unwrap().len(), 2);
    }

    #[test]
    fn test_builder_utf16() {
        let process = MockProcessBuilder::new().write_utf16(0x1000, "Hi").build();
        let bytes = process.read_bytes(0x1000, 6).unwrap();
        assert_eq!(bytes, vec![b'H', 0, b'i', 0, 0, 0]);
    }
}
