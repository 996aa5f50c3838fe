use std::mem::size_of;

use bytemuck::Pod;

use crate::error::{Error, Result};
use crate::process::ModuleInfo;
use crate::process::strings::{ReadString, ReadStringType, decode_string};

/// Largest single read any backend attempts, in bytes.
///
/// String and byte budgets above this are refused with
/// [`Error::ReadTooLarge`] before anything is allocated.
pub const MAX_READ_SIZE: usize = 16 * 1024 * 1024;

/// Zeroed buffer for a `count`-byte read.
pub(crate) fn read_buffer(count: usize) -> Result<Vec<u8>> {
    let too_large = || Error::ReadTooLarge {
        requested: count,
        max: MAX_READ_SIZE,
    };
    if count > MAX_READ_SIZE {
        return Err(too_large());
    }

    let mut buffer = Vec::new();
    buffer.try_reserve_exact(count).map_err(|_| too_large())?;
    buffer.resize(count, 0);
    Ok(buffer)
}

/// Read-only access to a live, externally running process.
///
/// Implementations must never fault: an unmapped address, a denied read or a
/// process that has exited are all reported through the returned `Result`.
/// Reads are independent of each other, so a shared reference may be used
/// from several threads at once when the implementation is `Sync`.
pub trait TargetProcess {
    /// Whether pointers in the target are 64 bits wide.
    fn is_64_bit(&self) -> Result<bool>;

    /// Modules of the target as seen by a process of the target's own bitness.
    ///
    /// For a 32-bit process under a 64-bit OS this must be the WOW64 view;
    /// the native 64-bit list is wrong for that target.
    fn modules_wow64_safe(&self) -> Result<Vec<ModuleInfo>>;

    /// Read exactly `count` bytes at `address`.
    fn read_bytes(&self, address: u64, count: usize) -> Result<Vec<u8>>;

    /// The main executable module, taken from the same WOW64-safe view.
    fn main_module_wow64_safe(&self) -> Result<ModuleInfo> {
        self.modules_wow64_safe()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ModuleNotFound("<main module>".to_string()))
    }

    /// Read a 4- or 8-byte pointer and widen it to `u64`.
    fn read_pointer(&self, address: u64, is_64_bit: bool) -> Result<u64> {
        if is_64_bit {
            self.read_value::<u64>(address)
        } else {
            self.read_value::<u32>(address).map(u64::from)
        }
    }

    /// Copy `size_of::<T>()` bytes at `address` into a `T`.
    fn read_value<T: Pod>(&self, address: u64) -> Result<T> {
        let bytes = self.read_bytes(address, size_of::<T>())?;
        if bytes.len() != size_of::<T>() {
            return Err(Error::Truncated {
                requested: size_of::<T>(),
                read: bytes.len(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    /// Read up to `max_bytes` and decode a null-terminated string from them.
    fn read_string(
        &self,
        address: u64,
        kind: ReadStringType,
        max_bytes: usize,
    ) -> Result<ReadString> {
        let bytes = self.read_bytes(address, max_bytes)?;
        Ok(decode_string(&bytes, kind))
    }
}

impl<P: TargetProcess> TargetProcess for &P {
    fn is_64_bit(&self) -> Result<bool> {
        (**self).is_64_bit()
    }

    fn modules_wow64_safe(&self) -> Result<Vec<ModuleInfo>> {
        (**self).modules_wow64_safe()
    }

    fn read_bytes(&self, address: u64, count: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, count)
    }

    fn main_module_wow64_safe(&self) -> Result<ModuleInfo> {
        (**self).main_module_wow64_safe()
    }

    fn read_pointer(&self, address: u64, is_64_bit: bool) -> Result<u64> {
        (**self).read_pointer(address, is_64_bit)
    }
}
