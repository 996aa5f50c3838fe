//! Pointer chains into a foreign process.
//!
//! A [`DeepPointer`] is an addressing recipe: where to start (an absolute
//! address, a named module or the main module, plus an offset) and which
//! offsets to follow. Nothing is cached; every call walks the chain against
//! the process as it is right now, because module bases and heap objects
//! move whenever the target reloads.
//!
//! # Resolution
//!
//! ```text
//! start  = module base + base offset        (or the absolute address)
//! ptr    = start
//! ptr    = read_ptr(ptr + 0)                 implicit first offset
//! ptr    = read_ptr(ptr + offsets[0])
//! ...
//! result = ptr + offsets[n - 1]              no read
//! ```
//!
//! # Example
//!
//! ```
//! use memwatch_core::process::MockProcessBuilder;
//! use memwatch_core::DeepPointer;
//!
//! let process = MockProcessBuilder::new()
//!     .module("game.exe", 0x10000, 0x1000)
//!     .write_pointer(0x10020, 0x30000)
//!     .write_pointer(0x30004, 0x40000)
//!     .write_i32(0x40008, 42)
//!     .build();
//!
//! let level = DeepPointer::module("game.exe", 0x20, &[0x4, 0x8]);
//! assert_eq!(level.deref_offsets(&process).unwrap(), 0x40008);
//! assert_eq!(level.deref::<i32>(&process).unwrap(), 42);
//! ```

use std::fmt;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::trace;

use crate::error::{Error, Result};
use crate::process::{ReadString, ReadStringType, TargetProcess};

/// Pointer width used while walking the chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DerefType {
    /// Ask the target at resolve time.
    #[default]
    Auto,
    Bit32,
    Bit64,
}

/// Where a pointer chain starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PointerBase {
    Absolute(u64),
    /// Module name (stored lower-cased) and offset from its base.
    Module { name: String, offset: i32 },
    MainModule(i32),
}

impl fmt::Display for PointerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerBase::Absolute(address) => write!(f, "{:#x}", address),
            PointerBase::Module { name, offset } => write!(f, "\"{}\"{}", name, SignedHex(*offset)),
            PointerBase::MainModule(offset) => write!(f, "<main>{}", SignedHex(*offset)),
        }
    }
}

/// Immutable recipe for locating a value in another process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeepPointer {
    base: PointerBase,
    deref_type: DerefType,
    /// Caller offsets with the implicit leading `0`; never empty.
    offsets: Vec<i32>,
}

impl DeepPointer {
    pub fn absolute(address: u64, offsets: &[i32]) -> Self {
        Self::absolute_with_deref_type(address, DerefType::Auto, offsets)
    }

    pub fn absolute_with_deref_type(address: u64, deref_type: DerefType, offsets: &[i32]) -> Self {
        Self::from_parts(PointerBase::Absolute(address), deref_type, offsets)
    }

    /// Start at `base_offset` from the named module. The name is matched
    /// case-insensitively when the chain is resolved.
    pub fn module(name: &str, base_offset: i32, offsets: &[i32]) -> Self {
        Self::module_with_deref_type(name, base_offset, DerefType::Auto, offsets)
    }

    pub fn module_with_deref_type(
        name: &str,
        base_offset: i32,
        deref_type: DerefType,
        offsets: &[i32],
    ) -> Self {
        let base = PointerBase::Module {
            name: name.to_lowercase(),
            offset: base_offset,
        };
        Self::from_parts(base, deref_type, offsets)
    }

    pub fn main_module(base_offset: i32, offsets: &[i32]) -> Self {
        Self::main_module_with_deref_type(base_offset, DerefType::Auto, offsets)
    }

    pub fn main_module_with_deref_type(
        base_offset: i32,
        deref_type: DerefType,
        offsets: &[i32],
    ) -> Self {
        Self::from_parts(PointerBase::MainModule(base_offset), deref_type, offsets)
    }

    fn from_parts(base: PointerBase, deref_type: DerefType, offsets: &[i32]) -> Self {
        let mut chain = Vec::with_capacity(offsets.len() + 1);
        chain.push(0); // deref base first
        chain.extend_from_slice(offsets);
        Self {
            base,
            deref_type,
            offsets: chain,
        }
    }

    pub fn base(&self) -> &PointerBase {
        &self.base
    }

    pub fn deref_type(&self) -> DerefType {
        self.deref_type
    }

    /// Offsets as supplied by the caller, without the implicit leading `0`.
    pub fn offsets(&self) -> &[i32] {
        &self.offsets[1..]
    }

    /// Number of offsets actually walked, including the implicit leading `0`.
    pub fn chain_len(&self) -> usize {
        self.offsets.len()
    }

    /// Resolve the chain to the address the value should be read from.
    ///
    /// Performs one pointer read per caller offset. Any failed read or null
    /// intermediate pointer aborts the whole resolution.
    pub fn deref_offsets(&self, process: &impl TargetProcess) -> Result<u64> {
        let is_64_bit = match self.deref_type {
            DerefType::Auto => process.is_64_bit()?,
            DerefType::Bit32 => false,
            DerefType::Bit64 => true,
        };

        let mut ptr = self.start_address(process)?;

        let (&last, chain) = match self.offsets.split_last() {
            Some(split) => split,
            None => (&0, &[][..]),
        };
        for (level, &offset) in chain.iter().enumerate() {
            let address = ptr.wrapping_add_signed(i64::from(offset));
            ptr = process
                .read_pointer(address, is_64_bit)
                .map_err(|e| as_unreadable(address, e))?;
            if ptr == 0 {
                trace!("{}: null pointer at level {} ({:#x})", self, level, address);
                return Err(Error::NullPointerInChain { level, address });
            }
        }

        Ok(ptr.wrapping_add_signed(i64::from(last)))
    }

    fn start_address(&self, process: &impl TargetProcess) -> Result<u64> {
        match &self.base {
            PointerBase::Absolute(address) => Ok(*address),
            PointerBase::Module { name, offset } => {
                let module = process
                    .modules_wow64_safe()?
                    .into_iter()
                    .find(|m| m.matches_lowercase(name))
                    .ok_or_else(|| Error::ModuleNotFound(name.clone()))?;
                Ok(module.base_address.wrapping_add_signed(i64::from(*offset)))
            }
            PointerBase::MainModule(offset) => {
                let module = process.main_module_wow64_safe()?;
                Ok(module.base_address.wrapping_add_signed(i64::from(*offset)))
            }
        }
    }

    /// Resolve and read one `T` at the final address.
    pub fn deref<T: Pod>(&self, process: &impl TargetProcess) -> Result<T> {
        let address = self.deref_offsets(process)?;
        process.read_value(address)
    }

    /// Like [`deref`](Self::deref), but yields `default` on any failure.
    pub fn deref_or<T: Pod>(&self, process: &impl TargetProcess, default: T) -> T {
        self.deref(process).unwrap_or(default)
    }

    /// Resolve and read exactly `count` bytes.
    pub fn deref_bytes(&self, process: &impl TargetProcess, count: usize) -> Result<Vec<u8>> {
        let address = self.deref_offsets(process)?;
        process.read_bytes(address, count)
    }

    /// Resolve and read a null-terminated string within `max_bytes`.
    pub fn deref_string(
        &self,
        process: &impl TargetProcess,
        kind: ReadStringType,
        max_bytes: usize,
    ) -> Result<ReadString> {
        let address = self.deref_offsets(process)?;
        process.read_string(address, kind, max_bytes)
    }

    /// Auto-detected string, or `default` on any failure.
    pub fn deref_string_or(
        &self,
        process: &impl TargetProcess,
        max_bytes: usize,
        default: &str,
    ) -> String {
        self.deref_string(process, ReadStringType::AutoDetect, max_bytes)
            .map(ReadString::into_string)
            .unwrap_or_else(|_| default.to_string())
    }
}

impl fmt::Display for DeepPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for offset in self.offsets() {
            write!(f, " -> {}", SignedHex(*offset))?;
        }
        Ok(())
    }
}

/// Pointer reads fail as `UnreadableMemory`, except when the process is gone.
fn as_unreadable(address: u64, error: Error) -> Error {
    match error {
        Error::ProcessGone | Error::UnreadableMemory { .. } => error,
        other => Error::unreadable(address, other.to_string()),
    }
}

struct SignedHex(i32);

impl fmt::Display for SignedHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-{:#x}", self.0.unsigned_abs())
        } else {
            write!(f, "+{:#x}", self.0)
        }
    }
}
