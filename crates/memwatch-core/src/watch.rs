//! Change detection on top of pointer chains.
//!
//! A [`Watch`] re-resolves its [`DeepPointer`] on every poll and remembers
//! the previous reading, which is what auto-splitting logic compares
//! against. A failed read leaves the last good value in place and reports no
//! change; only a vanished process is surfaced as an error, so the caller
//! knows to reattach.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pointer::DeepPointer;
use crate::process::{ReadStringType, TargetProcess};
use crate::vector::Vector3f;

/// Default byte budget for string and byte watches.
pub const DEFAULT_READ_SIZE: usize = 128;

/// Layout of the value a watch reads.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    U8,
    I8,
    U16,
    I16,
    U32,
    #[default]
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    Vector3f,
    String,
    Bytes,
}

/// One reading of a watch.
#[derive(Debug, Clone)]
pub enum WatchValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Vector3f(Vector3f),
    String(String),
    Bytes(Vec<u8>),
}

impl WatchValue {
    /// Equality for change detection; floating point compares bit patterns.
    pub fn same_as(&self, other: &WatchValue) -> bool {
        use WatchValue::*;
        match (self, other) {
            (U8(a), U8(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (F32(a), F32(b)) => a.to_bits() == b.to_bits(),
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (Bool(a), Bool(b)) => a == b,
            (Vector3f(a), Vector3f(b)) => a.bit_equals(b),
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            _ => false,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            WatchValue::U8(_) => ValueType::U8,
            WatchValue::I8(_) => ValueType::I8,
            WatchValue::U16(_) => ValueType::U16,
            WatchValue::I16(_) => ValueType::I16,
            WatchValue::U32(_) => ValueType::U32,
            WatchValue::I32(_) => ValueType::I32,
            WatchValue::U64(_) => ValueType::U64,
            WatchValue::I64(_) => ValueType::I64,
            WatchValue::F32(_) => ValueType::F32,
            WatchValue::F64(_) => ValueType::F64,
            WatchValue::Bool(_) => ValueType::Bool,
            WatchValue::Vector3f(_) => ValueType::Vector3f,
            WatchValue::String(_) => ValueType::String,
            WatchValue::Bytes(_) => ValueType::Bytes,
        }
    }
}

impl fmt::Display for WatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchValue::U8(v) => write!(f, "{}", v),
            WatchValue::I8(v) => write!(f, "{}", v),
            WatchValue::U16(v) => write!(f, "{}", v),
            WatchValue::I16(v) => write!(f, "{}", v),
            WatchValue::U32(v) => write!(f, "{}", v),
            WatchValue::I32(v) => write!(f, "{}", v),
            WatchValue::U64(v) => write!(f, "{}", v),
            WatchValue::I64(v) => write!(f, "{}", v),
            WatchValue::F32(v) => write!(f, "{}", v),
            WatchValue::F64(v) => write!(f, "{}", v),
            WatchValue::Bool(v) => write!(f, "{}", v),
            WatchValue::Vector3f(v) => write!(f, "{}", v),
            WatchValue::String(v) => write!(f, "{:?}", v),
            WatchValue::Bytes(bytes) => {
                for (i, byte) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// A named pointer chain with its last two readings.
#[derive(Debug, Clone)]
pub struct Watch {
    name: String,
    pointer: DeepPointer,
    value_type: ValueType,
    read_size: usize,
    string_type: ReadStringType,
    current: Option<WatchValue>,
    old: Option<WatchValue>,
    changed: bool,
    available: bool,
}

impl Watch {
    pub fn new(name: impl Into<String>, pointer: DeepPointer, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            pointer,
            value_type,
            read_size: DEFAULT_READ_SIZE,
            string_type: ReadStringType::AutoDetect,
            current: None,
            old: None,
            changed: false,
            available: false,
        }
    }

    /// Byte budget for `string` and `bytes` watches.
    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size;
        self
    }

    pub fn with_string_type(mut self, string_type: ReadStringType) -> Self {
        self.string_type = string_type;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointer(&self) -> &DeepPointer {
        &self.pointer
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn read_size(&self) -> usize {
        self.read_size
    }

    pub fn string_type(&self) -> ReadStringType {
        self.string_type
    }

    pub fn current(&self) -> Option<&WatchValue> {
        self.current.as_ref()
    }

    pub fn old(&self) -> Option<&WatchValue> {
        self.old.as_ref()
    }

    /// Whether the last [`update`](Self::update) produced a different value.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Whether the last [`update`](Self::update) managed to read at all.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Resolve the chain and read one value, without touching watch state.
    pub fn read(&self, process: &impl TargetProcess) -> Result<WatchValue> {
        let ptr = &self.pointer;
        Ok(match self.value_type {
            ValueType::U8 => WatchValue::U8(ptr.deref(process)?),
            ValueType::I8 => WatchValue::I8(ptr.deref(process)?),
            ValueType::U16 => WatchValue::U16(ptr.deref(process)?),
            ValueType::I16 => WatchValue::I16(ptr.deref(process)?),
            ValueType::U32 => WatchValue::U32(ptr.deref(process)?),
            ValueType::I32 => WatchValue::I32(ptr.deref(process)?),
            ValueType::U64 => WatchValue::U64(ptr.deref(process)?),
            ValueType::I64 => WatchValue::I64(ptr.deref(process)?),
            ValueType::F32 => WatchValue::F32(ptr.deref(process)?),
            ValueType::F64 => WatchValue::F64(ptr.deref(process)?),
            ValueType::Bool => WatchValue::Bool(ptr.deref::<u8>(process)? != 0),
            ValueType::Vector3f => WatchValue::Vector3f(ptr.deref(process)?),
            ValueType::String => WatchValue::String(
                ptr.deref_string(process, self.string_type, self.read_size)?
                    .into_string(),
            ),
            ValueType::Bytes => WatchValue::Bytes(ptr.deref_bytes(process, self.read_size)?),
        })
    }

    /// Poll the process once and return whether the value changed.
    ///
    /// The first successful reading counts as a change. Routine read failures
    /// keep the previous value and return `Ok(false)`; `ProcessGone` is
    /// returned as an error.
    pub fn update(&mut self, process: &impl TargetProcess) -> Result<bool> {
        let next = match self.read(process) {
            Ok(value) => value,
            Err(Error::ProcessGone) => {
                self.changed = false;
                self.available = false;
                return Err(Error::ProcessGone);
            }
            Err(e) => {
                debug!("Watch '{}' ({}) unavailable: {}", self.name, self.pointer, e);
                self.changed = false;
                self.available = false;
                return Ok(false);
            }
        };

        self.available = true;
        self.changed = !self
            .current
            .as_ref()
            .is_some_and(|current| current.same_as(&next));
        self.old = self.current.replace(next);
        Ok(self.changed)
    }

    /// Forget both readings, e.g. after reattaching to a new process.
    pub fn reset(&mut self) {
        self.current = None;
        self.old = None;
        self.changed = false;
        self.available = false;
    }
}

/// A value change reported by [`WatchList::update`].
#[derive(Debug, Clone)]
pub struct Change {
    pub name: String,
    pub old: Option<WatchValue>,
    pub current: WatchValue,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old {
            Some(old) => write!(f, "{}: {} -> {}", self.name, old, self.current),
            None => write!(f, "{}: {}", self.name, self.current),
        }
    }
}

/// A set of watches polled together.
#[derive(Debug, Clone, Default)]
pub struct WatchList {
    watches: Vec<Watch>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, watch: Watch) {
        self.watches.push(watch);
    }

    pub fn get(&self, name: &str) -> Option<&Watch> {
        self.watches.iter().find(|w| w.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Watch> {
        self.watches.iter()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Poll every watch once and collect the ones whose value changed.
    ///
    /// Stops at the first watch that finds the process gone.
    pub fn update(&mut self, process: &impl TargetProcess) -> Result<Vec<Change>> {
        let mut changes = Vec::new();
        for watch in &mut self.watches {
            if watch.update(process)? {
                if let Some(current) = watch.current.clone() {
                    changes.push(Change {
                        name: watch.name.clone(),
                        old: watch.old.clone(),
                        current,
                    });
                }
            }
        }
        Ok(changes)
    }

    pub fn reset(&mut self) {
        self.watches.iter_mut().for_each(Watch::reset);
    }
}

impl FromIterator<Watch> for WatchList {
    fn from_iter<I: IntoIterator<Item = Watch>>(iter: I) -> Self {
        Self {
            watches: iter.into_iter().collect(),
        }
    }
}
