//! Watch-list files.
//!
//! A watch list is a JSON document naming the target process, the poll
//! interval and one entry per watch. Bases and offsets are written as hex
//! strings (`"0x20"`, `"-8"`) or plain integers.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pointer::{DeepPointer, DerefType, PointerBase};
use crate::process::{MAX_READ_SIZE, ReadStringType};
use crate::watch::{DEFAULT_READ_SIZE, ValueType, Watch, WatchList};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15;

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Top level of a watch-list file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchListConfig {
    /// Executable name to attach to when no PID is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub watches: Vec<WatchDefinition>,
}

impl Default for WatchListConfig {
    fn default() -> Self {
        Self {
            process: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            watches: Vec::new(),
        }
    }
}

/// One watch entry. Exactly one of `module`, `main_module` and `absolute`
/// picks the base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub main_module: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute: Option<HexAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<HexValue>,
    #[serde(default)]
    pub offsets: Vec<HexValue>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub deref_type: DerefType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<usize>,
    #[serde(default)]
    pub encoding: ReadStringType,
}

impl WatchDefinition {
    pub fn to_pointer(&self) -> Result<DeepPointer> {
        let offsets = self
            .offsets
            .iter()
            .map(|offset| offset.to_i32(&self.name, "offset"))
            .collect::<Result<Vec<_>>>()?;
        let base_offset = match self.base {
            Some(base) => base.to_i32(&self.name, "base")?,
            None => 0,
        };

        let base = match (&self.module, self.main_module, self.absolute) {
            (Some(module), false, None) => PointerBase::Module {
                name: module.to_lowercase(),
                offset: base_offset,
            },
            (None, true, None) => PointerBase::MainModule(base_offset),
            (None, false, Some(address)) => {
                if self.base.is_some() {
                    return Err(self.invalid("'base' cannot be combined with 'absolute'"));
                }
                PointerBase::Absolute(address.0)
            }
            (None, false, None) => {
                return Err(self.invalid("one of 'module', 'main_module' or 'absolute' is required"));
            }
            _ => {
                return Err(self.invalid("'module', 'main_module' and 'absolute' are exclusive"));
            }
        };

        Ok(match base {
            PointerBase::Absolute(address) => {
                DeepPointer::absolute_with_deref_type(address, self.deref_type, &offsets)
            }
            PointerBase::Module { name, offset } => {
                DeepPointer::module_with_deref_type(&name, offset, self.deref_type, &offsets)
            }
            PointerBase::MainModule(offset) => {
                DeepPointer::main_module_with_deref_type(offset, self.deref_type, &offsets)
            }
        })
    }

    pub fn to_watch(&self) -> Result<Watch> {
        if self.name.trim().is_empty() {
            return Err(Error::ConfigParseError("Watch name must not be empty".to_string()));
        }
        let read_size = self.max_bytes.unwrap_or(DEFAULT_READ_SIZE);
        if read_size == 0 {
            return Err(self.invalid("'max_bytes' must be greater than zero"));
        }
        if read_size > MAX_READ_SIZE {
            return Err(Error::ConfigParseError(format!(
                "Watch '{}': 'max_bytes' {} exceeds the {} byte limit",
                self.name, read_size, MAX_READ_SIZE
            )));
        }

        Ok(Watch::new(self.name.clone(), self.to_pointer()?, self.value_type)
            .with_read_size(read_size)
            .with_string_type(self.encoding))
    }

    /// Describe an existing watch in file form.
    pub fn from_watch(watch: &Watch) -> Self {
        let pointer = watch.pointer();
        let mut definition = Self {
            name: watch.name().to_string(),
            offsets: pointer.offsets().iter().map(|&o| HexValue::from(o)).collect(),
            value_type: watch.value_type(),
            deref_type: pointer.deref_type(),
            encoding: watch.string_type(),
            ..Self::default()
        };
        if watch.read_size() != DEFAULT_READ_SIZE {
            definition.max_bytes = Some(watch.read_size());
        }

        match pointer.base() {
            PointerBase::Absolute(address) => {
                definition.absolute = Some(HexAddress(*address));
            }
            PointerBase::Module { name, offset } => {
                definition.module = Some(name.clone());
                definition.base = Some(HexValue::from(*offset));
            }
            PointerBase::MainModule(offset) => {
                definition.main_module = true;
                definition.base = Some(HexValue::from(*offset));
            }
        }
        definition
    }

    fn invalid(&self, message: &str) -> Error {
        Error::ConfigParseError(format!("Watch '{}': {}", self.name, message))
    }
}

/// A signed integer that reads from hex strings or JSON numbers and is
/// written back as a hex string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNumber", into = "String")]
pub struct HexValue(pub i64);

impl HexValue {
    fn to_i32(self, watch: &str, field: &str) -> Result<i32> {
        i32::try_from(self.0).map_err(|_| {
            Error::ConfigParseError(format!(
                "Watch '{}': {} {} does not fit in 32 bits",
                watch, field, self
            ))
        })
    }
}

impl From<i32> for HexValue {
    fn from(value: i32) -> Self {
        Self(i64::from(value))
    }
}

impl fmt::Display for HexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-{:#x}", self.0.unsigned_abs())
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

impl From<HexValue> for String {
    fn from(value: HexValue) -> Self {
        value.to_string()
    }
}

/// An absolute address in the target; the full unsigned 64-bit range
/// survives a save and load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNumber", into = "String")]
pub struct HexAddress(pub u64);

impl fmt::Display for HexAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<HexAddress> for String {
    fn from(value: HexAddress) -> Self {
        value.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Signed(i64),
    Unsigned(u64),
    Text(String),
}

impl TryFrom<RawNumber> for HexValue {
    type Error = Error;

    fn try_from(raw: RawNumber) -> Result<Self> {
        match raw {
            RawNumber::Signed(value) => Ok(HexValue(value)),
            RawNumber::Unsigned(value) => i64::try_from(value)
                .map(HexValue)
                .map_err(|_| Error::ConfigParseError(format!("Value {} is out of range", value))),
            RawNumber::Text(text) => parse_hex_value(&text).map(HexValue),
        }
    }
}

impl TryFrom<RawNumber> for HexAddress {
    type Error = Error;

    fn try_from(raw: RawNumber) -> Result<Self> {
        match raw {
            RawNumber::Signed(value) => u64::try_from(value).map(HexAddress).map_err(|_| {
                Error::ConfigParseError(format!("Address {} must not be negative", value))
            }),
            RawNumber::Unsigned(value) => Ok(HexAddress(value)),
            RawNumber::Text(text) => parse_hex_address(&text).map(HexAddress),
        }
    }
}

/// Parse `"0x1F"`, `"1f"` or `"-0x8"` as a signed hexadecimal number.
pub fn parse_hex_value(value: &str) -> Result<i64> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let magnitude = parse_hex_digits(digits, value)?;

    let parsed = if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    };
    parsed.ok_or_else(|| Error::ConfigParseError(format!("Value '{}' is out of range", value)))
}

/// Parse an unsigned hexadecimal address such as `"0x7ff000"`.
pub fn parse_hex_address(value: &str) -> Result<u64> {
    let value = value.trim();
    if value.starts_with('-') {
        return Err(Error::ConfigParseError(format!(
            "Address '{}' must not be negative",
            value
        )));
    }
    parse_hex_digits(value, value)
}

fn parse_hex_digits(digits: &str, original: &str) -> Result<u64> {
    // Strip hex prefix (case-insensitive), only once
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);

    u64::from_str_radix(digits, 16)
        .map_err(|e| Error::ConfigParseError(format!("Failed to parse '{}': {}", original, e)))
}

pub fn load_watch_list<P: AsRef<Path>>(path: P) -> Result<WatchListConfig> {
    let content = fs::read_to_string(&path)?;
    let config = parse_watch_list(&content)?;
    debug!(
        "Loaded {} watches from {}",
        config.watches.len(),
        path.as_ref().display()
    );
    Ok(config)
}

pub fn save_watch_list<P: AsRef<Path>>(path: P, config: &WatchListConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn parse_watch_list(content: &str) -> Result<WatchListConfig> {
    let config: WatchListConfig = serde_json::from_str(content)
        .map_err(|e| Error::ConfigParseError(format!("Invalid watch list: {}", e)))?;
    if config.poll_interval_ms == 0 {
        return Err(Error::ConfigParseError(
            "poll_interval_ms must be greater than zero".to_string(),
        ));
    }
    Ok(config)
}

/// Turn every definition into a watch; duplicate names are kept but warned
/// about since changes are reported by name.
pub fn build_watch_list(config: &WatchListConfig) -> Result<WatchList> {
    let mut seen = HashSet::new();
    config
        .watches
        .iter()
        .map(|definition| {
            if !seen.insert(definition.name.as_str()) {
                warn!("Duplicate watch name: '{}'", definition.name);
            }
            definition.to_watch()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "process": "game.exe",
        "poll_interval_ms": 15,
        "watches": [
            { "name": "level", "module": "Game.exe", "base": "0x20",
              "offsets": ["0x4", "0x8"], "type": "i32" },
            { "name": "position", "main_module": true, "base": 4660,
              "offsets": ["-0x10"], "type": "vector3f", "deref_type": "bit32" },
            { "name": "title", "absolute": "0x7ff000", "offsets": [],
              "type": "string", "max_bytes": 64, "encoding": "utf16" }
        ]
    }"#;

    #[test]
    fn test_parse_hex_value() {
        assert_eq!(parse_hex_value("0x1F").unwrap(), 0x1F);
        assert_eq!(parse_hex_value("0X1f").unwrap(), 0x1F);
        assert_eq!(parse_hex_value("ff").unwrap(), 0xFF);
        assert_eq!(parse_hex_value(" -0x8 ").unwrap(), -8);
        assert_eq!(parse_hex_value("-8000000000000000").unwrap(), i64::MIN);
        assert!(parse_hex_value("8000000000000000").is_err());
        assert!(parse_hex_value("0x").is_err());
        assert!(parse_hex_value("xyz").is_err());
    }

    #[test]
    fn test_parse_hex_address() {
        assert_eq!(parse_hex_address("0x7ff000").unwrap(), 0x7ff000);
        assert_eq!(
            parse_hex_address("0xFFFF800000001000").unwrap(),
            0xFFFF_8000_0000_1000
        );
        assert!(parse_hex_address("-0x10").is_err());
        assert!(parse_hex_address("0x10000000000000000").is_err());
    }

    #[test]
    fn test_parse_sample() {
        let config = parse_watch_list(SAMPLE).unwrap();
        assert_eq!(config.process.as_deref(), Some("game.exe"));
        assert_eq!(config.poll_interval_ms, 15);
        assert_eq!(config.watches.len(), 3);

        let level = &config.watches[0];
        assert_eq!(level.base, Some(HexValue(0x20)));
        assert_eq!(level.offsets, vec![HexValue(4), HexValue(8)]);
        assert_eq!(level.value_type, ValueType::I32);
        assert_eq!(level.deref_type, DerefType::Auto);

        let position = &config.watches[1];
        assert_eq!(position.base, Some(HexValue(0x1234)));
        assert_eq!(position.offsets, vec![HexValue(-0x10)]);
        assert_eq!(position.deref_type, DerefType::Bit32);

        assert_eq!(config.watches[2].encoding, ReadStringType::Utf16);
    }

    #[test]
    fn test_defaults() {
        let config = parse_watch_list(r#"{ "watches": [] }"#).unwrap();
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(config.process.is_none());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = parse_watch_list(r#"{ "poll_interval_ms": 0 }"#);
        assert!(matches!(result, Err(Error::ConfigParseError(_))));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let content = r#"{ "watches": [ { "name": "x", "absolute": 1, "type": "float" } ] }"#;
        assert!(matches!(
            parse_watch_list(content),
            Err(Error::ConfigParseError(_))
        ));
    }

    #[test]
    fn test_build_watch_list() {
        let config = parse_watch_list(SAMPLE).unwrap();
        let list = build_watch_list(&config).unwrap();
        assert_eq!(list.len(), 3);

        let level = list.get("level").unwrap();
        assert_eq!(
            level.pointer().base(),
            &PointerBase::Module {
                name: "game.exe".to_string(),
                offset: 0x20
            }
        );
        assert_eq!(level.pointer().offsets(), &[4, 8]);

        let position = list.get("position").unwrap();
        assert_eq!(position.pointer().base(), &PointerBase::MainModule(0x1234));
        assert_eq!(position.pointer().deref_type(), DerefType::Bit32);

        let title = list.get("title").unwrap();
        assert_eq!(title.pointer().base(), &PointerBase::Absolute(0x7ff000));
        assert_eq!(title.read_size(), 64);
        assert_eq!(title.string_type(), ReadStringType::Utf16);
    }

    #[test]
    fn test_base_selection_errors() {
        let missing = WatchDefinition {
            name: "x".to_string(),
            ..WatchDefinition::default()
        };
        assert!(matches!(missing.to_pointer(), Err(Error::ConfigParseError(_))));

        let both = WatchDefinition {
            name: "x".to_string(),
            module: Some("a.dll".to_string()),
            main_module: true,
            ..WatchDefinition::default()
        };
        assert!(matches!(both.to_pointer(), Err(Error::ConfigParseError(_))));

        let absolute_with_base = WatchDefinition {
            name: "x".to_string(),
            absolute: Some(HexAddress(0x1000)),
            base: Some(HexValue(0x10)),
            ..WatchDefinition::default()
        };
        assert!(absolute_with_base.to_pointer().is_err());
    }

    #[test]
    fn test_offset_out_of_range() {
        let definition = WatchDefinition {
            name: "x".to_string(),
            main_module: true,
            offsets: vec![HexValue(0x1_0000_0000)],
            ..WatchDefinition::default()
        };
        let err = definition.to_pointer().unwrap_err();
        assert!(err.to_string().contains("does not fit in 32 bits"));
    }

    #[test]
    fn test_empty_name_and_zero_budget() {
        let unnamed = WatchDefinition {
            main_module: true,
            ..WatchDefinition::default()
        };
        assert!(unnamed.to_watch().is_err());

        let zero_budget = WatchDefinition {
            name: "x".to_string(),
            main_module: true,
            max_bytes: Some(0),
            ..WatchDefinition::default()
        };
        assert!(zero_budget.to_watch().is_err());

        let huge_budget = WatchDefinition {
            name: "x".to_string(),
            main_module: true,
            max_bytes: Some(MAX_READ_SIZE + 1),
            ..WatchDefinition::default()
        };
        let err = huge_budget.to_watch().unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        let largest = WatchDefinition {
            max_bytes: Some(MAX_READ_SIZE),
            ..huge_budget
        };
        assert_eq!(largest.to_watch().unwrap().read_size(), MAX_READ_SIZE);
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let mut config = parse_watch_list(SAMPLE).unwrap();
        config.watches.push(config.watches[0].clone());
        assert_eq!(build_watch_list(&config).unwrap().len(), 4);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watches.json");

        let config = parse_watch_list(SAMPLE).unwrap();
        save_watch_list(&path, &config).unwrap();

        let saved = fs::read_to_string(&path).unwrap();
        assert!(saved.contains("\"-0x10\""));

        let loaded = load_watch_list(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_high_absolute_address_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kernel.json");

        let watch = Watch::new(
            "high",
            DeepPointer::absolute(0xFFFF_8000_0000_1000, &[0x8]),
            ValueType::U64,
        );
        let config = WatchListConfig {
            watches: vec![WatchDefinition::from_watch(&watch)],
            ..WatchListConfig::default()
        };
        save_watch_list(&path, &config).unwrap();

        let saved = fs::read_to_string(&path).unwrap();
        assert!(saved.contains("\"0xffff800000001000\""));

        let loaded = load_watch_list(&path).unwrap();
        let rebuilt = build_watch_list(&loaded).unwrap();
        assert_eq!(rebuilt.get("high").unwrap().pointer(), watch.pointer());
    }

    #[test]
    fn test_absolute_address_forms() {
        let content = r#"{ "watches": [
            { "name": "a", "absolute": 18446603336221200384, "type": "u8" },
            { "name": "b", "absolute": 4096, "type": "u8" }
        ] }"#;
        let config = parse_watch_list(content).unwrap();
        assert_eq!(config.watches[0].absolute, Some(HexAddress(0xFFFF_8000_0000_1000)));
        assert_eq!(config.watches[1].absolute, Some(HexAddress(0x1000)));

        let negative = r#"{ "watches": [ { "name": "a", "absolute": -1, "type": "u8" } ] }"#;
        assert!(parse_watch_list(negative).is_err());
        let negative_text = r#"{ "watches": [ { "name": "a", "absolute": "-0x10", "type": "u8" } ] }"#;
        assert!(parse_watch_list(negative_text).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = load_watch_list(dir.path().join("missing.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_from_watch() {
        let config = parse_watch_list(SAMPLE).unwrap();
        let list = build_watch_list(&config).unwrap();

        for (definition, watch) in config.watches.iter().zip(list.iter()) {
            let rebuilt = WatchDefinition::from_watch(watch);
            assert_eq!(rebuilt.to_watch().unwrap().pointer(), watch.pointer());
            assert_eq!(rebuilt.value_type, definition.value_type);
        }
    }
}
