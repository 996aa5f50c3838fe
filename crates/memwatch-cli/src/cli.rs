//! CLI argument definitions for memwatch.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};
use memwatch_core::config::{parse_hex_address, parse_hex_value};
use memwatch_core::watch::DEFAULT_READ_SIZE;
use memwatch_core::process::MAX_READ_SIZE;
use memwatch_core::{DerefType, ReadStringType, ValueType};

#[derive(Parser)]
#[command(name = "memwatch")]
#[command(about = "Follow pointer chains in a running process", version)]
pub struct Args {
    /// Process ID of the target
    #[arg(long, global = true, conflicts_with = "name")]
    pub pid: Option<u32>,

    /// Executable name of the target (case-insensitive)
    #[arg(long, global = true)]
    pub name: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the modules loaded in the target
    Modules,
    /// Resolve a pointer chain once and print the value
    #[command(group(
        ArgGroup::new("start")
            .required(true)
            .args(["module", "main", "absolute"])
    ))]
    Resolve {
        /// Start from this module's base address
        #[arg(long)]
        module: Option<String>,
        /// Start from the main module's base address
        #[arg(long)]
        main: bool,
        /// Start from an absolute address (hex, e.g. 0x7ff000)
        #[arg(long, value_parser = parse_address)]
        absolute: Option<u64>,
        /// Offset added to the module base (hex)
        #[arg(long, default_value = "0", value_parser = parse_offset, allow_hyphen_values = true)]
        base: i32,
        /// Comma-separated offsets to follow (hex, e.g. 0x4,-0x8)
        #[arg(
            long,
            value_delimiter = ',',
            value_parser = parse_offset,
            allow_hyphen_values = true
        )]
        offsets: Vec<i32>,
        /// Pointer width: auto, bit32 or bit64
        #[arg(long, default_value = "auto")]
        deref_type: DerefType,
        /// Value type at the end of the chain
        #[arg(long = "type", default_value = "i32")]
        value_type: ValueType,
        /// Byte budget for string and bytes values
        #[arg(long, default_value_t = DEFAULT_READ_SIZE, value_parser = parse_max_bytes)]
        max_bytes: usize,
        /// String encoding: autodetect, ascii, utf8 or utf16
        #[arg(long, default_value = "autodetect")]
        encoding: ReadStringType,
    },
    /// Poll a watch list and print every change until Ctrl+C
    Watch {
        /// Watch-list file (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        /// Override the poll interval from the file (milliseconds)
        #[arg(long)]
        interval: Option<u64>,
    },
}

/// Parse a signed hex offset that must fit in 32 bits.
pub fn parse_offset(value: &str) -> Result<i32, String> {
    let parsed = parse_hex_value(value).map_err(|e| e.to_string())?;
    i32::try_from(parsed).map_err(|_| format!("Offset '{}' does not fit in 32 bits", value))
}

pub fn parse_address(value: &str) -> Result<u64, String> {
    parse_hex_address(value).map_err(|e| e.to_string())
}

pub fn parse_max_bytes(value: &str) -> Result<usize, String> {
    let parsed: usize = value
        .parse()
        .map_err(|e| format!("Invalid byte count '{}': {}", value, e))?;
    if parsed == 0 || parsed > MAX_READ_SIZE {
        return Err(format!("Byte count must be between 1 and {}", MAX_READ_SIZE));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("0x20"), Ok(0x20));
        assert_eq!(parse_offset("-8"), Ok(-8));
        assert!(parse_offset("0x100000000").is_err());
        assert!(parse_offset("zz").is_err());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("7ff000"), Ok(0x7ff000));
        assert_eq!(parse_address("0xffff800000001000"), Ok(0xFFFF_8000_0000_1000));
        assert!(parse_address("-0x10").is_err());
    }

    #[test]
    fn test_parse_max_bytes() {
        assert_eq!(parse_max_bytes("64"), Ok(64));
        assert_eq!(parse_max_bytes(&MAX_READ_SIZE.to_string()), Ok(MAX_READ_SIZE));
        assert!(parse_max_bytes("0").is_err());
        assert!(parse_max_bytes(&(MAX_READ_SIZE + 1).to_string()).is_err());
        assert!(parse_max_bytes("18446744073709551615").is_err());
    }
}
