//! Resolve command implementation.

use anyhow::{Context, Result};
use memwatch_core::{DeepPointer, DerefType, ReadStringType, TargetProcess, ValueType, Watch};
use tracing::debug;

/// Where a one-off pointer chain starts.
pub enum Start {
    Module(String),
    Main,
    Absolute(u64),
}

pub struct ResolveRequest {
    pub start: Start,
    pub base: i32,
    pub offsets: Vec<i32>,
    pub deref_type: DerefType,
    pub value_type: ValueType,
    pub max_bytes: usize,
    pub encoding: ReadStringType,
}

impl ResolveRequest {
    fn pointer(&self) -> DeepPointer {
        match &self.start {
            Start::Module(name) => {
                DeepPointer::module_with_deref_type(name, self.base, self.deref_type, &self.offsets)
            }
            Start::Main => {
                DeepPointer::main_module_with_deref_type(self.base, self.deref_type, &self.offsets)
            }
            Start::Absolute(address) => {
                let address = address.wrapping_add_signed(i64::from(self.base));
                DeepPointer::absolute_with_deref_type(address, self.deref_type, &self.offsets)
            }
        }
    }
}

/// Run the resolve command
pub fn run(process: &impl TargetProcess, request: &ResolveRequest) -> Result<()> {
    for line in resolve_lines(process, request)? {
        println!("{}", line);
    }
    Ok(())
}

fn resolve_lines(process: &impl TargetProcess, request: &ResolveRequest) -> Result<Vec<String>> {
    let pointer = request.pointer();
    debug!("Resolving {}", pointer);

    let address = pointer
        .deref_offsets(process)
        .with_context(|| format!("Failed to resolve {}", pointer))?;

    let watch = Watch::new("value", pointer.clone(), request.value_type)
        .with_read_size(request.max_bytes)
        .with_string_type(request.encoding);
    let value = watch
        .read(process)
        .with_context(|| format!("Failed to read {} at {:#x}", request.value_type, address))?;

    Ok(vec![
        format!("Pointer: {}", pointer),
        format!("Address: {}", describe_address(process, address)),
        format!("Value ({}): {}", request.value_type, value),
    ])
}

/// Show the address as `module+offset` too when it lies inside a module.
fn describe_address(process: &impl TargetProcess, address: u64) -> String {
    let modules = match process.modules_wow64_safe() {
        Ok(modules) => modules,
        Err(e) => {
            debug!("Module list unavailable: {}", e);
            return format!("{:#x}", address);
        }
    };
    match modules.iter().find(|module| module.contains(address)) {
        Some(module) => format!(
            "{:#x} ({}+{:#x})",
            address,
            module.name,
            address - module.base_address
        ),
        None => format!("{:#x}", address),
    }
}
