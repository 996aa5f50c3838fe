//! Modules command implementation.

use anyhow::{Context, Result};
use memwatch_core::{ModuleInfo, TargetProcess};

/// Print the WOW64-safe module list of the target.
pub fn run(process: &impl TargetProcess) -> Result<()> {
    for line in module_lines(process)? {
        println!("{}", line);
    }
    Ok(())
}

fn module_lines(process: &impl TargetProcess) -> Result<Vec<String>> {
    let bits = if process.is_64_bit()? { 64 } else { 32 };
    let modules = process
        .modules_wow64_safe()
        .context("Failed to enumerate modules")?;
    // Not every target reports a main module; the list is still useful.
    let main = process.main_module_wow64_safe().ok();

    let mut lines = Vec::with_capacity(modules.len() + 2);
    lines.push(format!("{}-bit target, {} modules", bits, modules.len()));
    lines.push(format!("{:<40} {:>18} {:>12}", "NAME", "BASE", "SIZE"));
    for module in &modules {
        lines.push(format_module(module, main.as_ref() == Some(module)));
    }
    Ok(lines)
}

fn format_module(module: &ModuleInfo, is_main: bool) -> String {
    let marker = if is_main { " (main)" } else { "" };
    format!(
        "{:<40} {:>#18x} {:>#12x}{}",
        module.name, module.base_address, module.size, marker
    )
}
