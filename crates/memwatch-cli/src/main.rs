mod cli;
#[cfg(any(target_os = "linux", target_os = "windows"))]
mod commands;
mod shutdown;
#[cfg(any(target_os = "linux", target_os = "windows"))]
mod target;

use anyhow::Result;
use clap::Parser;
use cli::{Args, Command};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("memwatch_cli=info".parse()?)
                .add_directive("memwatch_core=info".parse()?),
        )
        .init();

    run(args)
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
fn run(args: Args) -> Result<()> {
    use commands::resolve::{ResolveRequest, Start};

    let name = args.name.as_deref();
    match args.command {
        Command::Modules => {
            let process = target::attach(args.pid, name)?;
            commands::modules::run(&process)
        }
        Command::Resolve {
            module,
            main: _,
            absolute,
            base,
            offsets,
            deref_type,
            value_type,
            max_bytes,
            encoding,
        } => {
            // clap guarantees exactly one start was given
            let start = match (module, absolute) {
                (Some(module), _) => Start::Module(module),
                (None, Some(address)) => Start::Absolute(address),
                (None, None) => Start::Main,
            };
            let request = ResolveRequest {
                start,
                base,
                offsets,
                deref_type,
                value_type,
                max_bytes,
                encoding,
            };
            let process = target::attach(args.pid, name)?;
            commands::resolve::run(&process, &request)
        }
        Command::Watch { config, interval } => {
            commands::watch::run(&config, args.pid, name, interval)
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn run(_args: Args) -> Result<()> {
    anyhow::bail!("memwatch can only attach to processes on Linux and Windows")
}
