//! winregal: browse the registry, live or from offline hive files.
//!
//! Output goes to stdout; logs go to stderr (`RUST_LOG`, default `warn`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use winregal::backend::HiveRegistry;
use winregal::{parse_path, KeyHandle, RegItem, RegistryApi};

#[derive(Parser, Debug)]
#[command(name = "winregal", version, about)]
struct Cli {
    /// Hive file to mount; pair each with a --mount
    #[arg(long = "hive", value_name = "FILE", global = true)]
    hives: Vec<PathBuf>,

    /// Root-qualified mount point for the matching --hive,
    /// e.g. HKEY_LOCAL_MACHINE\SOFTWARE
    #[arg(long = "mount", value_name = "PATH", global = true)]
    mounts: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the values and subkeys of a key
    Ls {
        path: String,
        /// Walk the whole subtree
        #[arg(short, long)]
        recursive: bool,
    },
    /// Look up a value, falling back to a subkey of the same name
    Get { path: String, name: String },
    /// Print a key's subtree as JSON
    Dump {
        path: String,
        /// Emit full value records instead of bare data
        #[arg(long)]
        keep_type: bool,
    },
}

fn open_registry(cli: &Cli) -> anyhow::Result<Box<dyn RegistryApi>> {
    if !cli.hives.is_empty() || !cli.mounts.is_empty() {
        if cli.hives.len() != cli.mounts.len() {
            bail!(
                "{} --hive and {} --mount arguments; each hive needs a mount point",
                cli.hives.len(),
                cli.mounts.len()
            );
        }
        let mut registry = HiveRegistry::new();
        for (file, mount) in cli.hives.iter().zip(&cli.mounts) {
            let (root, _, path) = parse_path(mount, None)?;
            registry
                .mount_file(root, &path, file)
                .with_context(|| format!("mounting {}", file.display()))?;
        }
        return Ok(Box::new(registry));
    }
    native_registry()
}

#[cfg(all(windows, feature = "native"))]
fn native_registry() -> anyhow::Result<Box<dyn RegistryApi>> {
    Ok(Box::new(winregal::backend::NativeRegistry::new()))
}

#[cfg(not(all(windows, feature = "native")))]
fn native_registry() -> anyhow::Result<Box<dyn RegistryApi>> {
    bail!("no live registry on this platform; mount hive files with --hive/--mount")
}

fn run(cli: &Cli, registry: &dyn RegistryApi) -> anyhow::Result<()> {
    match &cli.command {
        Command::Ls { path, recursive } => {
            let mut key = KeyHandle::new(registry, path)?.recursive(*recursive);
            let key = key.scoped()?;
            for item in key.items()? {
                match item? {
                    RegItem::Value(value) => println!("  {}", value),
                    RegItem::Key(sub) => println!("{}", sub),
                }
            }
        }
        Command::Get { path, name } => {
            let mut key = KeyHandle::new(registry, path)?;
            let key = key.scoped()?;
            println!("{}", key.item(name)?);
        }
        Command::Dump { path, keep_type } => {
            let mut key = KeyHandle::new(registry, path)?;
            let key = key.scoped()?;
            let json = key.to_json(*keep_type)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Logs to stderr so stdout stays clean for JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = open_registry(&cli)?;
    run(&cli, &*registry)
}
