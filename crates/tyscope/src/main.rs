use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tyscope_core::prelude::*;
use tyscope_utils::{debug, info, init_logging};

/// Inspect the runtime types of a stopped process.
#[derive(Parser, Debug)]
#[command(name = "tyscope")]
#[command(version)]
#[command(about = "Rebuild and print the runtime types of a stopped process", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Resolve the runtime type descriptor at an address of a stopped process
    Resolve
    {
        /// Process ID (PID) of the stopped, traced process
        #[arg(long)]
        pid: u32,
        /// Executable of the process, for runtime kind symbols
        #[arg(long)]
        binary: PathBuf,
        /// Target architecture (default: the host's)
        #[arg(long)]
        arch: Option<Architecture>,
        /// Log every decoded descriptor with its nearest symbol
        #[arg(long, default_value_t = false)]
        trace: bool,
        /// Address of the descriptor's `Type` header (hex format: 0x4c5a20 or decimal)
        #[arg(value_parser = parse_address)]
        address: Address,
    },
    /// Print the layout of a runtime descriptor record
    Layout
    {
        /// Target architecture (default: the host's)
        #[arg(long)]
        arch: Option<Architecture>,
        /// Record name (Type, CommonType, UncommonType, Method, StructField, StructType, PtrType,
        /// SliceType, ArrayType)
        record: String,
    },
    /// List the runtime kind tags found in an executable
    Kinds
    {
        /// Executable to read symbols from
        #[arg(long)]
        binary: PathBuf,
    },
}

fn main()
{
    let _guard = match init_logging() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    let cli = Cli::parse();
    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> TyscopeResult<()>
{
    match cli.command {
        Commands::Resolve {
            pid,
            binary,
            arch,
            trace,
            address,
        } => {
            let arch = target_arch(arch)?;
            info!("Resolving runtime type at {address} in process {pid} ({arch})");

            let symbols = SymbolTable::from_file(&binary)?;
            let kinds = KindTable::from_symbols(&symbols);
            let mut registry = TypeRegistry::new();
            let runtime = RuntimeTypes::new(&mut registry, arch)?;
            let config = ResolverConfig::from_env();
            let config = config.with_trace_descriptors(config.trace_descriptors || trace);

            let mut process = RemoteProcess::new(attach_memory(pid)?, runtime, kinds)
                .with_symbols(Box::new(symbols))
                .with_config(config);
            let ty = process.resolve_at(&mut registry, address)?;
            debug!("Resolution stats: {:?}", process.stats());

            print_type(&registry, ty);
            Ok(())
        }
        Commands::Layout { arch, record } => {
            let arch = target_arch(arch)?;
            let mut registry = TypeRegistry::new();
            let runtime = RuntimeTypes::new(&mut registry, arch)?;
            let ty = runtime.record(&record).ok_or_else(|| {
                TyscopeError::InvalidArgument(format!(
                    "unknown record {record}; expected one of {}",
                    RuntimeTypes::RECORDS.join(", ")
                ))
            })?;
            println!("{record} on {arch}");
            print_type(&registry, ty);
            Ok(())
        }
        Commands::Kinds { binary } => {
            let symbols = SymbolTable::from_file(&binary)?;
            let kinds = KindTable::from_symbols(&symbols);
            if kinds.is_empty() {
                println!("No runtime kind symbols found in {}", binary.display());
            }
            for (tag, kind) in kinds.entries() {
                println!("{tag:#x}  {kind}");
            }
            Ok(())
        }
    }
}

fn target_arch(arch: Option<Architecture>) -> TyscopeResult<Architecture>
{
    arch.or_else(Architecture::current).ok_or_else(|| {
        TyscopeError::InvalidArgument("host architecture is not a supported target; pass --arch".to_string())
    })
}

#[cfg(target_os = "linux")]
fn attach_memory(pid: u32) -> TyscopeResult<Box<dyn TargetMemory>>
{
    Ok(Box::new(ProcMemory::attach(pid)?))
}

#[cfg(not(target_os = "linux"))]
fn attach_memory(_pid: u32) -> TyscopeResult<Box<dyn TargetMemory>>
{
    Err(TyscopeError::InvalidArgument(
        "reading process memory is only supported on Linux".to_string(),
    ))
}

/// Parse an address in hex (`0x` prefix) or decimal.
fn parse_address(value: &str) -> Result<Address, String>
{
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed
        .map(Address::from)
        .map_err(|e| format!("invalid address {value}: {e}"))
}

fn print_type(registry: &TypeRegistry, ty: RemoteTypeId)
{
    println!("type:  {}", registry.describe(ty));
    if let Some(layout) = registry.layout(ty) {
        println!("size:  {}", layout.size);
        println!("align: {}", layout.field_align);
    }

    let Some(fields) = registry.struct_layout(ty) else {
        return;
    };
    let names: Vec<String> = registry
        .local_type(ty)
        .map(|local| registry.universe().underlying(local))
        .and_then(|local| match registry.universe().get(local) {
            LocalType::Struct(fields) => Some(
                fields
                    .iter()
                    .map(|field| field.name.clone().unwrap_or_else(|| "(embedded)".to_string()))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    println!("fields:");
    for (index, field) in fields.iter().enumerate() {
        let name = names.get(index).map_or("?", String::as_str);
        println!(
            "  {:>6}  {:<16} {}",
            field.offset,
            name,
            registry.describe(field.field_type)
        );
    }
}
