//! # tyscope-core
//!
//! Remote type resolution for a debugger.
//!
//! Given a stopped target process and the address of one of its runtime type
//! descriptors, this crate rebuilds the described type inside the debugger
//! and binds it to a value maker that turns any remote address into a typed,
//! lazily read value.
//!
//! This crate provides:
//! - Architecture profiles (pointer and `int` sizes, alignment, byte order)
//! - A local type universe (primitives, named and structural types)
//! - A manual type builder, laying out local types without reading the target
//! - A remote descriptor parser with an identity cache that terminates type cycles
//! - Remote values: scalars, pointers, arrays, slices and structs
//!
//! ## Architecture
//!
//! ```text
//! TypeRegistry ── universe (local types)
//!      │       ── slots (RemoteTypeId -> placeholder | RemoteType)
//!      │       ── manual cache (Architecture -> local type -> RemoteTypeId)
//!      │
//! RemoteProcess ── TargetMemory, SymbolLookup, KindTable, RuntimeTypes
//!               ── identity cache (descriptor Address -> RemoteTypeId)
//! ```
//!
//! The registry is passed explicitly into every call; nothing here is global.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tyscope_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let arch = Architecture::Amd64;
//!     let mut registry = TypeRegistry::new();
//!     let runtime = RuntimeTypes::new(&mut registry, arch)?;
//!
//!     let symbols = SymbolTable::from_file("/path/to/target")?;
//!     let kinds = KindTable::from_symbols(&symbols);
//!     let memory = ProcMemory::attach(4242)?;
//!
//!     let mut process = RemoteProcess::new(Box::new(memory), runtime, kinds).with_symbols(Box::new(symbols));
//!     let ty = process.resolve_at(&mut registry, Address::from(0x4c_5a20))?;
//!     println!("{} ({} bytes)", registry.describe(ty), registry.layout(ty).map_or(0, |l| l.size));
//!     Ok(())
//! }
//! ```

pub mod arch;
pub mod config;
pub mod error;
mod manual;
pub mod memory;
mod parser;
pub mod prelude;
pub mod process;
pub mod registry;
pub mod runtime;
pub mod symbols;
pub mod types;
pub mod universe;
pub mod value;

pub use arch::Architecture;
pub use error::{TyscopeError, TyscopeResult};
pub use process::RemoteProcess;
pub use registry::{RemoteType, RemoteTypeId, TypeRegistry};
