//! Commonly used items, for glob import.

#[cfg(target_os = "linux")]
pub use crate::memory::ProcMemory;
pub use crate::arch::Architecture;
pub use crate::config::ResolverConfig;
pub use crate::error::{TyscopeError, TyscopeResult};
pub use crate::memory::{MemoryImage, TargetMemory};
pub use crate::process::{RemoteProcess, ResolveStats};
pub use crate::registry::{Layout, RegistryId, RemoteType, RemoteTypeId, StructFieldLayout, TypeRegistry};
pub use crate::runtime::{KindTable, RuntimeKind, RuntimeTypes, UnmodeledKind};
pub use crate::symbols::{SymbolLookup, SymbolTable};
pub use crate::types::Address;
pub use crate::universe::{LocalType, LocalTypeId, Primitive, StructField, TypeUniverse};
pub use crate::value::{ReadContext, RemoteValue, Scalar};
