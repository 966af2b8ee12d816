//! # Symbols
//!
//! Address-to-name lookup for diagnostics, and name-to-address lookup for
//! locating the runtime's per-kind type descriptors.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tyscope_core::symbols::{SymbolLookup, SymbolTable};
//! use tyscope_core::types::Address;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let table = SymbolTable::from_file("/path/to/binary")?;
//!     if let Some(name) = table.symbol_at(Address::from(0x0804_a000)) {
//!         println!("nearest symbol: {name}");
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use object::{Object, ObjectSymbol};
use tracing::debug;

use crate::error::{TyscopeError, TyscopeResult};
use crate::types::Address;

/// Symbol resolution used by the type engine.
pub trait SymbolLookup: Send + Sync
{
    /// Name of the symbol covering `address`, if any.
    fn symbol_at(&self, address: Address) -> Option<&str>;

    /// Address of the symbol called `name`, if any.
    fn address_of(&self, name: &str) -> Option<Address>;
}

#[derive(Debug, Clone)]
struct SymbolEntry
{
    name: String,
    size: u64,
}

/// In-memory symbol table.
///
/// A symbol with a size covers `[address, address + size)`; a zero-sized
/// symbol only matches its exact address.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable
{
    by_address: BTreeMap<u64, SymbolEntry>,
    by_name: HashMap<String, u64>,
}

impl SymbolTable
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Load the symbol table of an executable image.
    ///
    /// ## Errors
    ///
    /// - `Io`: the file cannot be read
    /// - `Symbols`: the file is not an object format we can parse
    pub fn from_file(path: impl AsRef<Path>) -> TyscopeResult<Self>
    {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let table = Self::from_object_data(&data)?;
        debug!("Loaded {} symbols from {}", table.len(), path.display());
        Ok(table)
    }

    /// Build a table from the bytes of an executable image.
    pub fn from_object_data(data: &[u8]) -> TyscopeResult<Self>
    {
        let file = object::File::parse(data).map_err(|err| TyscopeError::Symbols(err.to_string()))?;
        let mut table = Self::new();
        for symbol in file.symbols() {
            let Ok(name) = symbol.name() else {
                continue;
            };
            if name.is_empty() || symbol.address() == 0 {
                continue;
            }
            table.insert(name, Address::from(symbol.address()), symbol.size());
        }
        Ok(table)
    }

    /// Add a symbol.
    pub fn insert(&mut self, name: impl Into<String>, address: Address, size: u64)
    {
        let name = name.into();
        self.by_name.insert(name.clone(), address.value());
        self.by_address.insert(address.value(), SymbolEntry { name, size });
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.by_address.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.by_address.is_empty()
    }
}

impl SymbolLookup for SymbolTable
{
    fn symbol_at(&self, address: Address) -> Option<&str>
    {
        let (start, entry) = self.by_address.range(..=address.value()).next_back()?;
        let offset = address.value() - start;
        let covered = if entry.size == 0 { offset == 0 } else { offset < entry.size };
        covered.then_some(entry.name.as_str())
    }

    fn address_of(&self, name: &str) -> Option<Address>
    {
        self.by_name.get(name).copied().map(Address::from)
    }
}
