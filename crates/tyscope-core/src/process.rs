//! # Remote Process Session
//!
//! Per-target state of the type engine: how to read the target, where its
//! runtime kind tags live, and which descriptors have already been decoded.
//!
//! A [`RemoteProcess`] owns the type identity cache (descriptor address to
//! [`RemoteTypeId`]). The types themselves live in a [`TypeRegistry`] that is
//! passed into every call, so one registry (and its manual type cache) can
//! serve several sessions. Each session only accepts the registry its
//! [`RuntimeTypes`] were built in; any other is rejected with
//! `InvalidArgument`.
//!
//! Remote descriptors are decoded by [`RemoteProcess::resolve_remote`], see
//! the `parser` module.

use std::collections::HashMap;
use std::fmt;

use smallvec::SmallVec;

use crate::arch::Architecture;
use crate::config::ResolverConfig;
use crate::error::{TyscopeError, TyscopeResult};
use crate::memory::TargetMemory;
use crate::registry::{RemoteTypeId, TypeRegistry};
use crate::runtime::{KindTable, RuntimeTypes};
use crate::symbols::SymbolLookup;
use crate::types::Address;
use crate::value::{ReadContext, RemoteStruct};

/// Counters describing the work done by a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats
{
    /// Descriptor headers decoded, re-decodes included
    pub decoded: u64,
    /// Requests answered from the identity cache
    pub cache_hits: u64,
    /// Unnamed descriptors decoded a second time while closing a cycle
    pub reparsed: u64,
}

/// A traced target process, as seen by the type engine.
pub struct RemoteProcess
{
    pub(crate) memory: Box<dyn TargetMemory>,
    pub(crate) symbols: Option<Box<dyn SymbolLookup>>,
    pub(crate) runtime: RuntimeTypes,
    pub(crate) kinds: KindTable,
    pub(crate) config: ResolverConfig,
    /// Type identity cache: descriptor address to remote type
    pub(crate) types: HashMap<Address, RemoteTypeId>,
    /// Descriptors currently being decoded, outermost first
    pub(crate) active: SmallVec<[Address; 16]>,
    pub(crate) stats: ResolveStats,
}

impl RemoteProcess
{
    /// Start a session over `memory`.
    ///
    /// `runtime` must have been built for the target's architecture, and
    /// `kinds` must hold the target's kind tags.
    pub fn new(memory: Box<dyn TargetMemory>, runtime: RuntimeTypes, kinds: KindTable) -> Self
    {
        Self {
            memory,
            symbols: None,
            runtime,
            kinds,
            config: ResolverConfig::default(),
            types: HashMap::new(),
            active: SmallVec::new(),
            stats: ResolveStats::default(),
        }
    }

    /// Attach a symbol table, used for diagnostics only.
    #[must_use]
    pub fn with_symbols(mut self, symbols: Box<dyn SymbolLookup>) -> Self
    {
        self.symbols = Some(symbols);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ResolverConfig) -> Self
    {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn arch(&self) -> Architecture
    {
        self.runtime.arch
    }

    #[must_use]
    pub const fn runtime(&self) -> &RuntimeTypes
    {
        &self.runtime
    }

    #[must_use]
    pub const fn kinds(&self) -> &KindTable
    {
        &self.kinds
    }

    #[must_use]
    pub const fn stats(&self) -> ResolveStats
    {
        self.stats
    }

    pub fn memory(&self) -> &dyn TargetMemory
    {
        self.memory.as_ref()
    }

    /// Cached remote type of the descriptor at `address`, finished or not.
    #[must_use]
    pub fn cached(&self, address: Address) -> Option<RemoteTypeId>
    {
        self.types.get(&address).copied()
    }

    /// Number of descriptors in the identity cache.
    #[must_use]
    pub fn cached_count(&self) -> usize
    {
        self.types.len()
    }

    /// Reader for values of this process whose types live in `registry`.
    pub fn reader<'a>(&'a self, registry: &'a TypeRegistry) -> ReadContext<'a>
    {
        ReadContext::new(self.memory.as_ref(), self.arch(), registry)
    }

    /// View the `Type` interface header at `address`.
    ///
    /// This is what [`RemoteProcess::resolve_remote`] expects. Nothing is
    /// read until the view is used.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if `registry` is not the one this session was built with.
    pub fn type_descriptor(&self, registry: &TypeRegistry, address: Address) -> TyscopeResult<RemoteStruct>
    {
        self.check_registry(registry)?;
        registry.make_value(self.runtime.header, address)?.into_struct()
    }

    /// Fail unless `registry` holds this session's runtime record types.
    pub(crate) fn check_registry(&self, registry: &TypeRegistry) -> TyscopeResult<()>
    {
        if registry.id() == self.runtime.registry {
            return Ok(());
        }
        Err(TyscopeError::InvalidArgument(format!(
            "session was built with {}, not {}",
            self.runtime.registry,
            registry.id()
        )))
    }

    /// Nearest symbol to `address`, for diagnostics.
    pub(crate) fn symbol_name(&self, address: Address) -> Option<String>
    {
        self.symbols
            .as_ref()
            .and_then(|symbols| symbols.symbol_at(address))
            .map(str::to_owned)
    }
}

impl fmt::Debug for RemoteProcess
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("RemoteProcess")
            .field("arch", &self.arch())
            .field("kinds", &self.kinds.len())
            .field("types", &self.types.len())
            .field("symbols", &self.symbols.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
