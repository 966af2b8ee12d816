//! # Runtime Descriptor Model
//!
//! How the target runtime describes its own types.
//!
//! Every type descriptor is reached through a `Type` interface header: a
//! kind tag word followed by a pointer to the kind-specific record. Every
//! record starts with a `CommonType`:
//!
//! ```text
//! Type          { typ uintptr; ptr *CommonType }
//! CommonType    { size uintptr; hash uint32; alg uint8; align uint8; fieldAlign uint8;
//!                 string *string; uncommon *UncommonType }
//! UncommonType  { name *string; pkgPath *string; methods []Method }
//! Method        { hash uint32; name *string; pkgPath *string; typ *Type; ifn uintptr; tfn uintptr }
//! StructField   { name *string; pkgPath *string; typ *Type; tag *string; offset uintptr }
//! StructType    { CommonType; fields []StructField }
//! PtrType       { CommonType; elem *Type }
//! SliceType     { CommonType; elem *Type }
//! ArrayType     { CommonType; elem *Type; len uintptr }
//! ```
//!
//! These records are laid out with the manual builder for the session's
//! architecture ([`RuntimeTypes::new`]). The kind tag is the address of the
//! runtime's descriptor for the record type itself (`type.*runtime.PtrType`
//! and friends), so mapping tags to kinds needs the target's symbols
//! ([`KindTable::from_symbols`]).

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::arch::Architecture;
use crate::error::TyscopeResult;
use crate::registry::{RegistryId, RemoteTypeId, TypeRegistry};
use crate::symbols::SymbolLookup;
use crate::universe::{LocalTypeId, Primitive, StructField, TypeUniverse};

/// Field indices of the runtime descriptor records.
pub mod fields
{
    /// `Type` interface header
    pub mod header
    {
        pub const TYP: usize = 0;
        pub const PTR: usize = 1;
    }

    pub mod common
    {
        pub const SIZE: usize = 0;
        pub const HASH: usize = 1;
        pub const ALG: usize = 2;
        pub const ALIGN: usize = 3;
        pub const FIELD_ALIGN: usize = 4;
        pub const STRING: usize = 5;
        pub const UNCOMMON: usize = 6;
    }

    pub mod uncommon
    {
        pub const NAME: usize = 0;
        pub const PKG_PATH: usize = 1;
        pub const METHODS: usize = 2;
    }

    pub mod struct_field
    {
        pub const NAME: usize = 0;
        pub const PKG_PATH: usize = 1;
        pub const TYP: usize = 2;
        pub const TAG: usize = 3;
        pub const OFFSET: usize = 4;
    }

    pub mod struct_type
    {
        pub const COMMON: usize = 0;
        pub const FIELDS: usize = 1;
    }

    /// Shared by `PtrType` and `SliceType`
    pub mod elem_type
    {
        pub const COMMON: usize = 0;
        pub const ELEM: usize = 1;
    }

    pub mod array_type
    {
        pub const COMMON: usize = 0;
        pub const ELEM: usize = 1;
        pub const LEN: usize = 2;
    }
}

/// Kinds the engine deliberately represents as a raw `uintptr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmodeledKind
{
    Map,
    Chan,
    Func,
    Interface,
    UnsafePointer,
    DotDotDot,
}

/// Closed set of runtime type kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind
{
    /// A primitive, decoded without recursion
    Primitive(Primitive),
    Array,
    Struct,
    Pointer,
    Slice,
    /// Approximated as `uintptr`
    Unmodeled(UnmodeledKind),
}

impl RuntimeKind
{
    /// Every kind, each with the runtime symbol whose address is its tag.
    pub const SYMBOLS: [(RuntimeKind, &'static str); 26] = [
        (RuntimeKind::Primitive(Primitive::Bool), "type.*runtime.BoolType"),
        (RuntimeKind::Primitive(Primitive::Uint8), "type.*runtime.Uint8Type"),
        (RuntimeKind::Primitive(Primitive::Uint16), "type.*runtime.Uint16Type"),
        (RuntimeKind::Primitive(Primitive::Uint32), "type.*runtime.Uint32Type"),
        (RuntimeKind::Primitive(Primitive::Uint64), "type.*runtime.Uint64Type"),
        (RuntimeKind::Primitive(Primitive::Uint), "type.*runtime.UintType"),
        (RuntimeKind::Primitive(Primitive::Uintptr), "type.*runtime.UintptrType"),
        (RuntimeKind::Primitive(Primitive::Int8), "type.*runtime.Int8Type"),
        (RuntimeKind::Primitive(Primitive::Int16), "type.*runtime.Int16Type"),
        (RuntimeKind::Primitive(Primitive::Int32), "type.*runtime.Int32Type"),
        (RuntimeKind::Primitive(Primitive::Int64), "type.*runtime.Int64Type"),
        (RuntimeKind::Primitive(Primitive::Int), "type.*runtime.IntType"),
        (RuntimeKind::Primitive(Primitive::Float32), "type.*runtime.Float32Type"),
        (RuntimeKind::Primitive(Primitive::Float64), "type.*runtime.Float64Type"),
        (RuntimeKind::Primitive(Primitive::Float), "type.*runtime.FloatType"),
        (RuntimeKind::Primitive(Primitive::String), "type.*runtime.StringType"),
        (RuntimeKind::Array, "type.*runtime.ArrayType"),
        (RuntimeKind::Struct, "type.*runtime.StructType"),
        (RuntimeKind::Pointer, "type.*runtime.PtrType"),
        (RuntimeKind::Slice, "type.*runtime.SliceType"),
        (RuntimeKind::Unmodeled(UnmodeledKind::Map), "type.*runtime.MapType"),
        (RuntimeKind::Unmodeled(UnmodeledKind::Chan), "type.*runtime.ChanType"),
        (RuntimeKind::Unmodeled(UnmodeledKind::Func), "type.*runtime.FuncType"),
        (RuntimeKind::Unmodeled(UnmodeledKind::Interface), "type.*runtime.InterfaceType"),
        (RuntimeKind::Unmodeled(UnmodeledKind::UnsafePointer), "type.*runtime.UnsafePointerType"),
        (RuntimeKind::Unmodeled(UnmodeledKind::DotDotDot), "type.*runtime.DotDotDotType"),
    ];

    /// Every kind.
    pub fn all() -> impl Iterator<Item = RuntimeKind>
    {
        Self::SYMBOLS.iter().map(|(kind, _)| *kind)
    }
}

impl fmt::Display for RuntimeKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            RuntimeKind::Primitive(primitive) => write!(f, "{primitive}"),
            RuntimeKind::Array => write!(f, "array"),
            RuntimeKind::Struct => write!(f, "struct"),
            RuntimeKind::Pointer => write!(f, "pointer"),
            RuntimeKind::Slice => write!(f, "slice"),
            RuntimeKind::Unmodeled(kind) => write!(f, "{kind:?}"),
        }
    }
}

/// Mapping from kind tag words to kinds.
#[derive(Debug, Clone, Default)]
pub struct KindTable
{
    tags: HashMap<u64, RuntimeKind>,
}

impl KindTable
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Locate every kind's tag in the target's symbols.
    ///
    /// Kinds whose symbol is missing are skipped; a descriptor using one of
    /// them will fail to decode with `UnknownTypeKind`.
    pub fn from_symbols(symbols: &dyn SymbolLookup) -> Self
    {
        let mut table = Self::new();
        for (kind, name) in RuntimeKind::SYMBOLS {
            match symbols.address_of(name) {
                Some(address) => table.insert(address.value(), kind),
                None => warn!("Runtime kind symbol {name} not found; {kind} descriptors cannot be decoded"),
            }
        }
        debug!("Found {} of {} runtime kind tags", table.len(), RuntimeKind::SYMBOLS.len());
        table
    }

    pub fn insert(&mut self, tag: u64, kind: RuntimeKind)
    {
        self.tags.insert(tag, kind);
    }

    #[must_use]
    pub fn kind_of(&self, tag: u64) -> Option<RuntimeKind>
    {
        self.tags.get(&tag).copied()
    }

    /// Tag of `kind`, if known.
    #[must_use]
    pub fn tag_of(&self, kind: RuntimeKind) -> Option<u64>
    {
        self.tags.iter().find(|(_, k)| **k == kind).map(|(tag, _)| *tag)
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.tags.is_empty()
    }

    /// All (tag, kind) pairs, sorted by tag.
    #[must_use]
    pub fn entries(&self) -> Vec<(u64, RuntimeKind)>
    {
        let mut entries: Vec<_> = self.tags.iter().map(|(tag, kind)| (*tag, *kind)).collect();
        entries.sort_by_key(|(tag, _)| *tag);
        entries
    }
}

/// Remote types of the runtime descriptor records on one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeTypes
{
    pub arch: Architecture,
    /// Registry the record types live in
    pub registry: RegistryId,
    pub header: RemoteTypeId,
    pub common: RemoteTypeId,
    pub uncommon: RemoteTypeId,
    pub method: RemoteTypeId,
    pub struct_field: RemoteTypeId,
    pub struct_type: RemoteTypeId,
    pub ptr_type: RemoteTypeId,
    pub slice_type: RemoteTypeId,
    pub array_type: RemoteTypeId,
}

impl RuntimeTypes
{
    /// Record names accepted by [`RuntimeTypes::record`].
    pub const RECORDS: [&'static str; 9] = [
        "Type",
        "CommonType",
        "UncommonType",
        "Method",
        "StructField",
        "StructType",
        "PtrType",
        "SliceType",
        "ArrayType",
    ];

    /// Declare the descriptor records and lay them out for `arch`.
    pub fn new(registry: &mut TypeRegistry, arch: Architecture) -> TyscopeResult<Self>
    {
        let u = registry.universe_mut();
        let uintptr = u.primitive(Primitive::Uintptr);
        let uint32 = u.primitive(Primitive::Uint32);
        let uint8 = u.primitive(Primitive::Uint8);
        let string = u.primitive(Primitive::String);
        let string_ptr = u.pointer(string);

        let type_name = u.named("runtime.Type");
        let type_ptr = u.pointer(type_name);

        let method_def = u.structure(vec![
            StructField::named("hash", uint32),
            StructField::named("name", string_ptr),
            StructField::named("pkgPath", string_ptr),
            StructField::named("typ", type_ptr),
            StructField::named("ifn", uintptr),
            StructField::named("tfn", uintptr),
        ]);
        let method = named(u, "runtime.method", method_def)?;
        let methods = u.slice(method);

        let uncommon_def = u.structure(vec![
            StructField::named("name", string_ptr),
            StructField::named("pkgPath", string_ptr),
            StructField::named("methods", methods),
        ]);
        let uncommon = named(u, "runtime.uncommonType", uncommon_def)?;
        let uncommon_ptr = u.pointer(uncommon);

        let common_def = u.structure(vec![
            StructField::named("size", uintptr),
            StructField::named("hash", uint32),
            StructField::named("alg", uint8),
            StructField::named("align", uint8),
            StructField::named("fieldAlign", uint8),
            StructField::named("string", string_ptr),
            StructField::named("uncommonType", uncommon_ptr),
        ]);
        let common = named(u, "runtime.commonType", common_def)?;
        let common_ptr = u.pointer(common);

        let header_def = u.structure(vec![StructField::named("typ", uintptr), StructField::named("ptr", common_ptr)]);
        u.complete(type_name, header_def)?;

        let struct_field_def = u.structure(vec![
            StructField::named("name", string_ptr),
            StructField::named("pkgPath", string_ptr),
            StructField::named("typ", type_ptr),
            StructField::named("tag", string_ptr),
            StructField::named("offset", uintptr),
        ]);
        let struct_field = named(u, "runtime.structField", struct_field_def)?;
        let struct_fields = u.slice(struct_field);

        let struct_type_def = u.structure(vec![
            StructField::anonymous(common),
            StructField::named("fields", struct_fields),
        ]);
        let struct_type = named(u, "runtime.StructType", struct_type_def)?;

        let elem_def = u.structure(vec![StructField::anonymous(common), StructField::named("elem", type_ptr)]);
        let ptr_type = named(u, "runtime.PtrType", elem_def)?;
        let slice_type = named(u, "runtime.SliceType", elem_def)?;

        let array_def = u.structure(vec![
            StructField::anonymous(common),
            StructField::named("elem", type_ptr),
            StructField::named("len", uintptr),
        ]);
        let array_type = named(u, "runtime.ArrayType", array_def)?;

        Ok(Self {
            arch,
            registry: registry.id(),
            header: registry.resolve_manual(type_name, arch)?,
            common: registry.resolve_manual(common, arch)?,
            uncommon: registry.resolve_manual(uncommon, arch)?,
            method: registry.resolve_manual(method, arch)?,
            struct_field: registry.resolve_manual(struct_field, arch)?,
            struct_type: registry.resolve_manual(struct_type, arch)?,
            ptr_type: registry.resolve_manual(ptr_type, arch)?,
            slice_type: registry.resolve_manual(slice_type, arch)?,
            array_type: registry.resolve_manual(array_type, arch)?,
        })
    }

    /// Remote type of a record by its runtime name.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<RemoteTypeId>
    {
        match name {
            "Type" => Some(self.header),
            "CommonType" => Some(self.common),
            "UncommonType" => Some(self.uncommon),
            "Method" => Some(self.method),
            "StructField" => Some(self.struct_field),
            "StructType" => Some(self.struct_type),
            "PtrType" => Some(self.ptr_type),
            "SliceType" => Some(self.slice_type),
            "ArrayType" => Some(self.array_type),
            _ => None,
        }
    }
}

fn named(universe: &mut TypeUniverse, name: &str, def: LocalTypeId) -> TyscopeResult<LocalTypeId>
{
    let id = universe.named(name);
    universe.complete(id, def)?;
    Ok(id)
}
