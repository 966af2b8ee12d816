//! # Local Type Universe
//!
//! The debugger-side type system that resolved remote types are expressed in.
//!
//! Types live in an arena and are addressed by [`LocalTypeId`]. Primitives
//! have fixed ids, structural types are interned (asking for `*T` twice gives
//! the same id), and named types are created forward-declared so that a
//! recursive type can refer to its own name before its structure is known.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use crate::arch::Architecture;
use crate::error::{TyscopeError, TyscopeResult};

/// Handle to a type in a [`TypeUniverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalTypeId(u32);

impl LocalTypeId
{
    /// Raw arena index (useful for logging).
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

/// Primitive kinds of the target runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive
{
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint,
    Uintptr,
    Int8,
    Int16,
    Int32,
    Int64,
    Int,
    Float32,
    Float64,
    Float,
    String,
}

impl Primitive
{
    /// Every primitive, in arena order.
    pub const ALL: [Primitive; 16] = [
        Primitive::Bool,
        Primitive::Uint8,
        Primitive::Uint16,
        Primitive::Uint32,
        Primitive::Uint64,
        Primitive::Uint,
        Primitive::Uintptr,
        Primitive::Int8,
        Primitive::Int16,
        Primitive::Int32,
        Primitive::Int64,
        Primitive::Int,
        Primitive::Float32,
        Primitive::Float64,
        Primitive::Float,
        Primitive::String,
    ];

    /// Source-level spelling of the primitive.
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            Primitive::Bool => "bool",
            Primitive::Uint8 => "uint8",
            Primitive::Uint16 => "uint16",
            Primitive::Uint32 => "uint32",
            Primitive::Uint64 => "uint64",
            Primitive::Uint => "uint",
            Primitive::Uintptr => "uintptr",
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Int => "int",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Float => "float",
            Primitive::String => "string",
        }
    }

    /// Byte size of a value of this primitive on `arch`.
    ///
    /// Strings are a data pointer followed by an `int` length.
    #[must_use]
    pub const fn size(self, arch: Architecture) -> u64
    {
        match self {
            Primitive::Bool | Primitive::Uint8 | Primitive::Int8 => 1,
            Primitive::Uint16 | Primitive::Int16 => 2,
            Primitive::Uint32 | Primitive::Int32 | Primitive::Float32 => 4,
            Primitive::Uint64 | Primitive::Int64 | Primitive::Float64 => 8,
            Primitive::Uint | Primitive::Int => arch.int_size(),
            Primitive::Uintptr => arch.pointer_size(),
            Primitive::Float => arch.float_size(),
            Primitive::String => arch.pointer_size() + arch.int_size(),
        }
    }

    /// Whether values of this primitive decode as unsigned integers.
    #[must_use]
    pub const fn is_unsigned(self) -> bool
    {
        matches!(
            self,
            Primitive::Uint8
                | Primitive::Uint16
                | Primitive::Uint32
                | Primitive::Uint64
                | Primitive::Uint
                | Primitive::Uintptr
        )
    }

    /// Whether values of this primitive decode as signed integers.
    #[must_use]
    pub const fn is_signed(self) -> bool
    {
        matches!(
            self,
            Primitive::Int8 | Primitive::Int16 | Primitive::Int32 | Primitive::Int64 | Primitive::Int
        )
    }

    const fn index(self) -> u32
    {
        self as u32
    }
}

impl fmt::Display for Primitive
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// One field of a local struct type.
///
/// A field without a name is an embedded (anonymous) field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField
{
    pub name: Option<String>,
    pub ty: LocalTypeId,
}

impl StructField
{
    pub fn named(name: impl Into<String>, ty: LocalTypeId) -> Self
    {
        Self { name: Some(name.into()), ty }
    }

    pub fn anonymous(ty: LocalTypeId) -> Self
    {
        Self { name: None, ty }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool
    {
        self.name.is_none()
    }
}

/// Structure of a local type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalType
{
    Primitive(Primitive),
    /// A named type; `def` stays `None` until the type is completed.
    Named
    {
        name: String,
        def: Option<LocalTypeId>,
    },
    Pointer(LocalTypeId),
    Array
    {
        len: u64,
        elem: LocalTypeId,
    },
    Slice(LocalTypeId),
    Struct(Vec<StructField>),
}

impl LocalType
{
    /// Short kind label used in diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str
    {
        match self {
            LocalType::Primitive(_) => "primitive",
            LocalType::Named { .. } => "named",
            LocalType::Pointer(_) => "pointer",
            LocalType::Array { .. } => "array",
            LocalType::Slice(_) => "slice",
            LocalType::Struct(_) => "struct",
        }
    }
}

/// Arena of local types.
///
/// ## Thread Safety
///
/// The universe is not thread-safe. It is owned by a
/// [`crate::registry::TypeRegistry`]; wrap that in a `Mutex` for shared use.
#[derive(Debug)]
pub struct TypeUniverse
{
    types: Vec<LocalType>,
    interned: HashMap<LocalType, LocalTypeId>,
}

impl Default for TypeUniverse
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl TypeUniverse
{
    /// Create a universe holding only the primitives.
    #[must_use]
    pub fn new() -> Self
    {
        let mut universe = Self {
            types: Vec::with_capacity(64),
            interned: HashMap::new(),
        };
        for primitive in Primitive::ALL {
            universe.intern(LocalType::Primitive(primitive));
        }
        universe
    }

    /// Id of a primitive type.
    #[must_use]
    pub const fn primitive(&self, primitive: Primitive) -> LocalTypeId
    {
        LocalTypeId(primitive.index())
    }

    /// Declare a new named type whose definition is not known yet.
    ///
    /// Named types are never interned: two declarations of the same name are
    /// two distinct types, as they would be in two different packages.
    pub fn named(&mut self, name: impl Into<String>) -> LocalTypeId
    {
        self.push(LocalType::Named {
            name: name.into(),
            def: None,
        })
    }

    /// Complete a forward-declared named type with its structure.
    ///
    /// ## Errors
    ///
    /// `TypeAlreadyComplete` if `named` is not a named type or already has a
    /// definition.
    pub fn complete(&mut self, named: LocalTypeId, def: LocalTypeId) -> TyscopeResult<()>
    {
        if let LocalType::Named { def: slot, .. } = &mut self.types[named.0 as usize] {
            if slot.is_none() {
                *slot = Some(def);
                return Ok(());
            }
        }
        Err(TyscopeError::TypeAlreadyComplete(self.display(named)))
    }

    pub fn pointer(&mut self, elem: LocalTypeId) -> LocalTypeId
    {
        self.intern(LocalType::Pointer(elem))
    }

    pub fn array(&mut self, len: u64, elem: LocalTypeId) -> LocalTypeId
    {
        self.intern(LocalType::Array { len, elem })
    }

    pub fn slice(&mut self, elem: LocalTypeId) -> LocalTypeId
    {
        self.intern(LocalType::Slice(elem))
    }

    pub fn structure(&mut self, fields: Vec<StructField>) -> LocalTypeId
    {
        self.intern(LocalType::Struct(fields))
    }

    /// Look up the structure of a type.
    #[must_use]
    pub fn get(&self, id: LocalTypeId) -> &LocalType
    {
        &self.types[id.0 as usize]
    }

    /// Follow named types to their definition.
    ///
    /// An incomplete named type is its own underlying type.
    #[must_use]
    pub fn underlying(&self, mut id: LocalTypeId) -> LocalTypeId
    {
        while let LocalType::Named { def: Some(def), .. } = self.get(id) {
            id = *def;
        }
        id
    }

    /// Number of types in the arena.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.types.is_empty()
    }

    /// Render a type the way the target language spells it.
    #[must_use]
    pub fn display(&self, id: LocalTypeId) -> String
    {
        let mut out = String::new();
        self.write_type(&mut out, id);
        out
    }

    fn write_type(&self, out: &mut String, id: LocalTypeId)
    {
        match self.get(id) {
            LocalType::Primitive(primitive) => out.push_str(primitive.name()),
            LocalType::Named { name, .. } => out.push_str(name),
            LocalType::Pointer(elem) => {
                out.push('*');
                self.write_type(out, *elem);
            }
            LocalType::Array { len, elem } => {
                let _ = write!(out, "[{len}]");
                self.write_type(out, *elem);
            }
            LocalType::Slice(elem) => {
                out.push_str("[]");
                self.write_type(out, *elem);
            }
            LocalType::Struct(fields) if fields.is_empty() => out.push_str("struct {}"),
            LocalType::Struct(fields) => {
                out.push_str("struct { ");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    if let Some(name) = &field.name {
                        out.push_str(name);
                        out.push(' ');
                    }
                    self.write_type(out, field.ty);
                }
                out.push_str(" }");
            }
        }
    }

    fn intern(&mut self, ty: LocalType) -> LocalTypeId
    {
        if let Some(id) = self.interned.get(&ty) {
            return *id;
        }
        let id = self.push(ty.clone());
        self.interned.insert(ty, id);
        id
    }

    fn push(&mut self, ty: LocalType) -> LocalTypeId
    {
        let id = LocalTypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }
}
