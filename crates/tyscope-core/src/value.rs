//! # Remote Values
//!
//! Value makers and the typed wrappers they produce.
//!
//! A [`ValueMaker`] is bound to a remote type when the type is finalized and
//! captures only layout data (element type, length, field offsets). Making a
//! value never touches target memory: reads happen later, on demand, through
//! a [`ReadContext`].
//!
//! ```rust
//! use tyscope_core::prelude::*;
//!
//! let mut registry = TypeRegistry::new();
//! let arch = Architecture::I386;
//! let uint32 = registry.universe().primitive(Primitive::Uint32);
//! let ty = registry.resolve_manual(uint32, arch)?;
//!
//! let mut image = MemoryImage::new();
//! image.map(Address::from(0x100), vec![0x2a, 0, 0, 0]);
//!
//! let cx = ReadContext::new(&image, arch, &registry);
//! let value = registry.make_value(ty, Address::from(0x100))?.into_scalar()?;
//! assert_eq!(value.get_uint(&cx)?, 42);
//! # Ok::<(), tyscope_core::error::TyscopeError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use crate::arch::Architecture;
use crate::error::{TyscopeError, TyscopeResult};
use crate::memory::TargetMemory;
use crate::registry::{RemoteTypeId, StructFieldLayout, TypeRegistry};
use crate::types::Address;
use crate::universe::Primitive;

/// Factory turning a remote address into a [`RemoteValue`].
///
/// One variant per supported kind. Kinds the engine does not model are made
/// with `Scalar(Primitive::Uintptr)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueMaker
{
    Scalar(Primitive),
    Pointer
    {
        elem: RemoteTypeId
    },
    Array
    {
        len: u64,
        elem: RemoteTypeId,
    },
    Slice
    {
        elem: RemoteTypeId
    },
    Struct
    {
        layout: Arc<[StructFieldLayout]>
    },
}

impl ValueMaker
{
    /// Wrap `address` as a value of the bound type.
    #[must_use]
    pub fn make(&self, address: Address) -> RemoteValue
    {
        match self {
            ValueMaker::Scalar(kind) => RemoteValue::Scalar(RemoteScalar { address, kind: *kind }),
            ValueMaker::Pointer { elem } => RemoteValue::Pointer(RemotePointer { address, elem: *elem }),
            ValueMaker::Array { len, elem } => RemoteValue::Array(RemoteArray {
                address,
                len: *len,
                elem: *elem,
            }),
            ValueMaker::Slice { elem } => RemoteValue::Slice(RemoteSlice { address, elem: *elem }),
            ValueMaker::Struct { layout } => RemoteValue::Struct(RemoteStruct {
                address,
                layout: Arc::clone(layout),
            }),
        }
    }
}

/// Everything needed to read a remote value: memory, byte order and the
/// registry the value's element types live in.
#[derive(Clone, Copy)]
pub struct ReadContext<'a>
{
    memory: &'a dyn TargetMemory,
    arch: Architecture,
    types: &'a TypeRegistry,
}

impl<'a> ReadContext<'a>
{
    pub fn new(memory: &'a dyn TargetMemory, arch: Architecture, types: &'a TypeRegistry) -> Self
    {
        Self { memory, arch, types }
    }

    #[must_use]
    pub const fn arch(&self) -> Architecture
    {
        self.arch
    }

    #[must_use]
    pub const fn types(&self) -> &'a TypeRegistry
    {
        self.types
    }

    fn bytes(&self, address: Address, len: u64) -> TyscopeResult<Vec<u8>>
    {
        self.memory.read_memory(address, len as usize)
    }

    fn word(&self, address: Address, size: u64) -> TyscopeResult<u64>
    {
        Ok(self.arch.to_word(&self.bytes(address, size)?))
    }

    fn pointer(&self, address: Address) -> TyscopeResult<Address>
    {
        self.word(address, self.arch.pointer_size()).map(Address::from)
    }

    fn int(&self, address: Address) -> TyscopeResult<u64>
    {
        self.word(address, self.arch.int_size())
    }

    fn elem_size(&self, elem: RemoteTypeId) -> TyscopeResult<u64>
    {
        self.types
            .layout(elem)
            .map(|layout| layout.size)
            .ok_or(TyscopeError::UnresolvedType(elem))
    }
}

/// A typed view of a value living in target memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteValue
{
    Scalar(RemoteScalar),
    Pointer(RemotePointer),
    Array(RemoteArray),
    Slice(RemoteSlice),
    Struct(RemoteStruct),
}

impl RemoteValue
{
    /// Where the value lives in the target.
    #[must_use]
    pub fn address(&self) -> Address
    {
        match self {
            RemoteValue::Scalar(v) => v.address,
            RemoteValue::Pointer(v) => v.address,
            RemoteValue::Array(v) => v.address,
            RemoteValue::Slice(v) => v.address,
            RemoteValue::Struct(v) => v.address,
        }
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str
    {
        match self {
            RemoteValue::Scalar(_) => "scalar",
            RemoteValue::Pointer(_) => "pointer",
            RemoteValue::Array(_) => "array",
            RemoteValue::Slice(_) => "slice",
            RemoteValue::Struct(_) => "struct",
        }
    }

    pub fn into_scalar(self) -> TyscopeResult<RemoteScalar>
    {
        match self {
            RemoteValue::Scalar(v) => Ok(v),
            other => Err(unexpected("scalar", &other)),
        }
    }

    pub fn into_pointer(self) -> TyscopeResult<RemotePointer>
    {
        match self {
            RemoteValue::Pointer(v) => Ok(v),
            other => Err(unexpected("pointer", &other)),
        }
    }

    pub fn into_array(self) -> TyscopeResult<RemoteArray>
    {
        match self {
            RemoteValue::Array(v) => Ok(v),
            other => Err(unexpected("array", &other)),
        }
    }

    pub fn into_slice(self) -> TyscopeResult<RemoteSlice>
    {
        match self {
            RemoteValue::Slice(v) => Ok(v),
            other => Err(unexpected("slice", &other)),
        }
    }

    pub fn into_struct(self) -> TyscopeResult<RemoteStruct>
    {
        match self {
            RemoteValue::Struct(v) => Ok(v),
            other => Err(unexpected("struct", &other)),
        }
    }
}

fn unexpected(expected: &'static str, found: &RemoteValue) -> TyscopeError
{
    TyscopeError::UnexpectedValue {
        expected,
        found: found.kind_name(),
    }
}

/// A decoded primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar
{
    Bool(bool),
    Uint(u64),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Uint(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::String(v) => write!(f, "{v:?}"),
        }
    }
}

/// A primitive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteScalar
{
    pub address: Address,
    pub kind: Primitive,
}

impl RemoteScalar
{
    /// Read and decode the value.
    pub fn get(&self, cx: &ReadContext<'_>) -> TyscopeResult<Scalar>
    {
        let arch = cx.arch();
        let size = self.kind.size(arch);
        match self.kind {
            Primitive::Bool => Ok(Scalar::Bool(cx.word(self.address, size)? != 0)),
            kind if kind.is_unsigned() => cx.word(self.address, size).map(Scalar::Uint),
            kind if kind.is_signed() => {
                let word = cx.word(self.address, size)?;
                let shift = 64 - 8 * size as u32;
                Ok(Scalar::Int(((word << shift) as i64) >> shift))
            }
            Primitive::Float32 => Ok(Scalar::Float(f64::from(arch.to_f32(&cx.bytes(self.address, 4)?)))),
            Primitive::Float64 => Ok(Scalar::Float(arch.to_f64(&cx.bytes(self.address, 8)?))),
            Primitive::Float if size == 4 => Ok(Scalar::Float(f64::from(arch.to_f32(&cx.bytes(self.address, 4)?)))),
            Primitive::Float => Ok(Scalar::Float(arch.to_f64(&cx.bytes(self.address, 8)?))),
            _ => self.get_string(cx).map(Scalar::String),
        }
    }

    /// Read an unsigned integer value.
    ///
    /// ## Errors
    ///
    /// `UnexpectedValue` if the scalar is not of an unsigned kind.
    pub fn get_uint(&self, cx: &ReadContext<'_>) -> TyscopeResult<u64>
    {
        if !self.kind.is_unsigned() {
            return Err(TyscopeError::UnexpectedValue {
                expected: "unsigned integer",
                found: self.kind.name(),
            });
        }
        cx.word(self.address, self.kind.size(cx.arch()))
    }

    /// Read a string value: a data pointer followed by an `int` length.
    pub fn get_string(&self, cx: &ReadContext<'_>) -> TyscopeResult<String>
    {
        if self.kind != Primitive::String {
            return Err(TyscopeError::UnexpectedValue {
                expected: "string",
                found: self.kind.name(),
            });
        }
        let data = cx.pointer(self.address)?;
        let len = cx.int(self.address + cx.arch().pointer_size())?;
        if len == 0 {
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&cx.bytes(data, len)?).into_owned())
    }
}

/// A pointer value; `elem` is the pointee's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePointer
{
    pub address: Address,
    pub elem: RemoteTypeId,
}

impl RemotePointer
{
    /// The raw pointer word.
    pub fn target(&self, cx: &ReadContext<'_>) -> TyscopeResult<Address>
    {
        cx.pointer(self.address)
    }

    /// Follow the pointer. Nil yields `None`.
    pub fn get(&self, cx: &ReadContext<'_>) -> TyscopeResult<Option<RemoteValue>>
    {
        let target = self.target(cx)?;
        if target.is_null() {
            return Ok(None);
        }
        cx.types().make_value(self.elem, target).map(Some)
    }
}

/// A fixed-length sequence of `len` elements starting at `address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteArray
{
    pub address: Address,
    pub len: u64,
    pub elem: RemoteTypeId,
}

impl RemoteArray
{
    /// Element `index`, addressed as `address + index * size(elem)`.
    ///
    /// ## Errors
    ///
    /// - `IndexOutOfBounds`: `index >= len`
    /// - `UnmappedMemory`: the element would lie past the end of the address space
    pub fn elem(&self, cx: &ReadContext<'_>, index: u64) -> TyscopeResult<RemoteValue>
    {
        if index >= self.len {
            return Err(TyscopeError::IndexOutOfBounds { index, len: self.len });
        }
        let size = cx.elem_size(self.elem)?;
        let address = index
            .checked_mul(size)
            .and_then(|offset| self.address.checked_add(offset))
            .ok_or(TyscopeError::UnmappedMemory {
                address: self.address,
                len: size as usize,
            })?;
        cx.types().make_value(self.elem, address)
    }
}

/// Decoded slice header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader
{
    /// The backing array, `len` elements long
    pub base: RemoteArray,
    pub len: u64,
    pub cap: u64,
}

/// A slice value: data pointer, `int` length, `int` capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSlice
{
    pub address: Address,
    pub elem: RemoteTypeId,
}

impl RemoteSlice
{
    pub fn get(&self, cx: &ReadContext<'_>) -> TyscopeResult<SliceHeader>
    {
        let arch = cx.arch();
        let data = cx.pointer(self.address)?;
        let len = cx.int(self.address + arch.pointer_size())?;
        let cap = cx.int(self.address + arch.pointer_size() + arch.int_size())?;
        Ok(SliceHeader {
            base: RemoteArray {
                address: data,
                len,
                elem: self.elem,
            },
            len,
            cap,
        })
    }
}

/// A struct value whose fields are addressed through `layout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStruct
{
    pub address: Address,
    pub layout: Arc<[StructFieldLayout]>,
}

impl RemoteStruct
{
    #[must_use]
    pub fn field_count(&self) -> usize
    {
        self.layout.len()
    }

    /// Field `index`, addressed as `address + layout[index].offset`.
    pub fn field(&self, cx: &ReadContext<'_>, index: usize) -> TyscopeResult<RemoteValue>
    {
        let field = self.layout.get(index).ok_or(TyscopeError::IndexOutOfBounds {
            index: index as u64,
            len: self.layout.len() as u64,
        })?;
        cx.types().make_value(field.field_type, self.address + field.offset)
    }
}
