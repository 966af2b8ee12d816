//! # Remote Descriptor Parser
//!
//! Rebuilds a target type from the runtime type descriptor the target keeps
//! for it.
//!
//! ## Algorithm
//!
//! 1. An address already in the identity cache with a local type (resolved,
//!    or a named placeholder) is returned as is.
//! 2. Otherwise a placeholder is inserted before anything is read, so that a
//!    chain of descriptors looping back to this address finds it.
//! 3. The header is decoded: kind tag, declared size, field alignment and
//!    the optional name from the uncommon extension. A name becomes a
//!    forward-declared local named type, attached to the placeholder right
//!    away. This is what stops cycles: the runtime only closes a type cycle
//!    through a named type.
//! 4. Element and field descriptors are resolved recursively.
//! 5. The slot is finalized with the declared size, the field alignment and
//!    the value maker, and the named type (if any) is completed.
//!
//! An unnamed placeholder reached again while it is still being decoded is
//! decoded once more: the named type closing the cycle is further down and
//! the second pass reaches it. Reaching the same unnamed address a third
//! time means the cycle has no name at all, which is reported as
//! `UnnamedTypeCycle` instead of recursing forever.
//!
//! A failed resolution is rolled back: every identity cache entry it added
//! is removed before the error is returned.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{TyscopeError, TyscopeResult};
use crate::process::RemoteProcess;
use crate::registry::{Layout, RemoteType, RemoteTypeId, StructFieldLayout, TypeRegistry};
use crate::runtime::{fields, RuntimeKind, UnmodeledKind};
use crate::types::Address;
use crate::universe::{LocalTypeId, Primitive, StructField};
use crate::value::{ReadContext, RemoteStruct, ValueMaker};

/// Upper bound on the field count of a struct descriptor.
const MAX_STRUCT_FIELDS: u64 = 1 << 16;

/// Common part of a descriptor.
#[derive(Debug)]
struct Header
{
    kind: RuntimeKind,
    /// Kind-specific record, starting with the `CommonType`
    record: Address,
    size: u64,
    field_align: u64,
    name: Option<String>,
}

#[derive(Debug)]
struct FieldDescriptor
{
    name: Option<String>,
    typ: Address,
    offset: u64,
}

/// Kind-specific part of a descriptor, with sub-descriptors still unresolved.
#[derive(Debug)]
enum Shape
{
    Primitive(Primitive),
    Unmodeled(UnmodeledKind),
    Pointer(Address),
    Slice(Address),
    Array
    {
        len: u64,
        elem: Address,
    },
    Struct(Vec<FieldDescriptor>),
}

impl RemoteProcess
{
    /// Resolve the remote type described by the `Type` header `descriptor`.
    ///
    /// Resolving the same descriptor again returns the same id without
    /// reading anything.
    ///
    /// ## Errors
    ///
    /// - `UnknownTypeKind`: a descriptor's kind tag is not in the kind table
    /// - `UnnamedTypeCycle`: descriptors loop back without a named type
    /// - `NilDescriptor`: a mandatory descriptor pointer is nil
    /// - `MalformedDescriptor`: a descriptor holds an implausible value
    /// - `InvalidArgument`: `registry` is not this session's registry
    /// - memory errors from the target
    ///
    /// Nothing built during a failed call stays in the identity cache.
    pub fn resolve_remote(
        &mut self,
        registry: &mut TypeRegistry,
        descriptor: &RemoteStruct,
    ) -> TyscopeResult<RemoteTypeId>
    {
        self.check_registry(registry)?;
        let mut journal = Vec::new();
        let result = self.parse(registry, descriptor.address, &mut journal);
        if let Err(err) = &result {
            debug!(
                "Resolving runtime type at {} failed, dropping {} cache entries: {err}",
                descriptor.address,
                journal.len()
            );
            for address in journal {
                self.types.remove(&address);
            }
            self.active.clear();
        }
        result
    }

    /// Resolve the remote type whose `Type` header is at `address`.
    pub fn resolve_at(&mut self, registry: &mut TypeRegistry, address: Address) -> TyscopeResult<RemoteTypeId>
    {
        let descriptor = self.type_descriptor(registry, address)?;
        self.resolve_remote(registry, &descriptor)
    }

    fn parse(
        &mut self,
        registry: &mut TypeRegistry,
        address: Address,
        journal: &mut Vec<Address>,
    ) -> TyscopeResult<RemoteTypeId>
    {
        let id = match self.types.get(&address).copied() {
            Some(id) if registry.local_type(id).is_some() => {
                self.stats.cache_hits += 1;
                return Ok(id);
            }
            Some(id) => {
                let depth = self.active.iter().filter(|active| **active == address).count();
                if depth >= 2 {
                    return Err(TyscopeError::UnnamedTypeCycle(address));
                }
                trace!("Decoding unnamed runtime type at {address} again");
                self.stats.reparsed += 1;
                id
            }
            None => {
                let id = registry.insert_placeholder(None, None);
                self.types.insert(address, id);
                journal.push(address);
                id
            }
        };

        self.active.push(address);
        let result = self.decode(registry, address, id, journal);
        self.active.pop();
        result
    }

    fn decode(
        &mut self,
        registry: &mut TypeRegistry,
        address: Address,
        id: RemoteTypeId,
        journal: &mut Vec<Address>,
    ) -> TyscopeResult<RemoteTypeId>
    {
        self.stats.decoded += 1;
        let header = self.read_header(registry, address)?;
        if self.config.trace_descriptors {
            let symbol = self.symbol_name(address);
            debug!(
                "{:indent$}Parsing type at {address} ({})",
                "",
                symbol.as_deref().unwrap_or("<unknown>"),
                indent = self.active.len().saturating_sub(1)
            );
        }

        let named = header.name.as_deref().map(|name| {
            let local = registry.universe_mut().named(name);
            registry.attach_local(id, local);
            local
        });

        let (structural, maker) = match self.read_shape(registry, address, &header)? {
            Shape::Primitive(primitive) => (registry.universe().primitive(primitive), ValueMaker::Scalar(primitive)),
            Shape::Unmodeled(kind) => {
                debug!("Runtime type at {address} is a {kind:?}; reading it as uintptr");
                let uintptr = registry.universe().primitive(Primitive::Uintptr);
                (uintptr, ValueMaker::Scalar(Primitive::Uintptr))
            }
            Shape::Pointer(elem) => {
                let elem = self.parse(registry, elem, journal)?;
                let local = elem_local(registry, elem)?;
                (registry.universe_mut().pointer(local), ValueMaker::Pointer { elem })
            }
            Shape::Slice(elem) => {
                let elem = self.parse(registry, elem, journal)?;
                let local = elem_local(registry, elem)?;
                (registry.universe_mut().slice(local), ValueMaker::Slice { elem })
            }
            Shape::Array { len, elem } => {
                let elem = self.parse(registry, elem, journal)?;
                let local = elem_local(registry, elem)?;
                (registry.universe_mut().array(len, local), ValueMaker::Array { len, elem })
            }
            Shape::Struct(descriptors) => {
                let mut fields = Vec::with_capacity(descriptors.len());
                let mut layout = Vec::with_capacity(descriptors.len());
                for field in descriptors {
                    let field_type = self.parse(registry, field.typ, journal)?;
                    let local = elem_local(registry, field_type)?;
                    fields.push(match field.name {
                        Some(name) => StructField::named(name, local),
                        None => StructField::anonymous(local),
                    });
                    // The target's compiler laid the struct out; keep its offsets.
                    layout.push(StructFieldLayout {
                        offset: field.offset,
                        field_type,
                    });
                }
                let maker = ValueMaker::Struct {
                    layout: Arc::from(layout),
                };
                (registry.universe_mut().structure(fields), maker)
            }
        };

        let local = match named {
            Some(named) => {
                registry.universe_mut().complete(named, structural)?;
                named
            }
            None => structural,
        };
        registry.finalize(id, RemoteType {
            local,
            layout: Layout {
                size: header.size,
                field_align: header.field_align,
            },
            maker,
        });
        trace!(
            "Runtime type at {address} is {} (size {}, align {})",
            registry.describe(id),
            header.size,
            header.field_align
        );
        Ok(id)
    }

    fn read_header(&self, registry: &TypeRegistry, address: Address) -> TyscopeResult<Header>
    {
        let cx = self.reader(registry);
        let header = self.type_descriptor(registry, address)?;
        let tag = header.field(&cx, fields::header::TYP)?.into_scalar()?.get_uint(&cx)?;
        let Some(kind) = self.kinds.kind_of(tag) else {
            return Err(TyscopeError::UnknownTypeKind {
                address,
                tag,
                symbol: self.symbol_name(Address::from(tag)),
            });
        };

        let record = descriptor_pointer(&cx, &header, fields::header::PTR, address, "type record")?;
        let common = registry.make_value(self.runtime.common, record)?.into_struct()?;
        let size = common.field(&cx, fields::common::SIZE)?.into_scalar()?.get_uint(&cx)?;
        let field_align = common.field(&cx, fields::common::FIELD_ALIGN)?.into_scalar()?.get_uint(&cx)?;
        let name = match common.field(&cx, fields::common::UNCOMMON)?.into_pointer()?.get(&cx)? {
            Some(uncommon) => optional_string(&cx, &uncommon.into_struct()?, fields::uncommon::NAME)?,
            None => None,
        };

        Ok(Header {
            kind,
            record,
            size,
            field_align,
            name,
        })
    }

    fn read_shape(&self, registry: &TypeRegistry, address: Address, header: &Header) -> TyscopeResult<Shape>
    {
        let cx = self.reader(registry);
        let record = |ty: RemoteTypeId| registry.make_value(ty, header.record)?.into_struct();

        let shape = match header.kind {
            RuntimeKind::Primitive(primitive) => Shape::Primitive(primitive),
            RuntimeKind::Unmodeled(kind) => Shape::Unmodeled(kind),
            RuntimeKind::Pointer => {
                let ptr = record(self.runtime.ptr_type)?;
                Shape::Pointer(descriptor_pointer(&cx, &ptr, fields::elem_type::ELEM, address, "pointer elem")?)
            }
            RuntimeKind::Slice => {
                let slice = record(self.runtime.slice_type)?;
                Shape::Slice(descriptor_pointer(&cx, &slice, fields::elem_type::ELEM, address, "slice elem")?)
            }
            RuntimeKind::Array => {
                let array = record(self.runtime.array_type)?;
                Shape::Array {
                    len: array.field(&cx, fields::array_type::LEN)?.into_scalar()?.get_uint(&cx)?,
                    elem: descriptor_pointer(&cx, &array, fields::array_type::ELEM, address, "array elem")?,
                }
            }
            RuntimeKind::Struct => {
                let structure = record(self.runtime.struct_type)?;
                let entries = structure.field(&cx, fields::struct_type::FIELDS)?.into_slice()?.get(&cx)?;
                if entries.len > MAX_STRUCT_FIELDS {
                    return Err(TyscopeError::MalformedDescriptor {
                        address,
                        reason: format!("struct has {} fields", entries.len),
                    });
                }
                let mut descriptors = Vec::new();
                for index in 0..entries.len {
                    let entry = entries.base.elem(&cx, index)?.into_struct()?;
                    descriptors.push(FieldDescriptor {
                        name: optional_string(&cx, &entry, fields::struct_field::NAME)?,
                        typ: descriptor_pointer(&cx, &entry, fields::struct_field::TYP, address, "field type")?,
                        offset: entry.field(&cx, fields::struct_field::OFFSET)?.into_scalar()?.get_uint(&cx)?,
                    });
                }
                Shape::Struct(descriptors)
            }
        };
        Ok(shape)
    }
}

/// Local type of a sub-descriptor that has just been resolved.
///
/// Resolution only hands back slots that have one, so a miss here is an
/// engine bug.
fn elem_local(registry: &TypeRegistry, id: RemoteTypeId) -> TyscopeResult<LocalTypeId>
{
    registry.local_type(id).ok_or(TyscopeError::UnresolvedType(id))
}

/// Follow a descriptor pointer that must not be nil.
fn descriptor_pointer(
    cx: &ReadContext<'_>,
    record: &RemoteStruct,
    index: usize,
    address: Address,
    field: &'static str,
) -> TyscopeResult<Address>
{
    let target = record.field(cx, index)?.into_pointer()?.target(cx)?;
    if target.is_null() {
        return Err(TyscopeError::NilDescriptor { address, field });
    }
    Ok(target)
}

/// Read a `*string` field; nil is `None`.
fn optional_string(cx: &ReadContext<'_>, record: &RemoteStruct, index: usize) -> TyscopeResult<Option<String>>
{
    record
        .field(cx, index)?
        .into_pointer()?
        .get(cx)?
        .map(|value| value.into_scalar()?.get_string(cx))
        .transpose()
}
