//! Descriptor-writing fixture shared by the integration tests.
//!
//! Lays out runtime type descriptors in a [`MemoryImage`] using the record
//! layouts the engine itself computes for the architecture, and hands out a
//! [`RemoteProcess`] over the result.

#![allow(dead_code)]

use tyscope_core::prelude::*;
use tyscope_core::runtime::fields;

pub const HEAP_BASE: u64 = 0x0010_0000;
pub const HEAP_SIZE: usize = 0x0004_0000;
pub const TAG_BASE: u64 = 0x7f00_0000;
pub const TAG_STRIDE: u64 = 0x40;

/// One entry of a struct descriptor's field list.
#[derive(Debug, Clone, Copy)]
pub struct FieldDesc
{
    /// `None` for an embedded field
    pub name: Option<&'static str>,
    pub typ: Address,
    pub offset: u64,
}

impl FieldDesc
{
    pub fn named(name: &'static str, typ: Address, offset: u64) -> Self
    {
        Self { name: Some(name), typ, offset }
    }

    pub fn embedded(typ: Address, offset: u64) -> Self
    {
        Self { name: None, typ, offset }
    }
}

/// Kind-specific part of a descriptor.
#[derive(Debug, Clone)]
pub enum Shape
{
    Plain,
    Pointer(Address),
    Slice(Address),
    Array
    {
        len: u64,
        elem: Address,
    },
    Struct(Vec<FieldDesc>),
}

/// A descriptor to write.
#[derive(Debug, Clone)]
pub struct Desc
{
    pub tag: u64,
    pub size: u64,
    pub align: u64,
    pub name: Option<&'static str>,
    pub shape: Shape,
}

pub struct Fixture
{
    pub arch: Architecture,
    pub registry: TypeRegistry,
    pub runtime: RuntimeTypes,
    pub kinds: KindTable,
    pub image: MemoryImage,
    next: u64,
}

impl Fixture
{
    pub fn new(arch: Architecture) -> Self
    {
        let mut registry = TypeRegistry::new();
        let runtime = RuntimeTypes::new(&mut registry, arch).unwrap();
        let mut kinds = KindTable::new();
        for (index, (kind, _)) in RuntimeKind::SYMBOLS.iter().enumerate() {
            kinds.insert(tag_for(index), *kind);
        }
        let mut image = MemoryImage::new();
        image.map(Address::from(HEAP_BASE), vec![0; HEAP_SIZE]);
        Self {
            arch,
            registry,
            runtime,
            kinds,
            image,
            next: HEAP_BASE + 0x100,
        }
    }

    /// Symbol table naming every kind tag, as a target binary would.
    pub fn kind_symbols() -> SymbolTable
    {
        let mut symbols = SymbolTable::new();
        for (index, (_, name)) in RuntimeKind::SYMBOLS.iter().enumerate() {
            symbols.insert(*name, Address::from(tag_for(index)), TAG_STRIDE);
        }
        symbols
    }

    pub fn tag(&self, kind: RuntimeKind) -> u64
    {
        self.kinds.tag_of(kind).unwrap()
    }

    pub fn alloc(&mut self, size: u64) -> Address
    {
        let address = self.next.div_ceil(8) * 8;
        self.next = address + size.max(1);
        assert!(self.next <= HEAP_BASE + HEAP_SIZE as u64, "fixture heap exhausted");
        Address::from(address)
    }

    /// Allocate a `Type` header to be filled in later with [`Fixture::define`].
    pub fn reserve(&mut self) -> Address
    {
        let size = self.size_of(self.runtime.header);
        self.alloc(size)
    }

    pub fn write_word(&mut self, address: Address, size: u64, value: u64)
    {
        let mut bytes = vec![0; size as usize];
        self.arch.from_word(value, &mut bytes);
        self.image.write(address, &bytes).unwrap();
    }

    pub fn write_bytes(&mut self, address: Address, bytes: &[u8])
    {
        self.image.write(address, bytes).unwrap();
    }

    /// A string header (data pointer, `int` length) holding `value`.
    pub fn string(&mut self, value: &str) -> Address
    {
        let data = self.alloc(value.len() as u64);
        self.write_bytes(data, value.as_bytes());
        let header = self.alloc(self.arch.pointer_size() + self.arch.int_size());
        self.write_word(header, self.arch.pointer_size(), data.value());
        self.write_word(header + self.arch.pointer_size(), self.arch.int_size(), value.len() as u64);
        header
    }

    /// Write field `index` of the record `record` living at `base`.
    pub fn put(&mut self, record: RemoteTypeId, base: Address, index: usize, value: u64)
    {
        let field = self.registry.struct_layout(record).unwrap()[index];
        let size = self.size_of(field.field_type);
        self.write_word(base + field.offset, size, value);
    }

    /// Kind-specific record of the descriptor whose `Type` header is at `header`.
    pub fn record_of(&self, header: Address) -> Address
    {
        let offset = self.registry.field_offset(self.runtime.header, fields::header::PTR).unwrap();
        let bytes = self
            .image
            .read_memory(header + offset, self.arch.pointer_size() as usize)
            .unwrap();
        Address::from(self.arch.to_word(&bytes))
    }

    pub fn size_of(&self, ty: RemoteTypeId) -> u64
    {
        self.registry.layout(ty).unwrap().size
    }

    /// Fill in the descriptor whose `Type` header is at `header`.
    pub fn define(&mut self, header: Address, desc: Desc)
    {
        let runtime = self.runtime;
        let record_type = match desc.shape {
            Shape::Plain => runtime.common,
            Shape::Pointer(_) => runtime.ptr_type,
            Shape::Slice(_) => runtime.slice_type,
            Shape::Array { .. } => runtime.array_type,
            Shape::Struct(_) => runtime.struct_type,
        };
        let record = self.alloc(self.size_of(record_type));

        self.put(runtime.common, record, fields::common::SIZE, desc.size);
        self.put(runtime.common, record, fields::common::ALIGN, desc.align);
        self.put(runtime.common, record, fields::common::FIELD_ALIGN, desc.align);
        if let Some(name) = desc.name {
            let uncommon = self.alloc(self.size_of(runtime.uncommon));
            let name = self.string(name);
            self.put(runtime.uncommon, uncommon, fields::uncommon::NAME, name.value());
            self.put(runtime.common, record, fields::common::UNCOMMON, uncommon.value());
        }

        match desc.shape {
            Shape::Plain => {}
            Shape::Pointer(elem) => self.put(runtime.ptr_type, record, fields::elem_type::ELEM, elem.value()),
            Shape::Slice(elem) => self.put(runtime.slice_type, record, fields::elem_type::ELEM, elem.value()),
            Shape::Array { len, elem } => {
                self.put(runtime.array_type, record, fields::array_type::ELEM, elem.value());
                self.put(runtime.array_type, record, fields::array_type::LEN, len);
            }
            Shape::Struct(entries) => {
                let entry_size = self.size_of(runtime.struct_field);
                let data = self.alloc(entry_size * entries.len() as u64);
                for (index, entry) in entries.iter().enumerate() {
                    let base = data + index as u64 * entry_size;
                    let name = entry.name.map_or(0, |name| self.string(name).value());
                    self.put(runtime.struct_field, base, fields::struct_field::NAME, name);
                    self.put(runtime.struct_field, base, fields::struct_field::TYP, entry.typ.value());
                    self.put(runtime.struct_field, base, fields::struct_field::OFFSET, entry.offset);
                }
                let offset = self.registry.field_offset(runtime.struct_type, fields::struct_type::FIELDS).unwrap();
                self.write_slice_header(record + offset, data, entries.len() as u64);
            }
        }

        self.put(runtime.header, header, fields::header::TYP, desc.tag);
        self.put(runtime.header, header, fields::header::PTR, record.value());
    }

    pub fn write_slice_header(&mut self, at: Address, data: Address, len: u64)
    {
        let (ptr, int) = (self.arch.pointer_size(), self.arch.int_size());
        self.write_word(at, ptr, data.value());
        self.write_word(at + ptr, int, len);
        self.write_word(at + ptr + int, int, len);
    }

    pub fn describe(&mut self, desc: Desc) -> Address
    {
        let header = self.reserve();
        self.define(header, desc);
        header
    }

    pub fn primitive(&mut self, primitive: Primitive) -> Address
    {
        self.primitive_desc(primitive, None)
    }

    pub fn named_primitive(&mut self, name: &'static str, primitive: Primitive) -> Address
    {
        self.primitive_desc(primitive, Some(name))
    }

    fn primitive_desc(&mut self, primitive: Primitive, name: Option<&'static str>) -> Address
    {
        let size = primitive.size(self.arch);
        let align = if primitive == Primitive::String { self.arch.pointer_size() } else { size };
        let tag = self.tag(RuntimeKind::Primitive(primitive));
        self.describe(Desc {
            tag,
            size,
            align,
            name,
            shape: Shape::Plain,
        })
    }

    pub fn unmodeled(&mut self, kind: UnmodeledKind) -> Address
    {
        let tag = self.tag(RuntimeKind::Unmodeled(kind));
        let ptr = self.arch.pointer_size();
        self.describe(Desc {
            tag,
            size: ptr,
            align: ptr,
            name: None,
            shape: Shape::Plain,
        })
    }

    pub fn pointer_desc(&self, elem: Address) -> Desc
    {
        let ptr = self.arch.pointer_size();
        Desc {
            tag: self.tag(RuntimeKind::Pointer),
            size: ptr,
            align: ptr,
            name: None,
            shape: Shape::Pointer(elem),
        }
    }

    pub fn pointer(&mut self, elem: Address) -> Address
    {
        let desc = self.pointer_desc(elem);
        self.describe(desc)
    }

    pub fn slice(&mut self, elem: Address) -> Address
    {
        let ptr = self.arch.pointer_size();
        let tag = self.tag(RuntimeKind::Slice);
        self.describe(Desc {
            tag,
            size: ptr + 2 * self.arch.int_size(),
            align: ptr,
            name: None,
            shape: Shape::Slice(elem),
        })
    }

    pub fn array(&mut self, len: u64, elem: Address, elem_size: u64, elem_align: u64) -> Address
    {
        let tag = self.tag(RuntimeKind::Array);
        self.describe(Desc {
            tag,
            size: len * elem_size,
            align: elem_align,
            name: None,
            shape: Shape::Array { len, elem },
        })
    }

    pub fn struct_desc(&self, name: Option<&'static str>, fields: Vec<FieldDesc>, size: u64, align: u64) -> Desc
    {
        Desc {
            tag: self.tag(RuntimeKind::Struct),
            size,
            align,
            name,
            shape: Shape::Struct(fields),
        }
    }

    pub fn structure(&mut self, name: Option<&'static str>, fields: Vec<FieldDesc>, size: u64, align: u64) -> Address
    {
        let desc = self.struct_desc(name, fields, size, align);
        self.describe(desc)
    }

    /// Split into the registry and a session over the written memory.
    pub fn finish(self) -> (TypeRegistry, RemoteProcess)
    {
        let process = RemoteProcess::new(Box::new(self.image), self.runtime, self.kinds);
        (self.registry, process)
    }
}

pub fn tag_for(index: usize) -> u64
{
    TAG_BASE + index as u64 * TAG_STRIDE
}
