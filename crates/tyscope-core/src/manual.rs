//! # Manual Type Builder
//!
//! Lays out local types for a target architecture without reading anything
//! from the target.
//!
//! Most remote types are decoded from the target's own descriptors, but the
//! descriptors themselves have to be laid out first, and so do the handful
//! of primitives the evaluator uses internally. Those are built here from
//! the architecture profile alone.
//!
//! The manual cache of each architecture is seeded on first use with:
//!
//! | type      | size               | field alignment |
//! |-----------|--------------------|-----------------|
//! | `uint8`   | 1                  | 1               |
//! | `uint32`  | 4                  | 4               |
//! | `uintptr` | pointer            | pointer         |
//! | `int32`   | 4                  | 4               |
//! | `int`     | int                | int             |
//! | `string`  | pointer + int      | pointer         |
//!
//! The remaining primitives are built on demand with the same rule (size
//! from the architecture, alignment equal to size). On top of those,
//! pointers, arrays, slices and structs are supported.
//! Anything else is an internal error.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::arch::Architecture;
use crate::error::{TyscopeError, TyscopeResult};
use crate::registry::{Layout, RemoteType, RemoteTypeId, StructFieldLayout, TypeRegistry};
use crate::universe::{LocalType, LocalTypeId, Primitive};
use crate::value::ValueMaker;

const SEEDED_PRIMITIVES: [Primitive; 6] = [
    Primitive::Uint8,
    Primitive::Uint32,
    Primitive::Uintptr,
    Primitive::Int32,
    Primitive::Int,
    Primitive::String,
];

impl TypeRegistry
{
    /// Build (or reuse) the remote type of `local` on `arch`.
    ///
    /// Named types are laid out as their definition. Resolving the same local
    /// type twice for one architecture returns the same id.
    ///
    /// ## Errors
    ///
    /// `UnsupportedManualType` if `local` is, or contains, a kind the builder
    /// cannot lay out. Nothing built during a failed call stays in the cache.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tyscope_core::prelude::*;
    ///
    /// let mut registry = TypeRegistry::new();
    /// let universe = registry.universe_mut();
    /// let uint8 = universe.primitive(Primitive::Uint8);
    /// let uint32 = universe.primitive(Primitive::Uint32);
    /// let pair = universe.structure(vec![StructField::named("a", uint8), StructField::named("b", uint32)]);
    ///
    /// let id = registry.resolve_manual(pair, Architecture::I386)?;
    /// assert_eq!(registry.field_offset(id, 1), Some(4));
    /// assert_eq!(registry.get(id).map(|ty| ty.size()), Some(8));
    /// # Ok::<(), tyscope_core::error::TyscopeError>(())
    /// ```
    pub fn resolve_manual(&mut self, local: LocalTypeId, arch: Architecture) -> TyscopeResult<RemoteTypeId>
    {
        self.seed_manual(arch);
        let mut journal = Vec::new();
        let result = self.build_manual(local, arch, &mut journal);
        if result.is_err() {
            if let Some(cache) = self.manual.get_mut(&arch) {
                for key in journal {
                    cache.remove(&key);
                }
            }
        }
        result
    }

    /// Id of an already built manual type.
    #[must_use]
    pub fn manual_type(&self, local: LocalTypeId, arch: Architecture) -> Option<RemoteTypeId>
    {
        let local = self.universe().underlying(local);
        self.manual.get(&arch)?.get(&local).copied()
    }

    fn seed_manual(&mut self, arch: Architecture)
    {
        if self.manual.contains_key(&arch) {
            return;
        }
        debug!("Seeding manual types for {arch}");

        let mut cache = HashMap::new();
        for primitive in SEEDED_PRIMITIVES {
            let ty = primitive_type(self, primitive, arch);
            let local = ty.local;
            cache.insert(local, self.insert_resolved(ty));
        }
        self.manual.insert(arch, cache);
    }

    fn build_manual(
        &mut self,
        local: LocalTypeId,
        arch: Architecture,
        journal: &mut Vec<LocalTypeId>,
    ) -> TyscopeResult<RemoteTypeId>
    {
        let local = self.universe().underlying(local);
        if let Some(id) = self.manual_type(local, arch) {
            return Ok(id);
        }

        match self.universe().get(local).clone() {
            LocalType::Primitive(primitive) => {
                let ty = primitive_type(self, primitive, arch);
                Ok(self.register_resolved(arch, ty, journal))
            }
            LocalType::Pointer(elem) => {
                let layout = Layout {
                    size: arch.pointer_size(),
                    field_align: arch.pointer_size(),
                };
                // Registered before the element so that a pointer back to
                // this type finds it instead of recursing.
                let id = self.insert_placeholder(Some(local), Some(layout));
                self.register_manual(arch, local, id, journal);
                let elem = self.build_manual(elem, arch, journal)?;
                self.finalize(id, RemoteType {
                    local,
                    layout,
                    maker: ValueMaker::Pointer { elem },
                });
                Ok(id)
            }
            LocalType::Array { len, elem } => {
                let elem = self.build_manual(elem, arch, journal)?;
                if let Some(id) = self.manual_type(local, arch) {
                    return Ok(id);
                }
                let elem_layout = self.layout(elem).ok_or(TyscopeError::UnresolvedType(elem))?;
                let size = elem_layout
                    .size
                    .checked_mul(len)
                    .ok_or_else(|| self.too_large(local))?;
                let ty = RemoteType {
                    local,
                    layout: Layout {
                        size,
                        field_align: elem_layout.field_align,
                    },
                    maker: ValueMaker::Array { len, elem },
                };
                Ok(self.register_resolved(arch, ty, journal))
            }
            LocalType::Slice(elem) => {
                let elem = self.build_manual(elem, arch, journal)?;
                if let Some(id) = self.manual_type(local, arch) {
                    return Ok(id);
                }
                let ty = RemoteType {
                    local,
                    layout: Layout {
                        size: arch.pointer_size() + 2 * arch.int_size(),
                        field_align: arch.pointer_size(),
                    },
                    maker: ValueMaker::Slice { elem },
                };
                Ok(self.register_resolved(arch, ty, journal))
            }
            LocalType::Struct(fields) => {
                let mut layout = Vec::with_capacity(fields.len());
                let mut offset = 0;
                let mut field_align = 0;
                for field in &fields {
                    let field_type = self.build_manual(field.ty, arch, journal)?;
                    let field_layout = self.layout(field_type).ok_or(TyscopeError::UnresolvedType(field_type))?;
                    if field_align == 0 {
                        field_align = field_layout.field_align;
                    }
                    offset = arch.align(offset, field_layout.field_align);
                    layout.push(StructFieldLayout { offset, field_type });
                    offset = offset
                        .checked_add(field_layout.size)
                        .ok_or_else(|| self.too_large(local))?;
                }

                // A pointer cycle among the fields may have laid this struct
                // out already; keep one remote type per local type. The same
                // holds for arrays and slices above.
                if let Some(id) = self.manual_type(local, arch) {
                    return Ok(id);
                }
                trace!(
                    "Manual layout of {} on {arch}: size {offset}, align {field_align}",
                    self.universe().display(local)
                );
                let ty = RemoteType {
                    local,
                    layout: Layout {
                        size: offset,
                        field_align,
                    },
                    maker: ValueMaker::Struct {
                        layout: Arc::from(layout),
                    },
                };
                Ok(self.register_resolved(arch, ty, journal))
            }
            other => Err(TyscopeError::UnsupportedManualType(format!(
                "{} ({})",
                self.universe().display(local),
                other.kind_name()
            ))),
        }
    }

    fn too_large(&self, local: LocalTypeId) -> TyscopeError
    {
        TyscopeError::UnsupportedManualType(format!(
            "{} (size overflows the address space)",
            self.universe().display(local)
        ))
    }

    fn register_resolved(&mut self, arch: Architecture, ty: RemoteType, journal: &mut Vec<LocalTypeId>) -> RemoteTypeId
    {
        let local = ty.local;
        let id = self.insert_resolved(ty);
        self.register_manual(arch, local, id, journal);
        id
    }

    fn register_manual(
        &mut self,
        arch: Architecture,
        local: LocalTypeId,
        id: RemoteTypeId,
        journal: &mut Vec<LocalTypeId>,
    )
    {
        self.manual.entry(arch).or_default().insert(local, id);
        journal.push(local);
    }
}

fn primitive_type(registry: &TypeRegistry, primitive: Primitive, arch: Architecture) -> RemoteType
{
    let size = primitive.size(arch);
    let field_align = if primitive == Primitive::String { arch.pointer_size() } else { size };
    RemoteType {
        local: registry.universe().primitive(primitive),
        layout: Layout { size, field_align },
        maker: ValueMaker::Scalar(primitive),
    }
}
