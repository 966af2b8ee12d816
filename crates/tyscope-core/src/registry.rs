//! # Type Registry
//!
//! Arena of resolved remote types plus the per-architecture manual type cache.
//!
//! Every [`RemoteType`] lives in a slot addressed by a [`RemoteTypeId`].
//! Composite types refer to their element and field types by id, so a type
//! graph with cycles is just a set of slots pointing at each other.
//!
//! ## Slot lifecycle
//!
//! ```text
//! Placeholder { local: None,    layout: None }      inserted before recursion
//!      |
//!      | (named descriptor)  local = forward-declared named type
//!      v
//! Placeholder { local: Some(_), layout: _ }
//!      |
//!      | finalize
//!      v
//! Resolved(RemoteType)
//! ```
//!
//! Only resolved slots hand out a [`RemoteType`]; a placeholder can be
//! compared by id and asked for its local type, nothing more. Manual pointer
//! types are the one exception: their layout is known before their element
//! is, so they carry it on the placeholder.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::arch::Architecture;
use crate::error::{TyscopeError, TyscopeResult};
use crate::types::Address;
use crate::universe::{LocalTypeId, TypeUniverse};
use crate::value::{RemoteValue, ValueMaker};

/// Handle to a slot in a [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteTypeId(u32);

impl RemoteTypeId
{
    /// Raw arena index (useful for logging).
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl fmt::Display for RemoteTypeId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`TypeRegistry`].
///
/// Ids handed out by one registry mean nothing to another; sessions use
/// this to refuse a registry they were not built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryId(u64);

impl fmt::Display for RegistryId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "registry {}", self.0)
    }
}

/// Size and embedding alignment of a type in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout
{
    pub size: u64,
    pub field_align: u64,
}

/// Position of one field inside a remote struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructFieldLayout
{
    pub offset: u64,
    pub field_type: RemoteTypeId,
}

/// A target type as seen from the debugger.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteType
{
    /// The equivalent type in the local universe
    pub local: LocalTypeId,
    pub layout: Layout,
    /// Turns a remote address into a value of this type
    pub maker: ValueMaker,
}

impl RemoteType
{
    #[must_use]
    pub const fn size(&self) -> u64
    {
        self.layout.size
    }

    #[must_use]
    pub const fn field_align(&self) -> u64
    {
        self.layout.field_align
    }

    /// Wrap `address` as a value of this type. Nothing is read yet.
    #[must_use]
    pub fn make_value(&self, address: Address) -> RemoteValue
    {
        self.maker.make(address)
    }
}

/// State of an arena slot.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSlot
{
    /// Resolution has started but not finished.
    Placeholder
    {
        local: Option<LocalTypeId>,
        layout: Option<Layout>,
    },
    Resolved(RemoteType),
}

/// Owner of all remote types and local types of a debugging session.
///
/// The registry is process-independent: it can serve several
/// [`crate::process::RemoteProcess`] sessions, and its manual type cache is
/// shared by every session with the same architecture. A session is bound
/// to the registry its [`crate::runtime::RuntimeTypes`] were built in and
/// refuses any other.
///
/// ## Thread Safety
///
/// The registry is not thread-safe. If several evaluator threads resolve
/// types, put the registry (together with the sessions that use it) behind a
/// single `Mutex` so placeholder insertion and finalization are serialized.
#[derive(Debug)]
pub struct TypeRegistry
{
    id: RegistryId,
    universe: TypeUniverse,
    slots: Vec<TypeSlot>,
    pub(crate) manual: HashMap<Architecture, HashMap<LocalTypeId, RemoteTypeId>>,
}

impl Default for TypeRegistry
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl TypeRegistry
{
    #[must_use]
    pub fn new() -> Self
    {
        Self {
            id: RegistryId(NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed)),
            universe: TypeUniverse::new(),
            slots: Vec::new(),
            manual: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> RegistryId
    {
        self.id
    }

    #[must_use]
    pub fn universe(&self) -> &TypeUniverse
    {
        &self.universe
    }

    pub fn universe_mut(&mut self) -> &mut TypeUniverse
    {
        &mut self.universe
    }

    /// Current state of a slot, `None` if this registry has no such slot.
    #[must_use]
    pub fn slot(&self, id: RemoteTypeId) -> Option<&TypeSlot>
    {
        self.slots.get(id.0 as usize)
    }

    /// The finalized type, or `None` while the slot is a placeholder.
    #[must_use]
    pub fn get(&self, id: RemoteTypeId) -> Option<&RemoteType>
    {
        match self.slot(id)? {
            TypeSlot::Resolved(ty) => Some(ty),
            TypeSlot::Placeholder { .. } => None,
        }
    }

    #[must_use]
    pub fn is_resolved(&self, id: RemoteTypeId) -> bool
    {
        self.get(id).is_some()
    }

    /// Local type of a slot; available on named placeholders too.
    #[must_use]
    pub fn local_type(&self, id: RemoteTypeId) -> Option<LocalTypeId>
    {
        match self.slot(id)? {
            TypeSlot::Resolved(ty) => Some(ty.local),
            TypeSlot::Placeholder { local, .. } => *local,
        }
    }

    /// Layout of a slot, if already known.
    #[must_use]
    pub fn layout(&self, id: RemoteTypeId) -> Option<Layout>
    {
        match self.slot(id)? {
            TypeSlot::Resolved(ty) => Some(ty.layout),
            TypeSlot::Placeholder { layout, .. } => *layout,
        }
    }

    /// Wrap `address` as a value of the type in slot `id`.
    ///
    /// ## Errors
    ///
    /// `UnresolvedType` if the slot is still a placeholder or does not
    /// exist in this registry.
    pub fn make_value(&self, id: RemoteTypeId, address: Address) -> TyscopeResult<RemoteValue>
    {
        self.get(id)
            .map(|ty| ty.make_value(address))
            .ok_or(TyscopeError::UnresolvedType(id))
    }

    /// Field layout of a resolved struct type.
    #[must_use]
    pub fn struct_layout(&self, id: RemoteTypeId) -> Option<&[StructFieldLayout]>
    {
        match self.get(id).map(|ty| &ty.maker) {
            Some(ValueMaker::Struct { layout }) => Some(&layout[..]),
            _ => None,
        }
    }

    /// Byte offset of field `index` in a resolved struct type.
    #[must_use]
    pub fn field_offset(&self, id: RemoteTypeId, index: usize) -> Option<u64>
    {
        self.struct_layout(id)
            .and_then(|layout| layout.get(index))
            .map(|field| field.offset)
    }

    /// Human-readable spelling of the local type behind a slot.
    #[must_use]
    pub fn describe(&self, id: RemoteTypeId) -> String
    {
        self.local_type(id)
            .map_or_else(|| format!("<unresolved {id}>"), |local| self.universe.display(local))
    }

    /// Number of slots, placeholders included.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.slots.is_empty()
    }

    pub(crate) fn insert_placeholder(&mut self, local: Option<LocalTypeId>, layout: Option<Layout>) -> RemoteTypeId
    {
        self.push(TypeSlot::Placeholder { local, layout })
    }

    pub(crate) fn insert_resolved(&mut self, ty: RemoteType) -> RemoteTypeId
    {
        self.push(TypeSlot::Resolved(ty))
    }

    /// Give a placeholder its (named) local type ahead of finalization.
    pub(crate) fn attach_local(&mut self, id: RemoteTypeId, local: LocalTypeId)
    {
        if let Some(TypeSlot::Placeholder { local: slot, .. }) = self.slots.get_mut(id.0 as usize) {
            *slot = Some(local);
        }
    }

    /// Move a slot to the resolved state.
    ///
    /// Re-finalizing an already resolved slot replaces it; this happens when
    /// an unnamed descriptor inside a cycle is decoded a second time, and the
    /// second pass must arrive at the same local type.
    pub(crate) fn finalize(&mut self, id: RemoteTypeId, ty: RemoteType)
    {
        let Some(slot) = self.slots.get_mut(id.0 as usize) else {
            return;
        };
        if let TypeSlot::Resolved(previous) = slot {
            debug_assert_eq!(previous.local, ty.local, "slot {id} re-finalized with a different local type");
        }
        *slot = TypeSlot::Resolved(ty);
    }

    fn push(&mut self, slot: TypeSlot) -> RemoteTypeId
    {
        let id = RemoteTypeId(self.slots.len() as u32);
        self.slots.push(slot);
        id
    }
}
