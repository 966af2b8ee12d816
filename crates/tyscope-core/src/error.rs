//! # Error Types
//!
//! Error handling for type resolution and target memory access.
//!
//! We use `thiserror` to generate the `Error` implementations. Resolution
//! failures are not recoverable locally: they are returned as `Err` and
//! travel with `?` all the way to whoever asked for the type.

use thiserror::Error;

use crate::registry::RemoteTypeId;
use crate::types::Address;

/// Main error type for tyscope operations
///
/// ## Error Categories
///
/// 1. **Decoding errors**: UnknownTypeKind, UnnamedTypeCycle, NilDescriptor,
///    MalformedDescriptor
/// 2. **Internal inconsistencies**: UnsupportedManualType, UnresolvedType,
///    UnexpectedValue, TypeAlreadyComplete
/// 3. **Memory errors**: UnmappedMemory, MemoryRead, IndexOutOfBounds
/// 4. **Process errors**: ProcessNotFound, NotStopped, PermissionDenied
/// 5. **Input errors**: InvalidArgument, Symbols, Io
#[derive(Error, Debug)]
pub enum TyscopeError
{
    /// The kind tag of a runtime type descriptor is not one we know.
    ///
    /// This means the decoder's picture of the target runtime is wrong: a
    /// different runtime version, corrupted metadata, or a pointer that
    /// never pointed at a type descriptor in the first place.
    #[error(
        "runtime type at {address} has unexpected kind tag 0x{tag:x} ({})",
        symbol.as_deref().unwrap_or("<unknown symbol>")
    )]
    UnknownTypeKind
    {
        /// Address of the descriptor being decoded
        address: Address,
        /// The kind tag word read from the descriptor
        tag: u64,
        /// Nearest symbol to the tag, if a symbol table was available
        symbol: Option<String>,
    },

    /// The manual builder was asked for a kind it cannot lay out.
    ///
    /// Only the types the engine constructs itself ever go through the
    /// manual builder, so this is an engine bug rather than a target error.
    #[error("cannot manually construct type {0}")]
    UnsupportedManualType(String),

    /// A chain of unnamed types loops back on itself.
    ///
    /// The target runtime only closes type cycles through named types. A
    /// descriptor graph that violates this would otherwise recurse forever.
    #[error("unnamed type cycle through runtime type at {0}")]
    UnnamedTypeCycle(Address),

    /// A value was requested for a type that is still being resolved.
    #[error("remote type {0} is not resolved yet")]
    UnresolvedType(RemoteTypeId),

    /// A descriptor field did not have the shape the runtime layout promises.
    #[error("expected {expected} value, found {found}")]
    UnexpectedValue
    {
        /// The value kind that was required
        expected: &'static str,
        /// The value kind that was actually produced
        found: &'static str,
    },

    /// A descriptor pointer that must be set was nil.
    #[error("nil {field} in runtime type at {address}")]
    NilDescriptor
    {
        /// Address of the descriptor being decoded
        address: Address,
        /// Which pointer was nil
        field: &'static str,
    },

    /// A descriptor field holds a value no real runtime would write.
    #[error("malformed runtime type at {address}: {reason}")]
    MalformedDescriptor
    {
        /// Address of the descriptor being decoded
        address: Address,
        /// What was wrong with it
        reason: String,
    },

    /// A named local type was completed twice, or a non-named type was completed.
    #[error("cannot complete local type {0}")]
    TypeAlreadyComplete(String),

    /// Sequence access outside of its bounds.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds
    {
        /// Requested element index
        index: u64,
        /// Length of the sequence
        len: u64,
    },

    /// The requested range is not mapped in the target.
    #[error("unmapped memory: {len} bytes at {address}")]
    UnmappedMemory
    {
        /// Start of the requested range
        address: Address,
        /// Number of bytes requested
        len: usize,
    },

    /// Reading target memory failed for another reason.
    #[error("failed to read {len} bytes at {address}: {details}")]
    MemoryRead
    {
        /// Start of the requested range
        address: Address,
        /// Number of bytes requested
        len: usize,
        /// Details from the tracing layer
        details: String,
    },

    /// The process with the given PID doesn't exist or has exited
    #[error("Process not found: PID {0}")]
    ProcessNotFound(u32),

    /// The process is running; memory can only be decoded while it is stopped
    #[error("Process {0} must be stopped for this operation")]
    NotStopped(u32),

    /// Insufficient permissions to read the target process
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid argument passed to a tyscope function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The executable's symbol table could not be parsed
    #[error("Symbol table error: {0}")]
    Symbols(String),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, TyscopeError>`
///
/// ```rust
/// use tyscope_core::error::TyscopeResult;
/// fn foo() -> TyscopeResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type TyscopeResult<T> = std::result::Result<T, TyscopeError>;
