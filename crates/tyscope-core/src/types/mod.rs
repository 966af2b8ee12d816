//! # Types
//!
//! Small value types shared by every layer of the engine.
//!
//! Addresses live in the target's address space and are never dereferenced
//! directly; architecture-dependent interpretation of target words lives in
//! [`crate::arch`].

pub mod address;

// Re-export all public types
pub use address::Address;
pub use crate::arch::Architecture;
