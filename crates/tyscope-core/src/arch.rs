//! # Architecture Profiles
//!
//! Word sizes, alignment and byte order of the targets whose runtime type
//! descriptors we know how to decode.
//!
//! The runtime we decode uses a 32-bit native `int` (and `float`) on every
//! supported target, including amd64. Only pointers change size.

use std::fmt;
use std::str::FromStr;

use crate::error::{TyscopeError, TyscopeResult};

/// Target CPU/ABI profile
///
/// ## Supported Architectures
///
/// | profile | pointer | int | float |
/// |---------|---------|-----|-------|
/// | amd64   | 8       | 4   | 4     |
/// | 386     | 4       | 4   | 4     |
/// | arm     | 4       | 4   | 4     |
///
/// All three are little-endian.
///
/// ## Example
///
/// ```rust
/// use tyscope_core::types::Architecture;
///
/// let arch: Architecture = "amd64".parse()?;
/// assert_eq!(arch.pointer_size(), 8);
/// assert_eq!(arch.align(13, 8), 16);
/// # Ok::<(), tyscope_core::error::TyscopeError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit x86
    Amd64,
    /// 32-bit x86
    I386,
    /// 32-bit ARM
    Arm,
}

impl Architecture
{
    /// Every supported profile
    pub const ALL: [Architecture; 3] = [Architecture::Amd64, Architecture::I386, Architecture::Arm];

    /// Profile of the machine running the debugger, if it is a supported target.
    pub const fn current() -> Option<Self>
    {
        if cfg!(target_arch = "x86_64") {
            Some(Architecture::Amd64)
        } else if cfg!(target_arch = "x86") {
            Some(Architecture::I386)
        } else if cfg!(target_arch = "arm") {
            Some(Architecture::Arm)
        } else {
            None
        }
    }

    /// Size of a pointer in bytes.
    #[must_use]
    pub const fn pointer_size(self) -> u64
    {
        match self {
            Architecture::Amd64 => 8,
            Architecture::I386 | Architecture::Arm => 4,
        }
    }

    /// Size of the runtime's native `int` and `uint` in bytes.
    #[must_use]
    pub const fn int_size(self) -> u64
    {
        4
    }

    /// Size of the runtime's native `float` in bytes.
    #[must_use]
    pub const fn float_size(self) -> u64
    {
        4
    }

    /// Round `offset` up to the next multiple of `alignment`.
    ///
    /// An alignment of zero leaves the offset untouched.
    #[must_use]
    pub const fn align(self, offset: u64, alignment: u64) -> u64
    {
        if alignment == 0 {
            return offset;
        }
        offset.div_ceil(alignment) * alignment
    }

    /// Decode a target word of `bytes.len()` bytes (at most 8).
    #[must_use]
    pub fn to_word(self, bytes: &[u8]) -> u64
    {
        bytes.iter().rev().fold(0, |word, byte| (word << 8) | u64::from(*byte))
    }

    /// Encode the low `out.len()` bytes of `value` in target byte order.
    pub fn from_word(self, value: u64, out: &mut [u8])
    {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = value.checked_shr(8 * i as u32).unwrap_or(0) as u8;
        }
    }

    /// Decode a 4-byte target float.
    #[must_use]
    pub fn to_f32(self, bytes: &[u8]) -> f32
    {
        f32::from_bits(self.to_word(bytes) as u32)
    }

    /// Decode an 8-byte target float.
    #[must_use]
    pub fn to_f64(self, bytes: &[u8]) -> f64
    {
        f64::from_bits(self.to_word(bytes))
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::Amd64 => write!(f, "amd64"),
            Architecture::I386 => write!(f, "386"),
            Architecture::Arm => write!(f, "arm"),
        }
    }
}

impl FromStr for Architecture
{
    type Err = TyscopeError;

    fn from_str(s: &str) -> TyscopeResult<Self>
    {
        match s.to_lowercase().as_str() {
            "amd64" | "x86_64" | "x86-64" => Ok(Architecture::Amd64),
            "386" | "i386" | "x86" => Ok(Architecture::I386),
            "arm" => Ok(Architecture::Arm),
            _ => Err(TyscopeError::InvalidArgument(format!(
                "unknown architecture: {s}. Use 'amd64', '386' or 'arm'"
            ))),
        }
    }
}
