//! Target address type.

use std::fmt;
use std::ops::Add;

/// Address in the target process's address space
///
/// Wrapping the raw word keeps target addresses apart from sizes, offsets
/// and kind tags, which are all plain `u64`s in this crate as well.
///
/// ## Example
///
/// ```rust
/// use tyscope_core::types::Address;
///
/// let base = Address::from(0x1000);
/// assert_eq!((base + 0x10).value(), 0x1010);
/// assert!(Address::NULL.is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The nil pointer value
    pub const NULL: Self = Address(0);

    /// Create a new address from a raw word (usable in const contexts)
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw word of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the nil pointer
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add a byte offset, returning `None` on overflow
    ///
    /// ```rust
    /// use tyscope_core::types::Address;
    ///
    /// assert_eq!(Address::from(0x1000).checked_add(8), Some(Address::from(0x1008)));
    /// assert_eq!(Address::from(u64::MAX).checked_add(1), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}
