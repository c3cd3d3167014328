//! Stack and code location type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed stack or code location
///
/// This wrapper around `u64` keeps raw locations from mixing with other
/// numeric values (counts, offsets, ids). The engine never dereferences an
/// `Address`; it only compares, offsets, and forwards them. The embedding
/// runtime is the sole party that knows what lives at one.
///
/// ## Example
///
/// ```rust
/// use kestrel_core::types::Address;
///
/// let sp = Address::from(0x7fff_0000_1000);
/// let slot = sp - 8; // one pointer-width toward the leaf
/// assert_eq!(slot.value(), 0x7fff_0000_0ff8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null location (0x0)
    ///
    /// Used as "no value yet" in register snapshots that have not been
    /// populated by an unwind step.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// Equivalent to `Address::from(value)` but usable in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// True if this is the null location
    pub const fn is_zero(self) -> bool
    {
        self.0 == 0
    }

    /// Subtract an offset, checking for underflow
    ///
    /// Returns `Some(new_address)` if the subtraction doesn't underflow, or
    /// `None` if it does. Chain pruning steps locations back by one pointer
    /// width and must not wrap past zero.
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Add an offset, checking for overflow
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
        write!(f, "0x{:016x}", self.0)
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

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_address_arithmetic()
    {
        let addr = Address::new(0x1000);
        assert_eq!((addr + 0x10).value(), 0x1010);
        assert_eq!((addr - 0x10).value(), 0xff0);
        assert_eq!(addr.checked_sub(0x2000), None);
        assert_eq!(addr.checked_add(8), Some(Address::new(0x1008)));
    }

    #[test]
    fn test_address_display()
    {
        assert_eq!(format!("{}", Address::new(0xabcd)), "0x000000000000abcd");
    }

    #[test]
    fn test_address_zero()
    {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::new(1).is_zero());
    }
}
