//! Stack frame identity and ordering.

use std::fmt;

use crate::types::Address;

/// Opaque identity of one logical stack frame
///
/// A `FramePointer` wraps a stack location but is never dereferenced. Its
/// only job is to say which of two frames is *younger* (closer to the leaf,
/// where execution currently is) and which is *older* (closer to the root,
/// where the thread started). On a downward-growing stack the numerically
/// smaller location is the younger one, and that convention lives entirely
/// inside the comparison methods here - callers never compare raw values.
///
/// Two sentinels bracket every real frame:
///
/// - [`FramePointer::LEAF_MOST`] is younger than any real frame
/// - [`FramePointer::ROOT_MOST`] is older than any real frame
///
/// ## Example
///
/// ```rust
/// use kestrel_core::types::{Address, FramePointer};
///
/// let callee = FramePointer::from_address(Address::new(0x7000));
/// let caller = FramePointer::from_address(Address::new(0x7100));
/// assert!(callee.is_closer_to_leaf(caller));
/// assert!(caller.is_closer_to_root(callee));
/// assert!(FramePointer::LEAF_MOST.is_closer_to_leaf(callee));
/// assert!(FramePointer::ROOT_MOST.is_closer_to_root(caller));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramePointer(u64);

impl FramePointer
{
    /// Younger than every real frame
    ///
    /// Also the default walk target: a walk targeted at `LEAF_MOST`
    /// delivers every frame from the first callback on.
    pub const LEAF_MOST: Self = FramePointer(0);

    /// Older than every real frame
    ///
    /// Only thread-start and enter-unmanaged chain markers may carry this
    /// value in a delivered record.
    pub const ROOT_MOST: Self = FramePointer(u64::MAX);

    /// Identify the frame at a stack location
    pub const fn from_address(address: Address) -> Self
    {
        FramePointer(address.value())
    }

    /// The raw location this identity was built from
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// True for the leaf-most sentinel
    pub const fn is_leaf_most(self) -> bool
    {
        self.0 == Self::LEAF_MOST.0
    }

    /// True for the root-most sentinel
    pub const fn is_root_most(self) -> bool
    {
        self.0 == Self::ROOT_MOST.0
    }

    /// Is `self` strictly younger than `other`?
    pub fn is_closer_to_leaf(self, other: FramePointer) -> bool
    {
        self.0 < other.0
    }

    /// Is `self` strictly older than `other`?
    pub fn is_closer_to_root(self, other: FramePointer) -> bool
    {
        self.0 > other.0
    }

    /// Is `self` the same frame as `other`, or younger?
    pub fn is_equal_or_closer_to_leaf(self, other: FramePointer) -> bool
    {
        self.0 <= other.0
    }
}

impl From<Address> for FramePointer
{
    fn from(address: Address) -> Self
    {
        FramePointer::from_address(address)
    }
}

impl fmt::Display for FramePointer
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.is_leaf_most() {
            write!(f, "<leaf-most>")
        } else if self.is_root_most() {
            write!(f, "<root-most>")
        } else {
            write!(f, "0x{:016x}", self.0)
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_ordering()
    {
        let young = FramePointer::from_address(Address::new(0x1000));
        let old = FramePointer::from_address(Address::new(0x2000));

        assert!(young.is_closer_to_leaf(old));
        assert!(old.is_closer_to_root(young));
        assert!(young.is_equal_or_closer_to_leaf(young));
        assert!(!old.is_equal_or_closer_to_leaf(young));
    }

    #[test]
    fn test_sentinels_bracket_everything()
    {
        let real = FramePointer::from_address(Address::new(0x7fff_0000));

        assert!(FramePointer::LEAF_MOST.is_closer_to_leaf(real));
        assert!(FramePointer::ROOT_MOST.is_closer_to_root(real));
        assert!(FramePointer::LEAF_MOST.is_closer_to_leaf(FramePointer::ROOT_MOST));
    }

    #[test]
    fn test_display()
    {
        assert_eq!(format!("{}", FramePointer::LEAF_MOST), "<leaf-most>");
        assert_eq!(format!("{}", FramePointer::ROOT_MOST), "<root-most>");
        let real = FramePointer::from_address(Address::new(0xbeef));
        assert_eq!(format!("{real}"), "0x000000000000beef");
    }
}
