//! Address wrapper for locations in the target address space

use serde::{Deserialize, Serialize};
use std::fmt;

/// A location in the target process. Not validated on construction;
/// reads against a bad address fail at the memory layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub usize);

impl Address {
    /// Creates a new address from a usize value
    pub const fn new(value: usize) -> Self {
        Address(value)
    }

    /// Creates a null address (0x0)
    pub const fn null() -> Self {
        Address(0)
    }

    /// Checks if the address is null
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the address is aligned to the specified boundary
    pub const fn is_aligned(&self, alignment: usize) -> bool {
        alignment != 0 && self.0 % alignment == 0
    }

    /// Adds an unsigned byte offset, wrapping like pointer arithmetic in the target
    pub const fn add(&self, offset: usize) -> Self {
        Address(self.0.wrapping_add(offset))
    }

    /// Subtracts an unsigned byte offset
    pub const fn sub(&self, offset: usize) -> Self {
        Address(self.0.wrapping_sub(offset))
    }

    /// Adds an offset, returning `None` if the result leaves the address space
    pub const fn checked_add(&self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(value) => Some(Address(value)),
            None => None,
        }
    }

    /// Adds a signed offset to the address
    pub const fn offset(&self, offset: isize) -> Self {
        Address(self.0.wrapping_add_signed(offset))
    }

    /// Distance from `base` to this address, if this address is not below it
    pub const fn offset_from(&self, base: Address) -> Option<usize> {
        self.0.checked_sub(base.0)
    }

    /// Returns the raw usize value
    pub const fn as_usize(&self) -> usize {
        self.0
    }

    /// Returns the address as a pointer
    pub const fn as_ptr<T>(&self) -> *const T {
        self.0 as *const T
    }

    /// Returns the address as a mutable pointer
    pub const fn as_mut_ptr<T>(&self) -> *mut T {
        self.0 as *mut T
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Address::new(value)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value as usize)
    }
}

impl<T> From<*const T> for Address {
    fn from(ptr: *const T) -> Self {
        Address::new(ptr as usize)
    }
}

impl<T> From<*mut T> for Address {
    fn from(ptr: *mut T) -> Self {
        Address::new(ptr as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_arithmetic() {
        let base = Address::new(0x1000_0000);
        assert_eq!(base.add(0x3f7758), Address::new(0x103f_7758));
        assert_eq!(base.add(0x10).sub(0x10), base);
        assert_eq!(base.offset(-0x10), Address::new(0x0FFF_FFF0));
        assert_eq!(Address::new(usize::MAX).checked_add(1), None);
    }

    #[test]
    fn test_offset_from() {
        let base = Address::new(0x2000);
        assert_eq!(Address::new(0x2010).offset_from(base), Some(0x10));
        assert_eq!(Address::new(0x1000).offset_from(base), None);
    }

    #[test]
    fn test_address_alignment() {
        assert!(Address::new(0x1008).is_aligned(8));
        assert!(!Address::new(0x1005).is_aligned(4));
        assert!(!Address::new(0x1000).is_aligned(0));
    }

    #[test]
    fn test_address_display() {
        let addr = Address::new(0xDEADBEEF);
        assert_eq!(format!("{}", addr), "0xDEADBEEF");
        assert_eq!(format!("{:x}", addr), "0xdeadbeef");
        assert_eq!(format!("{:X}", addr), "0xDEADBEEF");
    }

    #[test]
    fn test_pointer_conversion() {
        let value = 7u64;
        let addr = Address::from(&value as *const u64);
        assert_eq!(addr.as_ptr::<u64>(), &value as *const u64);
        assert!(!addr.is_null());
        assert!(Address::null().is_null());
    }
}
