//! Page protection state reported for mapped-but-unowned addresses

use serde::{Deserialize, Serialize};
use std::fmt;

/// Read/write/execute state of a mapped page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Protection {
    // Win32 page protection constants
    pub const PAGE_NOACCESS: u32 = 0x01;
    pub const PAGE_READONLY: u32 = 0x02;
    pub const PAGE_READWRITE: u32 = 0x04;
    pub const PAGE_WRITECOPY: u32 = 0x08;
    pub const PAGE_EXECUTE: u32 = 0x10;
    pub const PAGE_EXECUTE_READ: u32 = 0x20;
    pub const PAGE_EXECUTE_READWRITE: u32 = 0x40;
    pub const PAGE_EXECUTE_WRITECOPY: u32 = 0x80;
    pub const PAGE_GUARD: u32 = 0x100;

    pub const NONE: Protection = Protection::new(false, false, false);
    pub const READ: Protection = Protection::new(true, false, false);
    pub const READ_WRITE: Protection = Protection::new(true, true, false);
    pub const READ_EXECUTE: Protection = Protection::new(true, false, true);
    pub const READ_WRITE_EXECUTE: Protection = Protection::new(true, true, true);

    pub const fn new(read: bool, write: bool, execute: bool) -> Self {
        Protection {
            read,
            write,
            execute,
        }
    }

    /// Decode a Win32 `PAGE_*` value. Guard pages are reported as inaccessible.
    pub fn from_win32(value: u32) -> Self {
        if value & Self::PAGE_GUARD != 0 {
            return Self::NONE;
        }

        match value & 0xFF {
            Self::PAGE_READONLY => Self::READ,
            Self::PAGE_READWRITE | Self::PAGE_WRITECOPY => Self::READ_WRITE,
            Self::PAGE_EXECUTE => Protection::new(false, false, true),
            Self::PAGE_EXECUTE_READ => Self::READ_EXECUTE,
            Self::PAGE_EXECUTE_READWRITE | Self::PAGE_EXECUTE_WRITECOPY => {
                Self::READ_WRITE_EXECUTE
            }
            _ => Self::NONE,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.read
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Protection::READ_EXECUTE.to_string(), "r-x");
        assert_eq!(Protection::READ_WRITE.to_string(), "rw-");
        assert_eq!(Protection::NONE.to_string(), "---");
        assert_eq!(Protection::READ_WRITE_EXECUTE.to_string(), "rwx");
    }

    #[test]
    fn test_from_win32() {
        assert_eq!(Protection::from_win32(0x02), Protection::READ);
        assert_eq!(Protection::from_win32(0x04), Protection::READ_WRITE);
        assert_eq!(Protection::from_win32(0x08), Protection::READ_WRITE);
        assert_eq!(Protection::from_win32(0x20), Protection::READ_EXECUTE);
        assert_eq!(Protection::from_win32(0x40), Protection::READ_WRITE_EXECUTE);
        assert_eq!(Protection::from_win32(0x01), Protection::NONE);
        assert_eq!(Protection::from_win32(0x10).to_string(), "--x");
    }

    #[test]
    fn test_guard_pages_are_inaccessible() {
        // PAGE_READWRITE | PAGE_GUARD
        let prot = Protection::from_win32(0x104);
        assert!(!prot.is_readable());
        assert_eq!(prot, Protection::NONE);
    }
}
