//! Memory region information wrapper

use crate::core::types::Protection;
use winapi::um::winnt::MEMORY_BASIC_INFORMATION;

const MEM_COMMIT: u32 = 0x1000;

/// State and protection of one region, from MEMORY_BASIC_INFORMATION
#[derive(Debug, Clone)]
pub struct MemoryBasicInfo {
    pub state: u32,
    pub protect: u32,
}

impl From<MEMORY_BASIC_INFORMATION> for MemoryBasicInfo {
    fn from(mbi: MEMORY_BASIC_INFORMATION) -> Self {
        MemoryBasicInfo {
            state: mbi.State,
            protect: mbi.Protect,
        }
    }
}

impl MemoryBasicInfo {
    /// Check if memory is committed
    pub fn is_committed(&self) -> bool {
        self.state == MEM_COMMIT
    }

    /// Protection of a committed region; free and reserved pages count as unmapped
    pub fn protection(&self) -> Option<Protection> {
        if self.is_committed() {
            Some(Protection::from_win32(self.protect))
        } else {
            None
        }
    }
}
