//! Scratch buffers handed to native calls as output parameters

use crate::core::types::Address;

/// A small writable buffer reachable by the callee.
///
/// Host-owned buffers live in this process and are freed on drop; external
/// buffers describe memory the host allocated elsewhere and only carry its
/// address.
#[derive(Debug)]
pub struct ScratchBuffer {
    address: Address,
    len: usize,
    backing: Option<*mut [u64]>,
}

impl ScratchBuffer {
    /// Zeroed, 8-byte aligned buffer in the current process
    pub fn host_owned(len: usize) -> Self {
        let words = len.div_ceil(8).max(1);
        // Leaked into a raw pointer so foreign writes never alias a live Box
        let backing = Box::into_raw(vec![0u64; words].into_boxed_slice());
        let address = Address::from(backing as *mut u64);
        ScratchBuffer {
            address,
            len,
            backing: Some(backing),
        }
    }

    /// Buffer allocated by the host at `address`
    pub fn external(address: Address, len: usize) -> Self {
        ScratchBuffer {
            address,
            len,
            backing: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current contents of a host-owned buffer
    pub fn host_bytes(&self) -> Option<Vec<u8>> {
        self.backing.map(|words| {
            // SAFETY: `words` came from Box::into_raw and is freed only in Drop
            let words = unsafe { &*words };
            words
                .iter()
                .flat_map(|word| word.to_ne_bytes())
                .take(self.len)
                .collect()
        })
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        if let Some(words) = self.backing.take() {
            // SAFETY: produced by Box::into_raw in host_owned and dropped once
            unsafe { drop(Box::from_raw(words)) };
        }
    }
}
