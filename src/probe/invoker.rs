//! Virtual call invocation
//!
//! Resolves one vtable slot and calls it as a receiver method taking an
//! output buffer, then decodes the buffer as a little-endian `u64`. The
//! callee's return value is reported but carries no meaning here.

use crate::core::types::{Address, ProbeError, ProbeResult, SlotIndex};
use crate::host::{CallShape, MemoryAccess, NativeCaller};
use crate::memory::VTableView;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

/// Bytes the callee writes the identifier into
pub const IDENTIFIER_BUFFER_SIZE: usize = 8;

/// One completed virtual call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualCall {
    pub slot: SlotIndex,
    pub slot_address: Address,
    pub method: Address,
    pub receiver: Address,
    pub return_value: Address,
    /// Output buffer exactly as the callee left it
    #[serde(serialize_with = "serialize_hex")]
    pub output: [u8; IDENTIFIER_BUFFER_SIZE],
    pub identifier: u64,
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

pub struct VirtualCallInvoker<'a, H: MemoryAccess + NativeCaller + ?Sized> {
    host: &'a H,
    shape: CallShape,
}

impl<'a, H: MemoryAccess + NativeCaller + ?Sized> VirtualCallInvoker<'a, H> {
    /// Invoker for `(receiver, out) -> pointer` methods
    pub fn new(host: &'a H) -> Self {
        VirtualCallInvoker {
            host,
            shape: CallShape::receiver_with_out_buffer(),
        }
    }

    pub fn shape(&self) -> &CallShape {
        &self.shape
    }

    /// Call slot `slot` of `vtable` on `receiver`.
    ///
    /// # Safety
    /// The slot must hold a method compiled for the implicit-receiver
    /// `(pointer, pointer) -> pointer` shape that writes at most
    /// [`IDENTIFIER_BUFFER_SIZE`] bytes through its second argument.
    pub unsafe fn invoke_slot(
        &self,
        vtable: &VTableView,
        slot: SlotIndex,
        receiver: Address,
    ) -> ProbeResult<VirtualCall> {
        let slot_address = vtable.slot_address(slot);
        let method = vtable.read_slot(self.host, slot)?;
        debug!("slot {} at {} -> {}", slot, slot_address, method);

        let buffer = self.host.alloc_scratch(IDENTIFIER_BUFFER_SIZE)?;
        if buffer.len() < IDENTIFIER_BUFFER_SIZE {
            return Err(ProbeError::buffer_too_small(
                IDENTIFIER_BUFFER_SIZE,
                buffer.len(),
            ));
        }

        info!("calling {} as {}", method, self.shape);
        let return_value = self.host.invoke(
            method,
            &self.shape,
            &[receiver.as_usize(), buffer.address().as_usize()],
        )?;

        let bytes = match buffer.host_bytes() {
            Some(bytes) => bytes,
            None => self.host.read_bytes(buffer.address(), IDENTIFIER_BUFFER_SIZE)?,
        };
        let output: [u8; IDENTIFIER_BUFFER_SIZE] = bytes
            .get(..IDENTIFIER_BUFFER_SIZE)
            .and_then(|head| head.try_into().ok())
            .ok_or_else(|| ProbeError::buffer_too_small(IDENTIFIER_BUFFER_SIZE, bytes.len()))?;
        let identifier = u64::from_le_bytes(output);

        Ok(VirtualCall {
            slot,
            slot_address,
            method,
            receiver,
            return_value: Address::new(return_value),
            output,
            identifier,
        })
    }
}
