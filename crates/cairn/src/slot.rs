//! Pointer slots: fixed buffers that carry a native pointer through the
//! value world.
//!
//! A pointer slot is an ordinary fixed buffer exactly one pointer wide. The
//! host writes a pointer's bytes into it, plants it somewhere reachable
//! (usually a hidden property), and later coerces it back to bytes and
//! reinterprets them. The engine checks the width on the way out, never the
//! provenance: a slot holds whatever bytes were put into it, and any value
//! that coerces to a buffer of the right width reads back as a pointer.
//! Dereferencing what comes out is entirely the caller's contract.

use crate::{context::Context, error::EngineError, tracer::EngineTracer, value::RawPtr};

/// Byte width of a pointer slot on this target.
pub const PTR_SLOT_WIDTH: usize = std::mem::size_of::<*mut ()>();

/// Writable view of a freshly pushed pointer slot.
#[derive(Debug)]
pub struct PtrSlot<'a> {
    bytes: &'a mut [u8; PTR_SLOT_WIDTH],
}

impl PtrSlot<'_> {
    /// Writes `ptr` into the slot in native byte order.
    pub fn store(&mut self, ptr: RawPtr) {
        *self.bytes = ptr.addr().to_ne_bytes();
    }

    /// Reads the slot's current bytes back as a pointer.
    #[must_use]
    pub fn load(&self) -> RawPtr {
        RawPtr::new(usize::from_ne_bytes(*self.bytes) as *mut ())
    }
}

/// Pushes a zeroed pointer-wide fixed buffer and returns a view for writing
/// the pointer. A slot left unwritten reads back as the null pointer.
pub fn push_ptr_slot<Tr: EngineTracer>(ctx: &mut Context<Tr>) -> Result<PtrSlot<'_>, EngineError> {
    let bytes = ctx.push_fixed_buffer(PTR_SLOT_WIDTH)?;
    let bytes: &mut [u8; PTR_SLOT_WIDTH] =
        bytes.try_into().expect("fixed buffer has the requested width");
    Ok(PtrSlot { bytes })
}

/// Coerces the value at `idx` to buffer bytes in place and reads them back
/// as a pointer.
///
/// The byte length must be exactly [`PTR_SLOT_WIDTH`]; any other width
/// fails with [`EngineError::SlotWidth`] rather than producing a truncated
/// or zero-padded pointer.
pub fn read_ptr_slot<Tr: EngineTracer>(
    ctx: &mut Context<Tr>,
    idx: i32,
) -> Result<RawPtr, EngineError> {
    let bytes = ctx.to_buffer(idx)?;
    let width = bytes.len();
    let Ok(arr) = <[u8; PTR_SLOT_WIDTH]>::try_from(bytes) else {
        return Err(EngineError::SlotWidth {
            expected: PTR_SLOT_WIDTH,
            found: width,
        });
    };
    Ok(RawPtr::new(usize::from_ne_bytes(arr) as *mut ()))
}
