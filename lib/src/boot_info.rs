//! Raw Limine memory-map response shapes.
//!
//! `chronos-mm` needs to walk the bootloader's memory map during early
//! init, but the boot process itself (protocol handshake, GDT/IDT,
//! the trampoline) is an external collaborator per `spec.md` §1 — this
//! crate only needs the wire shape of one response, not a dependency on
//! the `limine` crate's typed request/response API. These two structs
//! mirror the Limine memmap response layout byte-for-byte (revision,
//! entry count, pointer-to-pointer entry array), so a `*const
//! LimineMemmapResponse` obtained from a real `limine::response::
//! MemoryMapResponse` reference can be reinterpreted as one directly.

#[derive(Clone, Copy)]
#[repr(C)]
pub struct LimineMemmapEntry {
    pub base: u64,
    pub length: u64,
    pub typ: u64,
}

#[repr(C)]
pub struct LimineMemmapResponse {
    pub revision: u64,
    pub entry_count: u64,
    pub entries: *const *const LimineMemmapEntry,
}
