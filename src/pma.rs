//! Packet memory access
//!
//! The CPU sees the packet memory as halfwords. On parts with the `1x16`
//! access scheme (F1, F3), each halfword sits in the low half of its own
//! 32-bit word, so CPU addresses advance twice as fast as packet memory
//! offsets. With `ram-access-2x16` (F0, L0, G4) the memory is contiguous.

/// Default packet memory size, in bytes.
#[cfg(not(feature = "ram-access-2x16"))]
pub const DEFAULT_SIZE: u16 = 512;
/// Default packet memory size, in bytes.
#[cfg(feature = "ram-access-2x16")]
pub const DEFAULT_SIZE: u16 = 1024;

/// CPU address stride for one packet memory byte.
#[cfg(not(feature = "ram-access-2x16"))]
const STRIDE: usize = 2;
#[cfg(feature = "ram-access-2x16")]
const STRIDE: usize = 1;

/// The packet memory area
pub struct PacketMemory {
    base: *mut u16,
    size: u16,
}

impl PacketMemory {
    /// # Safety
    ///
    /// `base` must point at packet memory of at least `size` bytes (as the
    /// peripheral addresses it), suitably aligned, and nothing else may
    /// own it.
    pub const unsafe fn new(base: *const (), size: u16) -> Self {
        PacketMemory {
            base: base as *mut u16,
            size,
        }
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    fn halfword(&self, offset: u16) -> *mut u16 {
        debug_assert!(offset % 2 == 0 && offset < self.size);
        // Safety: offset is in bounds, per the constructor's contract.
        unsafe { self.base.cast::<u8>().add(usize::from(offset) * STRIDE).cast() }
    }

    pub fn read(&self, offset: u16) -> u16 {
        // Safety: see halfword()
        unsafe { self.halfword(offset).read_volatile() }
    }

    pub fn write(&mut self, offset: u16, value: u16) {
        // Safety: see halfword()
        unsafe { self.halfword(offset).write_volatile(value) }
    }
}

// Safety: the packet memory is only accessed through &mut self, or &self
// for reads.
unsafe impl Send for PacketMemory {}
