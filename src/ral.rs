//! USB FS device register definitions
//!
//! The module implements a RAL-compatible interface for the USB
//! registers, so the `ral-registers` macros can access them. Endpoint
//! registers are exposed as an array; their fields live in
//! [`Epr`](crate::epr::Epr).

#![allow(non_snake_case, non_upper_case_globals)]

pub use ral_registers::{modify_reg, read_reg, write_reg, RORegister, RWRegister};

use core::ops::Deref;

#[repr(C)]
pub struct RegisterBlock {
    /// Endpoint registers, `EP0R` through `EP7R`.
    pub EPR: [RWRegister<u32>; 8],
    _reserved: [u32; 8],
    pub CNTR: RWRegister<u32>,
    pub ISTR: RWRegister<u32>,
    pub FNR: RORegister<u32>,
    pub DADDR: RWRegister<u32>,
    pub BTABLE: RWRegister<u32>,
}

/// A USB register block
pub struct Instance {
    addr: *const RegisterBlock,
}

impl Instance {
    /// # Safety
    ///
    /// `addr` must point at a USB FS register block, and nothing else may
    /// own it.
    pub const unsafe fn new(addr: *const ()) -> Self {
        Instance { addr: addr.cast() }
    }
}

impl Deref for Instance {
    type Target = RegisterBlock;
    fn deref(&self) -> &RegisterBlock {
        // Safety: see new()
        unsafe { &*self.addr }
    }
}

// Safety: the instance is the only owner of the registers.
unsafe impl Send for Instance {}

pub mod CNTR {
    pub mod CTRM {
        pub const offset: u32 = 15;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    pub mod WKUPM {
        pub const offset: u32 = 12;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    pub mod SUSPM {
        pub const offset: u32 = 11;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    pub mod RESETM {
        pub const offset: u32 = 10;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    pub mod FSUSP {
        pub const offset: u32 = 3;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    pub mod PDWN {
        pub const offset: u32 = 1;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    pub mod FRES {
        pub const offset: u32 = 0;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
}

pub mod FNR {
    pub mod FN {
        pub const offset: u32 = 0;
        pub const mask: u32 = 0x7FF << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
}

pub mod DADDR {
    pub mod EF {
        pub const offset: u32 = 7;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    pub mod ADD {
        pub const offset: u32 = 0;
        pub const mask: u32 = 0x7F << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
}

pub mod BTABLE {
    pub mod BTABLE {
        pub const offset: u32 = 3;
        pub const mask: u32 = 0x1FFF << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
}

#[cfg(test)]
mod tests {
    use super::RegisterBlock;

    #[test]
    fn register_offsets() {
        let block = core::mem::MaybeUninit::<RegisterBlock>::uninit();
        let base = block.as_ptr();
        let offset = |field: *const ()| field as usize - base as usize;
        // Safety: computing field addresses, never reading.
        unsafe {
            assert_eq!(offset(core::ptr::addr_of!((*base).EPR[7]).cast()), 0x1C);
            assert_eq!(offset(core::ptr::addr_of!((*base).CNTR).cast()), 0x40);
            assert_eq!(offset(core::ptr::addr_of!((*base).ISTR).cast()), 0x44);
            assert_eq!(offset(core::ptr::addr_of!((*base).FNR).cast()), 0x48);
            assert_eq!(offset(core::ptr::addr_of!((*base).DADDR).cast()), 0x4C);
            assert_eq!(offset(core::ptr::addr_of!((*base).BTABLE).cast()), 0x50);
        }
    }
}
