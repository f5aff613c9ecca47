//! The hardware seam
//!
//! The driver never touches registers directly. It talks to a
//! [`UsbPeripheral`], which is either the real USB FS block
//! ([`Stm32Usb`](crate::Stm32Usb)), or a simulation in tests.

use crate::epr::Epr;

bitflags::bitflags! {
    /// Interrupt status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Istr: u16 {
        /// An endpoint completed a transaction.
        const CTR = 1 << 15;
        /// Packet memory overrun.
        const PMAOVR = 1 << 14;
        /// Bus error.
        const ERR = 1 << 13;
        /// Wakeup signalling while suspended.
        const WKUP = 1 << 12;
        /// The bus has been idle for 3 ms.
        const SUSP = 1 << 11;
        /// The host reset the bus.
        const RESET = 1 << 10;
        const SOF = 1 << 9;
        const ESOF = 1 << 8;
        /// Direction of the pending transaction. Set for OUT or SETUP.
        const DIR = 1 << 4;
        /// Endpoint register with a pending transaction.
        const EP_ID = 0xF;
    }
}

#[cfg(feature = "defmt-03")]
impl defmt::Format for Istr {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ISTR({=u16:#06x})", self.bits())
    }
}

impl Istr {
    /// Flags that are cleared by writing zero. `DIR` and `EP_ID` are read
    /// only.
    pub const EVENTS: Istr = Istr::CTR
        .union(Istr::PMAOVR)
        .union(Istr::ERR)
        .union(Istr::WKUP)
        .union(Istr::SUSP)
        .union(Istr::RESET)
        .union(Istr::SOF)
        .union(Istr::ESOF);

    /// The endpoint register index with a pending transaction.
    pub fn endpoint(self) -> usize {
        usize::from(self.bits() & Istr::EP_ID.bits())
    }
}

/// Register and packet memory access for a USB FS device block.
///
/// Implementations are plain accessors. They don't interpret endpoint
/// register semantics; values passed to [`write_epr()`](Self::write_epr)
/// come from [`epr`](crate::epr), already composed for the toggle and
/// clear-on-zero bits.
pub trait UsbPeripheral {
    /// Size of the packet memory, in bytes, as the peripheral addresses it.
    fn pma_size(&self) -> u16;

    /// Power the transceiver, and enable the interrupts the driver handles.
    ///
    /// Afterwards, the block waits for a bus reset.
    fn enable(&mut self);

    /// Read endpoint register `index`.
    fn read_epr(&self, index: usize) -> Epr;
    /// Write endpoint register `index`.
    fn write_epr(&mut self, index: usize, value: u16);

    /// Read the interrupt status.
    fn interrupts(&self) -> Istr;
    /// Acknowledge the given events, leaving the others pending.
    fn clear_interrupts(&mut self, events: Istr);

    /// Enable the function, and answer on `address`.
    fn set_address(&mut self, address: u8);

    /// Enter, or leave, the suspend state.
    fn set_suspended(&mut self, suspended: bool);

    /// Read one halfword of packet memory. `offset` is even.
    fn read_pma_u16(&self, offset: u16) -> u16;
    /// Write one halfword of packet memory. `offset` is even.
    fn write_pma_u16(&mut self, offset: u16, value: u16);

    /// Copy `buf.len()` bytes out of packet memory, starting at the even
    /// `offset`.
    fn read_pma(&self, offset: u16, buf: &mut [u8]) {
        let mut chunks = buf.chunks_exact_mut(2);
        let mut position = offset;
        for pair in &mut chunks {
            pair.copy_from_slice(&self.read_pma_u16(position).to_le_bytes());
            position += 2;
        }
        if let [last] = chunks.into_remainder() {
            *last = self.read_pma_u16(position).to_le_bytes()[0];
        }
    }

    /// Copy `bytes` into packet memory, starting at the even `offset`.
    ///
    /// An odd trailing byte is padded to a halfword with zero.
    fn write_pma(&mut self, offset: u16, bytes: &[u8]) {
        let mut chunks = bytes.chunks_exact(2);
        let mut position = offset;
        for pair in &mut chunks {
            self.write_pma_u16(position, u16::from_le_bytes([pair[0], pair[1]]));
            position += 2;
        }
        if let [last] = chunks.remainder() {
            self.write_pma_u16(position, u16::from(*last));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Istr, UsbPeripheral};
    use crate::epr::Epr;

    /// Just packet memory.
    struct Halfwords([u16; 8]);

    impl UsbPeripheral for Halfwords {
        fn pma_size(&self) -> u16 {
            16
        }
        fn enable(&mut self) {}
        fn read_epr(&self, _: usize) -> Epr {
            Epr::empty()
        }
        fn write_epr(&mut self, _: usize, _: u16) {}
        fn interrupts(&self) -> Istr {
            Istr::empty()
        }
        fn clear_interrupts(&mut self, _: Istr) {}
        fn set_address(&mut self, _: u8) {}
        fn set_suspended(&mut self, _: bool) {}
        fn read_pma_u16(&self, offset: u16) -> u16 {
            self.0[usize::from(offset / 2)]
        }
        fn write_pma_u16(&mut self, offset: u16, value: u16) {
            self.0[usize::from(offset / 2)] = value;
        }
    }

    #[test]
    fn byte_copies_are_little_endian_halfwords() {
        let mut pma = Halfwords([0; 8]);
        pma.write_pma(2, b"hello");
        assert_eq!(pma.0[1], u16::from_le_bytes(*b"he"));
        assert_eq!(pma.0[3], u16::from(b'o'));

        let mut buf = [0; 5];
        pma.read_pma(2, &mut buf);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn endpoint_id() {
        let istr = Istr::from_bits_retain(0x8013);
        assert!(istr.contains(Istr::CTR | Istr::DIR));
        assert_eq!(istr.endpoint(), 3);
        assert_eq!(istr & Istr::EVENTS, Istr::CTR);
    }
}
