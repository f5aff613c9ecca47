//! The STM32 USB FS device block

use crate::{
    epr::Epr,
    peripheral::{Istr, UsbPeripheral},
    pma::{self, PacketMemory},
    ral, Peripherals,
};

/// Cycles to wait for the transceiver to start. The datasheets ask for at
/// most 1 us; this covers cores up to 480 MHz.
const STARTUP_DELAY_CYCLES: u32 = 480;

/// A [`UsbPeripheral`] backed by the USB FS registers and packet memory.
pub struct Stm32Usb {
    usb: ral::Instance,
    pma: PacketMemory,
}

impl Stm32Usb {
    /// Take ownership of the USB registers and packet memory.
    ///
    /// Assumes that the USB clock runs at 48 MHz, and that the data pins
    /// are configured. The packet memory size defaults to 512 bytes, or
    /// 1024 bytes with the `ram-access-2x16` feature; see
    /// [`with_pma_size()`](Self::with_pma_size).
    pub fn new<P: Peripherals>(peripherals: P) -> Self {
        Self::with_pma_size(peripherals, pma::DEFAULT_SIZE)
    }

    /// Like [`new()`](Self::new), for a part with `pma_size` bytes of
    /// packet memory, as the peripheral addresses it.
    pub fn with_pma_size<P: Peripherals>(peripherals: P, pma_size: u16) -> Self {
        // Safety: the Peripherals implementation guarantees exclusive
        // ownership of both regions.
        unsafe {
            Stm32Usb {
                usb: ral::Instance::new(peripherals.usb()),
                pma: PacketMemory::new(peripherals.pma(), pma_size),
            }
        }
    }

    /// The current frame number.
    pub fn frame_number(&self) -> u16 {
        ral::read_reg!(ral, self.usb, FNR, FN) as u16
    }
}

impl UsbPeripheral for Stm32Usb {
    fn pma_size(&self) -> u16 {
        self.pma.size()
    }

    fn enable(&mut self) {
        // Power up, and hold the function in reset while the analog
        // transceiver starts.
        ral::write_reg!(ral, self.usb, CNTR, FRES: 1, PDWN: 0);
        cortex_m::asm::delay(STARTUP_DELAY_CYCLES);
        ral::write_reg!(ral, self.usb, CNTR, 0);
        ral::write_reg!(ral, self.usb, ISTR, 0);
        ral::write_reg!(ral, self.usb, BTABLE, BTABLE: 0);
        ral::write_reg!(ral, self.usb, CNTR, CTRM: 1, WKUPM: 1, SUSPM: 1, RESETM: 1);
        debug!("ENABLED");
    }

    fn read_epr(&self, index: usize) -> Epr {
        Epr::from_raw(self.usb.EPR[index].read() as u16)
    }

    fn write_epr(&mut self, index: usize, value: u16) {
        self.usb.EPR[index].write(u32::from(value));
    }

    fn interrupts(&self) -> Istr {
        Istr::from_bits_retain(ral::read_reg!(ral, self.usb, ISTR) as u16)
    }

    fn clear_interrupts(&mut self, events: Istr) {
        // Writing one leaves a flag alone. A read-modify-write would race
        // with the hardware setting new flags.
        let keep = !(events & Istr::EVENTS).bits();
        ral::write_reg!(ral, self.usb, ISTR, u32::from(keep));
    }

    fn set_address(&mut self, address: u8) {
        ral::write_reg!(ral, self.usb, DADDR, EF: 1, ADD: u32::from(address));
    }

    fn set_suspended(&mut self, suspended: bool) {
        if suspended {
            ral::modify_reg!(ral, self.usb, CNTR, FSUSP: 1);
        } else {
            ral::modify_reg!(ral, self.usb, CNTR, FSUSP: 0);
        }
    }

    fn read_pma_u16(&self, offset: u16) -> u16 {
        self.pma.read(offset)
    }

    fn write_pma_u16(&mut self, offset: u16, value: u16) {
        self.pma.write(offset, value)
    }
}
