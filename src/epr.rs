//! Endpoint register values
//!
//! Each endpoint register (`EPnR`) mixes three kinds of bits:
//!
//! - `CTR_RX` and `CTR_TX` are cleared by writing `0`. Writing `1` has no
//!   effect.
//! - `DTOG_RX`, `STAT_RX`, `DTOG_TX` and `STAT_TX` are *toggled* by writing
//!   `1`. Writing `0` has no effect. The hardware advances the data toggles
//!   on every successful transaction.
//! - `EP_TYPE`, `EP_KIND` and `EA` are plain read / write fields.
//!
//! Writing back the value that was just read is therefore wrong: it clears
//! nothing, but it flips every toggle and status bit that happened to be
//! set. Everything in this module is a pure function from the *current*
//! register value to the word that must be written to reach the wanted
//! state in one store. Nothing else in the driver composes register words.

use usb_device::UsbDirection;

bitflags::bitflags! {
    /// An endpoint register value, as read from the hardware.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Epr: u16 {
        /// Correct transfer for reception.
        const CTR_RX = 1 << 15;
        /// Data toggle, for reception transfers.
        const DTOG_RX = 1 << 14;
        /// Status bits, for reception transfers.
        const STAT_RX = 0b11 << 12;
        /// The last OUT transaction was a SETUP.
        const SETUP = 1 << 11;
        /// Endpoint type.
        const EP_TYPE = 0b11 << 9;
        /// Endpoint kind. `STATUS_OUT` for control endpoints.
        const EP_KIND = 1 << 8;
        /// Correct transfer for transmission.
        const CTR_TX = 1 << 7;
        /// Data toggle, for transmission transfers.
        const DTOG_TX = 1 << 6;
        /// Status bits, for transmission transfers.
        const STAT_TX = 0b11 << 4;
        /// Endpoint address.
        const EA = 0b1111;
    }
}

/// Fields that are written as-is.
const READ_WRITE: u16 = Epr::EP_TYPE.bits() | Epr::EP_KIND.bits() | Epr::EA.bits();
/// Fields that are cleared by writing zero.
const CLEAR_ON_ZERO: u16 = Epr::CTR_RX.bits() | Epr::CTR_TX.bits();

const STAT_RX_OFFSET: u16 = 12;
const STAT_TX_OFFSET: u16 = 4;
const EP_TYPE_OFFSET: u16 = 9;

/// Endpoint status for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Status {
    /// All requests are ignored.
    Disabled = 0b00,
    /// The endpoint answers with STALL.
    Stall = 0b01,
    /// The endpoint answers with NAK.
    Nak = 0b10,
    /// The endpoint is ready for one transaction.
    Valid = 0b11,
}

impl Status {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => Status::Disabled,
            0b01 => Status::Stall,
            0b10 => Status::Nak,
            _ => Status::Valid,
        }
    }
}

/// Endpoint transfer type, as encoded in `EP_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EndpointKind {
    Bulk = 0b00,
    Control = 0b01,
    // Isochronous = 0b10,
    // Not supported by this driver
    Interrupt = 0b11,
}

fn stat_field(dir: UsbDirection) -> (u16, u16) {
    match dir {
        UsbDirection::Out => (Epr::STAT_RX.bits(), STAT_RX_OFFSET),
        UsbDirection::In => (Epr::STAT_TX.bits(), STAT_TX_OFFSET),
    }
}

fn ctr_bit(dir: UsbDirection) -> u16 {
    match dir {
        UsbDirection::Out => Epr::CTR_RX.bits(),
        UsbDirection::In => Epr::CTR_TX.bits(),
    }
}

fn dtog_bit(dir: UsbDirection) -> u16 {
    match dir {
        UsbDirection::Out => Epr::DTOG_RX.bits(),
        UsbDirection::In => Epr::DTOG_TX.bits(),
    }
}

impl Epr {
    /// Wraps a raw register value.
    pub const fn from_raw(raw: u16) -> Self {
        Self::from_bits_retain(raw)
    }

    /// Returns the status of one direction.
    pub fn status(self, dir: UsbDirection) -> Status {
        let (mask, offset) = stat_field(dir);
        Status::from_bits((self.bits() & mask) >> offset)
    }

    /// Returns the data toggle of one direction.
    pub fn data_toggle(self, dir: UsbDirection) -> bool {
        self.bits() & dtog_bit(dir) != 0
    }

    /// Indicates if a transaction completed in the given direction.
    pub fn is_complete(self, dir: UsbDirection) -> bool {
        self.bits() & ctr_bit(dir) != 0
    }

    /// Indicates if the last received packet was a SETUP packet.
    pub fn is_setup(self) -> bool {
        self.contains(Epr::SETUP)
    }

    /// Returns the endpoint address field.
    pub fn address(self) -> u8 {
        (self.bits() & Epr::EA.bits()) as u8
    }

    /// Start composing the word that updates this register.
    ///
    /// Without further changes, the word keeps every bit as-is.
    pub fn update(self) -> Update {
        Update {
            current: self,
            value: (self.bits() & READ_WRITE) | CLEAR_ON_ZERO,
        }
    }
}

/// A register write, derived from the current register value.
///
/// Each method changes one field of the *resulting* register value. The
/// toggle fields are computed against the value that was read, so the
/// methods may be chained in any order, and the final [`bits()`](Update::bits)
/// is written in a single store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Update {
    current: Epr,
    value: u16,
}

impl Update {
    /// Set the status of one direction, leaving the other direction alone.
    pub fn status(mut self, dir: UsbDirection, status: Status) -> Self {
        let (mask, offset) = stat_field(dir);
        let wanted = (status as u16) << offset;
        self.value = (self.value & !mask) | ((self.current.bits() ^ wanted) & mask);
        self
    }

    /// Acknowledge a completed transaction in one direction.
    pub fn clear_transfer_complete(mut self, dir: UsbDirection) -> Self {
        self.value &= !ctr_bit(dir);
        self
    }

    /// Return the data toggle of one direction to DATA0.
    pub fn reset_data_toggle(mut self, dir: UsbDirection) -> Self {
        let bit = dtog_bit(dir);
        self.value = (self.value & !bit) | (self.current.bits() & bit);
        self
    }

    /// Set the endpoint transfer type.
    pub fn kind(mut self, kind: EndpointKind) -> Self {
        self.value = (self.value & !Epr::EP_TYPE.bits()) | ((kind as u16) << EP_TYPE_OFFSET);
        self
    }

    /// Set the endpoint address.
    pub fn address(mut self, address: u8) -> Self {
        self.value = (self.value & !Epr::EA.bits()) | (u16::from(address) & Epr::EA.bits());
        self
    }

    /// Set `EP_KIND`. On a control endpoint, this only accepts zero-length
    /// OUT packets (`STATUS_OUT`).
    pub fn ep_kind(mut self, set: bool) -> Self {
        if set {
            self.value |= Epr::EP_KIND.bits();
        } else {
            self.value &= !Epr::EP_KIND.bits();
        }
        self
    }

    /// Returns the word to write.
    pub fn bits(self) -> u16 {
        self.value
    }
}

/// Returns the word that changes only the status of `dir`.
pub fn set_status(current: Epr, dir: UsbDirection, status: Status) -> u16 {
    current.update().status(dir, status).bits()
}

/// Returns the word that only clears the `CTR` bit of `dir`.
pub fn clear_transfer_complete(current: Epr, dir: UsbDirection) -> u16 {
    current.update().clear_transfer_complete(dir).bits()
}

/// Returns the word that acknowledges `dir`, and re-arms it with `status`.
pub fn clear_and_set_status(current: Epr, dir: UsbDirection, status: Status) -> u16 {
    current
        .update()
        .clear_transfer_complete(dir)
        .status(dir, status)
        .bits()
}

/// Returns the word that changes nothing.
pub fn keep_toggle(current: Epr) -> u16 {
    current.update().bits()
}

/// Start a fresh endpoint configuration.
///
/// Sets the transfer type and address, clears `EP_KIND`, and returns both
/// data toggles to DATA0. Chain the statuses before writing.
pub fn configure(current: Epr, kind: EndpointKind, address: u8) -> Update {
    current
        .update()
        .kind(kind)
        .address(address)
        .ep_kind(false)
        .reset_data_toggle(UsbDirection::Out)
        .reset_data_toggle(UsbDirection::In)
}

/// Models the hardware response to writing `written` over `current`.
#[cfg(test)]
pub(crate) fn apply_write(current: u16, written: u16) -> u16 {
    const TOGGLE: u16 = Epr::DTOG_RX.bits()
        | Epr::STAT_RX.bits()
        | Epr::DTOG_TX.bits()
        | Epr::STAT_TX.bits();
    let cleared = current & written & CLEAR_ON_ZERO;
    let toggled = (current ^ written) & TOGGLE;
    let rw = written & READ_WRITE;
    let setup = current & Epr::SETUP.bits();
    cleared | toggled | rw | setup
}
