//! A simulated USB FS block, and the host on the other end of the cable
//!
//! The endpoint registers follow the hardware's write semantics, so a
//! driver that clobbers a toggle or misses a clear-on-zero bit fails here
//! the same way it fails on a part. Host transactions follow the
//! peripheral's handshake rules: answer only on the device's address,
//! NAK unless the direction is VALID, return to NAK after every packet.

use crate::{
    buffer::{self, COUNT_RX},
    epr::{self, Epr, Status},
    peripheral::{Istr, UsbPeripheral},
    Driver,
};
use std::vec::Vec;
use usb_device::UsbDirection::{self, In, Out};

const MAX_PMA: usize = 1024;

/// The host's view of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Ack,
    Nak,
    Stall,
    /// Nobody answered.
    Timeout,
}

/// The USB block, in memory.
pub struct Sim {
    eprs: [u16; 8],
    /// Latched interrupt events. `CTR` is derived from the endpoints.
    events: u16,
    enabled: bool,
    function_enabled: bool,
    address: u8,
    suspended: bool,
    pma: [u8; MAX_PMA],
    pma_size: u16,
    /// The address the host talks to.
    pub host_address: u8,
}

impl Sim {
    pub fn new(pma_size: u16) -> Self {
        assert!(usize::from(pma_size) <= MAX_PMA);
        Sim {
            eprs: [0; 8],
            events: 0,
            enabled: false,
            function_enabled: false,
            address: 0,
            suspended: false,
            pma: [0; MAX_PMA],
            pma_size,
            host_address: 0,
        }
    }

    pub fn epr(&self, index: usize) -> Epr {
        Epr::from_raw(self.eprs[index])
    }

    /// Indicates if the driver powered the block.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// The host resets the bus.
    pub fn bus_reset(&mut self) {
        self.eprs = [0; 8];
        self.function_enabled = false;
        self.address = 0;
        self.host_address = 0;
        self.events |= Istr::RESET.bits();
    }

    /// The bus goes idle.
    pub fn bus_idle(&mut self) {
        self.events |= Istr::SUSP.bits();
    }

    /// The host resumes the bus.
    pub fn bus_resume(&mut self) {
        self.events |= Istr::WKUP.bits();
    }

    fn pma_u16(&self, offset: u16) -> u16 {
        let offset = usize::from(offset);
        u16::from_le_bytes([self.pma[offset], self.pma[offset + 1]])
    }

    /// Find the register answering `number` in `dir`.
    fn find(&self, number: u8, dir: UsbDirection) -> Option<usize> {
        if !self.function_enabled || self.address != self.host_address {
            return None;
        }
        (0..8).find(|&index| {
            let epr = self.epr(index);
            epr.address() == number && epr.status(dir) != Status::Disabled
        })
    }

    fn rx_capacity(&self, index: usize) -> usize {
        let field = self.pma_u16(buffer::descriptor(index).count_rx);
        let blocks = usize::from((field & COUNT_RX::NUM_BLOCK::mask) >> COUNT_RX::NUM_BLOCK::offset);
        if field & COUNT_RX::BL_SIZE::mask != 0 {
            (blocks + 1) * 32
        } else {
            blocks * 2
        }
    }

    /// Deliver an OUT or SETUP packet to register `index`.
    fn receive(&mut self, index: usize, data: &[u8], setup: bool) -> Handshake {
        if data.len() > self.rx_capacity(index) {
            return Handshake::Stall;
        }
        let descriptor = buffer::descriptor(index);
        let addr = usize::from(self.pma_u16(descriptor.addr_rx));
        self.pma[addr..addr + data.len()].copy_from_slice(data);

        let count_rx = usize::from(descriptor.count_rx);
        let field = self.pma_u16(descriptor.count_rx) & !COUNT_RX::COUNT::mask;
        let field = field | data.len() as u16;
        self.pma[count_rx..count_rx + 2].copy_from_slice(&field.to_le_bytes());

        let mut epr = self.eprs[index] | Epr::CTR_RX.bits();
        epr = (epr & !Epr::STAT_RX.bits()) | ((Status::Nak as u16) << 12);
        if setup {
            epr |= Epr::SETUP.bits() | Epr::DTOG_RX.bits() | Epr::DTOG_TX.bits();
            epr = (epr & !Epr::STAT_TX.bits()) | ((Status::Nak as u16) << 4);
        } else {
            epr &= !Epr::SETUP.bits();
            epr ^= Epr::DTOG_RX.bits();
        }
        self.eprs[index] = epr;
        Handshake::Ack
    }

    /// The host sends a SETUP packet.
    pub fn host_setup(&mut self, number: u8, packet: &[u8; 8]) -> Handshake {
        // SETUPs are accepted whatever the status, as long as the endpoint
        // is a control endpoint.
        let Some(index) = self.find(number, Out) else {
            return Handshake::Timeout;
        };
        self.receive(index, packet, true)
    }

    /// The host sends an OUT packet.
    pub fn host_out(&mut self, number: u8, data: &[u8]) -> Handshake {
        let Some(index) = self.find(number, Out) else {
            return Handshake::Timeout;
        };
        match self.epr(index).status(Out) {
            Status::Valid => self.receive(index, data, false),
            Status::Nak => Handshake::Nak,
            Status::Stall => Handshake::Stall,
            Status::Disabled => Handshake::Timeout,
        }
    }

    /// The host sends an IN token.
    pub fn host_in(&mut self, number: u8) -> Result<Vec<u8>, Handshake> {
        let Some(index) = self.find(number, In) else {
            return Err(Handshake::Timeout);
        };
        match self.epr(index).status(In) {
            Status::Valid => {}
            Status::Nak => return Err(Handshake::Nak),
            Status::Stall => return Err(Handshake::Stall),
            Status::Disabled => return Err(Handshake::Timeout),
        }
        let descriptor = buffer::descriptor(index);
        let addr = usize::from(self.pma_u16(descriptor.addr_tx));
        let count = usize::from(self.pma_u16(descriptor.count_tx) & 0x3FF);
        let data = self.pma[addr..addr + count].to_vec();

        let mut epr = self.eprs[index] | Epr::CTR_TX.bits();
        epr = (epr & !Epr::STAT_TX.bits()) | ((Status::Nak as u16) << 4);
        epr ^= Epr::DTOG_TX.bits();
        self.eprs[index] = epr;
        Ok(data)
    }
}

impl UsbPeripheral for Sim {
    fn pma_size(&self) -> u16 {
        self.pma_size
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn read_epr(&self, index: usize) -> Epr {
        self.epr(index)
    }

    fn write_epr(&mut self, index: usize, value: u16) {
        self.eprs[index] = epr::apply_write(self.eprs[index], value);
    }

    fn interrupts(&self) -> Istr {
        let mut istr = Istr::from_bits_retain(self.events);
        let pending = (0..8).find(|&index| {
            let epr = self.epr(index);
            epr.is_complete(Out) || epr.is_complete(In)
        });
        if let Some(index) = pending {
            istr |= Istr::CTR | Istr::from_bits_retain(index as u16);
            if self.epr(index).is_complete(Out) {
                istr |= Istr::DIR;
            }
        }
        istr
    }

    fn clear_interrupts(&mut self, events: Istr) {
        self.events &= !(events & Istr::EVENTS).bits();
    }

    fn set_address(&mut self, address: u8) {
        self.function_enabled = true;
        self.address = address;
    }

    fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    fn read_pma_u16(&self, offset: u16) -> u16 {
        assert!(offset % 2 == 0 && offset < self.pma_size);
        self.pma_u16(offset)
    }

    fn write_pma_u16(&mut self, offset: u16, value: u16) {
        assert!(offset % 2 == 0 && offset < self.pma_size);
        let offset = usize::from(offset);
        self.pma[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }
}

/// Anything that owns a [`Sim`], and services it.
pub trait Device {
    fn sim(&mut self) -> &mut Sim;
    fn poll(&mut self);
}

impl<const N: usize, const RX: usize, const TX: usize> Device for Driver<'_, Sim, N, RX, TX> {
    fn sim(&mut self) -> &mut Sim {
        self.usb_mut()
    }
    fn poll(&mut self) {
        Driver::poll(self)
    }
}

/// How many NAKs the host tolerates before giving up on a transaction.
const RETRIES: usize = 8;

fn out_with_retry(device: &mut impl Device, number: u8, data: &[u8]) -> Handshake {
    for _ in 0..RETRIES {
        match device.sim().host_out(number, data) {
            Handshake::Nak => device.poll(),
            handshake => return handshake,
        }
    }
    Handshake::Nak
}

fn in_with_retry(device: &mut impl Device, number: u8) -> Result<Vec<u8>, Handshake> {
    for _ in 0..RETRIES {
        match device.sim().host_in(number) {
            Err(Handshake::Nak) => device.poll(),
            result => return result,
        }
    }
    Err(Handshake::Nak)
}

/// Perform a control read. Returns the data stage.
pub fn control_in(device: &mut impl Device, setup: [u8; 8]) -> Result<Vec<u8>, Handshake> {
    let length = usize::from(u16::from_le_bytes([setup[6], setup[7]]));
    match device.sim().host_setup(0, &setup) {
        Handshake::Ack => device.poll(),
        handshake => return Err(handshake),
    }

    let mut data = Vec::new();
    loop {
        let packet = in_with_retry(device, 0)?;
        device.poll();
        let short = packet.len() < 64;
        data.extend_from_slice(&packet);
        if short || data.len() >= length {
            break;
        }
    }

    match out_with_retry(device, 0, &[]) {
        Handshake::Ack => device.poll(),
        handshake => return Err(handshake),
    }
    Ok(data)
}

/// Perform a control write, with or without a data stage.
pub fn control_out(device: &mut impl Device, setup: [u8; 8], data: &[u8]) -> Result<(), Handshake> {
    match device.sim().host_setup(0, &setup) {
        Handshake::Ack => device.poll(),
        handshake => return Err(handshake),
    }
    for chunk in data.chunks(64) {
        match out_with_retry(device, 0, chunk) {
            Handshake::Ack => device.poll(),
            handshake => return Err(handshake),
        }
    }
    let status = in_with_retry(device, 0)?;
    assert!(status.is_empty(), "Status stage carries no data");
    device.poll();
    Ok(())
}

/// Read everything an IN endpoint has to offer, up to a short packet.
pub fn bulk_in(device: &mut impl Device, number: u8) -> Result<Vec<u8>, Handshake> {
    let mut data = Vec::new();
    loop {
        let packet = device.sim().host_in(number)?;
        device.poll();
        data.extend_from_slice(&packet);
        if packet.len() < 64 {
            return Ok(data);
        }
    }
}

/// Send one OUT packet, then let the device react.
pub fn bulk_out(device: &mut impl Device, number: u8, data: &[u8]) -> Handshake {
    let handshake = device.sim().host_out(number, data);
    device.poll();
    handshake
}

/// Build a SETUP packet.
pub fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let [value_lo, value_hi] = value.to_le_bytes();
    let [index_lo, index_hi] = index.to_le_bytes();
    let [length_lo, length_hi] = length.to_le_bytes();
    [
        request_type,
        request,
        value_lo,
        value_hi,
        index_lo,
        index_hi,
        length_lo,
        length_hi,
    ]
}

/// Enumerate, and configure, a simulated device at `address`.
pub fn enumerate(device: &mut impl Device, address: u8) {
    device.sim().bus_reset();
    device.poll();
    control_out(device, setup(0x00, 5, u16::from(address), 0, 0), &[]).unwrap();
    device.sim().host_address = address;
    control_out(device, setup(0x00, 9, 1, 0, 0), &[]).unwrap();
}

/// Open channel `channel` by raising DTR.
pub fn open(device: &mut impl Device, channel: u16) {
    control_out(device, setup(0x21, 0x22, 0x0003, 2 * channel, 0), &[]).unwrap();
}

#[cfg(test)]
mod tests {
    use super::{Handshake, Sim};
    use crate::{epr::Status, UsbPeripheral};

    #[test]
    fn unaddressed_device_ignores_host() {
        let mut sim = Sim::new(512);
        sim.enable();
        assert_eq!(sim.host_out(0, &[]), Handshake::Timeout);
        sim.set_address(0);
        // Endpoint 0 isn't open.
        assert_eq!(sim.host_out(0, &[]), Handshake::Timeout);
    }

    #[test]
    fn bus_reset_clears_endpoints() {
        let mut sim = Sim::new(512);
        sim.write_epr(1, 0x3031);
        assert_eq!(sim.epr(1).status(usb_device::UsbDirection::Out), Status::Valid);
        sim.bus_reset();
        assert_eq!(sim.epr(1).bits(), 0);
        assert!(sim.interrupts().contains(crate::peripheral::Istr::RESET));
    }
}
