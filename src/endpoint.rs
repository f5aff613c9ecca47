//! Endpoints, and the table that owns them
//!
//! An endpoint ties an endpoint register to packet memory buffers. The
//! table creates endpoint 0 on every bus reset, and the data endpoints when
//! the host selects the configuration.

use crate::{
    buffer::{self, Allocator, Buffer, ENDPOINT_COUNT},
    epr::{self, EndpointKind, Status},
    peripheral::UsbPeripheral,
    Error,
};
use usb_device::UsbDirection;

/// Change the status of one direction.
pub fn set_status<P: UsbPeripheral>(usb: &mut P, index: usize, dir: UsbDirection, status: Status) {
    let current = usb.read_epr(index);
    usb.write_epr(index, epr::set_status(current, dir, status));
}

/// Acknowledge a transaction, and set the direction's next status.
pub fn clear_and_set_status<P: UsbPeripheral>(
    usb: &mut P,
    index: usize,
    dir: UsbDirection,
    status: Status,
) {
    let current = usb.read_epr(index);
    usb.write_epr(index, epr::clear_and_set_status(current, dir, status));
}

/// Acknowledge a transaction, leaving the status alone.
pub fn clear_transfer_complete<P: UsbPeripheral>(usb: &mut P, index: usize, dir: UsbDirection) {
    let current = usb.read_epr(index);
    usb.write_epr(index, epr::clear_transfer_complete(current, dir));
}

/// An active endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    number: u8,
    tx: Option<Buffer>,
    rx: Option<Buffer>,
}

impl Endpoint {
    pub fn number(&self) -> u8 {
        self.number
    }

    fn index(&self) -> usize {
        usize::from(self.number)
    }

    /// Largest packet the endpoint can send.
    pub fn tx_capacity(&self) -> u16 {
        self.tx.map_or(0, |buffer| buffer.capacity())
    }

    /// Copy `bytes` into the transmit buffer, and arm the IN direction.
    ///
    /// Returns [`Error::BufferOverflow`] if the packet doesn't fit, or if
    /// there's no transmit buffer.
    pub fn transmit<P: UsbPeripheral>(&self, usb: &mut P, bytes: &[u8]) -> Result<(), Error> {
        let tx = self.tx.ok_or(Error::BufferOverflow)?;
        if bytes.len() > usize::from(tx.capacity()) {
            return Err(Error::BufferOverflow);
        }
        usb.write_pma(tx.offset(), bytes);
        usb.write_pma_u16(buffer::descriptor(self.index()).count_tx, bytes.len() as u16);
        set_status(usb, self.index(), UsbDirection::In, Status::Valid);
        Ok(())
    }

    /// Size of the last packet received.
    pub fn received<P: UsbPeripheral>(&self, usb: &P) -> u16 {
        let field = usb.read_pma_u16(buffer::descriptor(self.index()).count_rx);
        buffer::rx_count(field).min(self.rx.map_or(0, |buffer| buffer.capacity()))
    }

    /// Copy the last received packet into `buf`.
    ///
    /// Returns the number of bytes copied, which is less than the packet
    /// size if `buf` is too small.
    pub fn read<P: UsbPeripheral>(&self, usb: &P, buf: &mut [u8]) -> usize {
        let Some(rx) = self.rx else {
            return 0;
        };
        let count = usize::from(self.received(usb)).min(buf.len());
        usb.read_pma(rx.offset(), &mut buf[..count]);
        count
    }
}

/// Buffer sizes for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizes {
    pub tx: Option<u16>,
    pub rx: Option<u16>,
}

/// Owns every endpoint, and the packet memory allocator.
pub struct EndpointTable {
    allocator: Allocator,
    endpoints: [Option<Endpoint>; ENDPOINT_COUNT],
    /// Allocator position after endpoint 0.
    data_start: u16,
}

impl EndpointTable {
    pub const fn new(pma_size: u16) -> Self {
        EndpointTable {
            allocator: Allocator::new(pma_size),
            endpoints: [None; ENDPOINT_COUNT],
            data_start: buffer::BTABLE_SIZE,
        }
    }

    /// Forget every endpoint, and release all packet memory.
    ///
    /// Doesn't touch the hardware. After a bus reset, the endpoint
    /// registers are already cleared.
    pub fn reset(&mut self) {
        self.endpoints = [None; ENDPOINT_COUNT];
        self.allocator.reset();
        self.data_start = buffer::BTABLE_SIZE;
    }

    pub fn get(&self, number: u8) -> Option<&Endpoint> {
        self.endpoints.get(usize::from(number))?.as_ref()
    }

    /// Create the control endpoint.
    ///
    /// Call after [`reset()`](Self::reset). The endpoint is left ready for
    /// a SETUP packet.
    pub fn open_control<P: UsbPeripheral>(&mut self, usb: &mut P, max_packet_size: u16) -> Result<(), Error> {
        let sizes = Sizes {
            tx: Some(max_packet_size),
            rx: Some(max_packet_size),
        };
        self.open(usb, 0, EndpointKind::Control, sizes)?;
        self.data_start = self.allocator.checkpoint();
        Ok(())
    }

    /// Create endpoint `number`, and activate it.
    ///
    /// The OUT direction is armed, and the IN direction NAKs until there's
    /// something to send. If there isn't enough packet memory, the
    /// endpoint is disabled, and nothing is allocated.
    pub fn open<P: UsbPeripheral>(
        &mut self,
        usb: &mut P,
        number: u8,
        kind: EndpointKind,
        sizes: Sizes,
    ) -> Result<(), Error> {
        let index = usize::from(number);
        if index >= ENDPOINT_COUNT {
            return Err(Error::EndpointOverflow);
        }

        let checkpoint = self.allocator.checkpoint();
        let tx = sizes.tx.map(|size| self.allocator.allocate(UsbDirection::In, size));
        let rx = sizes.rx.map(|size| self.allocator.allocate(UsbDirection::Out, size));
        let (tx, rx) = match (tx, rx) {
            (Some(None), _) | (_, Some(None)) => {
                warn!("EP{} OUT OF PACKET MEMORY", number);
                self.allocator.rewind(checkpoint);
                self.endpoints[index] = None;
                Self::disable(usb, index);
                return Err(Error::EndpointMemoryOverflow);
            }
            (tx, rx) => (tx.flatten(), rx.flatten()),
        };

        let descriptor = buffer::descriptor(index);
        if let Some(tx) = tx {
            usb.write_pma_u16(descriptor.addr_tx, tx.offset());
            usb.write_pma_u16(descriptor.count_tx, 0);
        }
        if let Some(rx) = rx {
            usb.write_pma_u16(descriptor.addr_rx, rx.offset());
            usb.write_pma_u16(descriptor.count_rx, buffer::rx_count_field(rx.capacity()));
        }

        let rx_status = if rx.is_some() { Status::Valid } else { Status::Disabled };
        let tx_status = if tx.is_some() { Status::Nak } else { Status::Disabled };
        let current = usb.read_epr(index);
        let value = epr::configure(current, kind, number)
            .clear_transfer_complete(UsbDirection::Out)
            .clear_transfer_complete(UsbDirection::In)
            .status(UsbDirection::Out, rx_status)
            .status(UsbDirection::In, tx_status)
            .bits();
        usb.write_epr(index, value);

        self.endpoints[index] = Some(Endpoint { number, tx, rx });
        debug!("EP{} OPEN {} {}", number, tx.is_some(), rx.is_some());
        Ok(())
    }

    /// Disable every endpoint except endpoint 0, and release their memory.
    pub fn close_data<P: UsbPeripheral>(&mut self, usb: &mut P) {
        for index in 1..ENDPOINT_COUNT {
            if self.endpoints[index].take().is_some() {
                Self::disable(usb, index);
            }
        }
        self.allocator.rewind(self.data_start);
    }

    fn disable<P: UsbPeripheral>(usb: &mut P, index: usize) {
        let current = usb.read_epr(index);
        let value = current
            .update()
            .clear_transfer_complete(UsbDirection::Out)
            .clear_transfer_complete(UsbDirection::In)
            .status(UsbDirection::Out, Status::Disabled)
            .status(UsbDirection::In, Status::Disabled)
            .bits();
        usb.write_epr(index, value);
    }
}
