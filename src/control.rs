//! The control pipe on endpoint 0
//!
//! Moves control transfers through their SETUP, DATA and STATUS stages. The
//! pipe knows nothing about the requests themselves; the driver decides
//! what to answer once a request is complete.

use crate::{
    endpoint::{self, Endpoint},
    epr::Status,
    peripheral::UsbPeripheral,
    Error,
};
use usb_device::{
    control::{Recipient, Request, RequestType},
    UsbDirection,
};

/// Largest data stage the pipe buffers, in either direction.
pub const BUFFER_SIZE: usize = 512;

const SETUP_SIZE: usize = 8;

/// Decode a SETUP packet.
///
/// Reserved type and recipient values decode as
/// [`Reserved`](RequestType::Reserved); the dispatcher rejects them.
pub fn parse_setup(bytes: &[u8; SETUP_SIZE]) -> Request {
    let request_type = bytes[0];
    Request {
        direction: if request_type & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        },
        request_type: match (request_type >> 5) & 0b11 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        },
        recipient: match request_type & 0b1_1111 {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        },
        request: bytes[1],
        value: u16::from_le_bytes([bytes[2], bytes[3]]),
        index: u16::from_le_bytes([bytes[4], bytes[5]]),
        length: u16::from_le_bytes([bytes[6], bytes[7]]),
    }
}

/// Where a control transfer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Stage {
    Idle,
    /// A request arrived, and hasn't been answered yet.
    SetupReceived,
    DataStage(UsbDirection),
    StatusStage(UsbDirection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    SetupReceived,
    /// `sent` of `total` bytes are queued to the host. With `zlp`, an
    /// empty packet follows a final full packet.
    DataIn { sent: u16, total: u16, zlp: bool },
    /// `received` of `total` bytes arrived from the host.
    DataOut { received: u16, total: u16 },
    /// Waiting for the host's empty packet.
    StatusOut,
    /// Our empty packet is armed.
    StatusIn,
}

/// The endpoint 0 transfer state machine
pub struct ControlPipe {
    state: State,
    request: Option<Request>,
    max_packet_size: u16,
    buffer: [u8; BUFFER_SIZE],
}

impl ControlPipe {
    pub const fn new(max_packet_size: u16) -> Self {
        ControlPipe {
            state: State::Idle,
            request: None,
            max_packet_size,
            buffer: [0; BUFFER_SIZE],
        }
    }

    /// Abandon any transfer. Used on bus reset.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.request = None;
    }

    pub fn stage(&self) -> Stage {
        match self.state {
            State::Idle => Stage::Idle,
            State::SetupReceived => Stage::SetupReceived,
            State::DataIn { .. } => Stage::DataStage(UsbDirection::In),
            State::DataOut { .. } => Stage::DataStage(UsbDirection::Out),
            State::StatusOut => Stage::StatusStage(UsbDirection::Out),
            State::StatusIn => Stage::StatusStage(UsbDirection::In),
        }
    }

    /// Scratch space for an IN response. Fill it, then [`respond()`](Self::respond).
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// The data stage of the completed OUT request.
    pub fn data(&self) -> &[u8] {
        match (self.state, self.request) {
            (State::SetupReceived, Some(request)) => {
                &self.buffer[..usize::from(request.length).min(BUFFER_SIZE)]
            }
            _ => &[],
        }
    }

    /// Handle a SETUP packet sitting in the endpoint 0 receive buffer.
    ///
    /// A SETUP pre-empts any transfer in progress. Returns the request once
    /// it's ready to be answered: immediately for IN requests and requests
    /// without data, or after the data stage for OUT requests with data.
    pub fn on_setup<P: UsbPeripheral>(&mut self, usb: &mut P, ep: &Endpoint) -> Result<Option<Request>, Error> {
        let mut bytes = [0; SETUP_SIZE];
        let count = ep.read(usb, &mut bytes);
        endpoint::clear_transfer_complete(usb, 0, UsbDirection::Out);
        self.reset();
        if count != SETUP_SIZE {
            return Err(Error::Protocol);
        }

        let request = parse_setup(&bytes);
        trace!(
            "SETUP {:#x} {:#x} {:#x} {:#x} {}",
            bytes[0],
            request.request,
            request.value,
            request.index,
            request.length
        );
        self.request = Some(request);

        if request.direction == UsbDirection::Out && request.length > 0 {
            if usize::from(request.length) > BUFFER_SIZE {
                return Err(Error::Protocol);
            }
            self.state = State::DataOut {
                received: 0,
                total: request.length,
            };
            endpoint::set_status(usb, 0, UsbDirection::Out, Status::Valid);
            Ok(None)
        } else {
            self.state = State::SetupReceived;
            Ok(Some(request))
        }
    }

    /// Handle a completed OUT transaction that isn't a SETUP.
    ///
    /// Returns the request when its data stage completes.
    pub fn on_out<P: UsbPeripheral>(&mut self, usb: &mut P, ep: &Endpoint) -> Result<Option<Request>, Error> {
        match self.state {
            State::DataOut { received, total } => {
                let remaining = &mut self.buffer[usize::from(received)..usize::from(total)];
                let count = ep.received(usb);
                if usize::from(count) > remaining.len() {
                    endpoint::clear_transfer_complete(usb, 0, UsbDirection::Out);
                    return Err(Error::Protocol);
                }
                ep.read(usb, remaining);
                let received = received + count;
                if received < total && count == self.max_packet_size {
                    self.state = State::DataOut { received, total };
                    endpoint::clear_and_set_status(usb, 0, UsbDirection::Out, Status::Valid);
                    Ok(None)
                } else if received < total {
                    // A short packet ends the data stage early.
                    endpoint::clear_transfer_complete(usb, 0, UsbDirection::Out);
                    Err(Error::Protocol)
                } else {
                    endpoint::clear_transfer_complete(usb, 0, UsbDirection::Out);
                    self.state = State::SetupReceived;
                    Ok(self.request)
                }
            }
            State::DataIn { .. } | State::StatusOut => {
                // The host ended the transfer, possibly before taking every
                // byte.
                endpoint::clear_transfer_complete(usb, 0, UsbDirection::Out);
                endpoint::set_status(usb, 0, UsbDirection::In, Status::Nak);
                self.reset();
                Ok(None)
            }
            _ => {
                endpoint::clear_transfer_complete(usb, 0, UsbDirection::Out);
                Err(Error::Protocol)
            }
        }
    }

    /// Handle a completed IN transaction.
    ///
    /// Returns the request when its status stage completes.
    pub fn on_in<P: UsbPeripheral>(&mut self, usb: &mut P, ep: &Endpoint) -> Option<Request> {
        endpoint::clear_transfer_complete(usb, 0, UsbDirection::In);
        match self.state {
            State::DataIn { sent, total, zlp } => {
                if sent < total || zlp {
                    if let Err(_err) = self.send_next(usb, ep, sent, total, zlp) {
                        warn!("EP0 IN {}", _err);
                        self.stall(usb);
                    }
                } else {
                    self.state = State::StatusOut;
                }
                None
            }
            State::StatusIn => {
                let request = self.request.take();
                self.state = State::Idle;
                request
            }
            _ => None,
        }
    }

    /// Answer the pending IN request with the first `len` bytes of the
    /// buffer.
    ///
    /// The response is cut to the request's `wLength`. A response that's
    /// shorter than `wLength`, and a multiple of the packet size, ends with
    /// an empty packet. A request without a data stage gets its status
    /// packet instead.
    pub fn respond<P: UsbPeripheral>(&mut self, usb: &mut P, ep: &Endpoint, len: usize) -> Result<(), Error> {
        let request = match (self.state, self.request) {
            (State::SetupReceived, Some(request)) if request.direction == UsbDirection::In => request,
            _ => return Err(Error::Protocol),
        };
        if request.length == 0 {
            return self.accept(usb, ep);
        }
        let total = (len.min(BUFFER_SIZE) as u16).min(request.length);
        let zlp = total < request.length && total != 0 && total % self.max_packet_size == 0;
        // The host may end the data stage at any time with its status
        // packet.
        endpoint::set_status(usb, 0, UsbDirection::Out, Status::Valid);
        self.send_next(usb, ep, 0, total, zlp)
    }

    /// Complete the pending request with an empty status packet.
    pub fn accept<P: UsbPeripheral>(&mut self, usb: &mut P, ep: &Endpoint) -> Result<(), Error> {
        match (self.state, self.request) {
            (State::SetupReceived, Some(request)) if request.direction == UsbDirection::Out || request.length == 0 => {
                self.state = State::StatusIn;
                ep.transmit(usb, &[])
            }
            _ => Err(Error::Protocol),
        }
    }

    /// Refuse the pending request, or abort the transfer.
    ///
    /// Both directions answer STALL until the next SETUP.
    pub fn stall<P: UsbPeripheral>(&mut self, usb: &mut P) {
        let current = usb.read_epr(0);
        let value = current
            .update()
            .status(UsbDirection::Out, Status::Stall)
            .status(UsbDirection::In, Status::Stall)
            .bits();
        usb.write_epr(0, value);
        debug!("EP0 STALL");
        self.reset();
    }

    fn send_next<P: UsbPeripheral>(
        &mut self,
        usb: &mut P,
        ep: &Endpoint,
        sent: u16,
        total: u16,
        zlp: bool,
    ) -> Result<(), Error> {
        let chunk = (total - sent).min(self.max_packet_size);
        let start = usize::from(sent);
        let end = start + usize::from(chunk);
        ep.transmit(usb, &self.buffer[start..end])?;
        let sent = sent + chunk;
        self.state = State::DataIn {
            sent,
            total,
            zlp: zlp && !(chunk == 0 && sent == total),
        };
        Ok(())
    }
}
