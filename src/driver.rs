//! The device driver
//!
//! [`Driver`] owns the peripheral, the endpoint table, the control pipe,
//! and every serial channel. The USB interrupt handler calls
//! [`poll()`](Driver::poll); the application calls the channel methods,
//! and [`service()`](Driver::service) from its main loop. Wrap the driver
//! in a [`SharedDevice`](crate::SharedDevice) when both contexts need it.

use crate::{
    acm::{self, BreakPolicy, ChannelHandler, ControlLines, LineCoding},
    buffer::{self, Allocator, Buffer, ENDPOINT_COUNT},
    bulk,
    channel::{Channel, Transition},
    control::{ControlPipe, Stage},
    descriptor::{self, Layout, Role},
    endpoint::{EndpointTable, Sizes},
    epr::{EndpointKind, Epr, Status},
    peripheral::{Istr, UsbPeripheral},
    Config, Error,
};
use usb_device::{
    control::{Recipient, Request, RequestType},
    device::UsbDeviceState,
    UsbDirection,
};

/// Upper bound on transactions handled in one [`poll()`](Driver::poll).
///
/// A host can complete transactions as fast as the driver handles them;
/// the bound keeps the interrupt handler from starving the application.
const MAX_TRANSACTIONS: usize = 16;

/// How the driver answers a complete control request.
enum Response {
    /// Send the first bytes of the control buffer.
    Data(usize),
    /// Send an empty status packet.
    Accept,
}

/// A CDC-ACM device with `N` serial channels
///
/// `RX` and `TX` are the backing sizes of each channel's receive and
/// transmit rings. A ring stores one byte less than its backing size.
pub struct Driver<'a, P, const N: usize, const RX: usize = 256, const TX: usize = 256> {
    usb: P,
    config: Config<'a>,
    layout: Layout,
    endpoints: EndpointTable,
    control: ControlPipe,
    channels: [Channel<RX, TX>; N],
    handlers: [Option<&'a mut (dyn ChannelHandler + Send)>; N],
    /// The channel was forced not-ready by a timeout, and hasn't
    /// reconnected.
    timed_out: [bool; N],
    state: UsbDeviceState,
    suspended: bool,
    address: u8,
}

impl<'a, P: UsbPeripheral, const N: usize, const RX: usize, const TX: usize> Driver<'a, P, N, RX, TX> {
    /// Create a driver for `usb`.
    ///
    /// Fails with [`Error::EndpointOverflow`] if `N` channels don't fit the
    /// endpoint registers, and with [`Error::EndpointMemoryOverflow`] if
    /// their buffers don't fit the packet memory.
    pub fn new(usb: P, config: Config<'a>) -> Result<Self, Error> {
        let layout = Layout::new(N, config.notifications)?;
        check_packet_memory(&config, &layout, usb.pma_size())?;
        Ok(Driver {
            endpoints: EndpointTable::new(usb.pma_size()),
            usb,
            control: ControlPipe::new(u16::from(config.max_packet_size_0)),
            config,
            layout,
            channels: core::array::from_fn(|_| Channel::new()),
            handlers: core::array::from_fn(|_| None),
            timed_out: [false; N],
            state: UsbDeviceState::Default,
            suspended: false,
            address: 0,
        })
    }

    /// Register the handler that observes `channel`.
    pub fn set_handler(&mut self, channel: usize, handler: &'a mut (dyn ChannelHandler + Send)) -> Result<(), Error> {
        let slot = self.handlers.get_mut(channel).ok_or(Error::InvalidChannel)?;
        *slot = Some(handler);
        Ok(())
    }

    /// Power the peripheral, and let the host see the device.
    ///
    /// The device answers once the host resets the bus.
    pub fn enable(&mut self) {
        self.usb.enable();
        debug!("ENABLED {} CHANNELS", N);
    }

    /// Handle every pending USB event.
    ///
    /// Call from the USB interrupt handler, or periodically.
    pub fn poll(&mut self) {
        let istr = self.usb.interrupts();
        if istr.contains(Istr::RESET) {
            self.usb.clear_interrupts(Istr::RESET);
            self.bus_reset();
        }
        if istr.contains(Istr::WKUP) {
            self.usb.clear_interrupts(Istr::WKUP);
            self.usb.set_suspended(false);
            self.suspended = false;
            debug!("RESUME");
        }
        if istr.contains(Istr::SUSP) {
            self.usb.clear_interrupts(Istr::SUSP);
            self.usb.set_suspended(true);
            self.suspended = true;
            debug!("SUSPEND");
        }
        let other = istr & (Istr::PMAOVR | Istr::ERR | Istr::SOF | Istr::ESOF);
        if !other.is_empty() {
            trace!("ISTR {}", other);
            self.usb.clear_interrupts(other);
        }

        for _ in 0..MAX_TRANSACTIONS {
            let istr = self.usb.interrupts();
            if !istr.contains(Istr::CTR) {
                break;
            }
            self.on_transaction(istr.endpoint());
        }
    }

    fn bus_reset(&mut self) {
        self.usb.set_address(0);
        self.address = 0;
        self.endpoints.reset();
        self.control.reset();
        if let Err(_err) = self
            .endpoints
            .open_control(&mut self.usb, u16::from(self.config.max_packet_size_0))
        {
            warn!("EP0 {}", _err);
        }
        for channel in 0..N {
            let was_ready = self.channels[channel].is_ready();
            self.channels[channel].reset();
            self.timed_out[channel] = false;
            if was_ready {
                if let Some(handler) = self.handler(channel) {
                    handler.disconnected(channel);
                }
            }
        }
        self.state = UsbDeviceState::Default;
        self.suspended = false;
        debug!("RESET");
    }

    fn on_transaction(&mut self, index: usize) {
        if index >= ENDPOINT_COUNT {
            return;
        }
        let epr = self.usb.read_epr(index);
        if index == 0 {
            self.on_control(epr);
            return;
        }

        let endpoint = self.endpoints.get(index as u8).copied();
        match (endpoint, self.layout.endpoint_owner(index as u8)) {
            (Some(ep), Some((channel, Role::Data))) => {
                let channel = &mut self.channels[channel];
                if epr.is_complete(UsbDirection::Out) {
                    bulk::on_packet_received(&mut self.usb, &ep, channel);
                }
                if epr.is_complete(UsbDirection::In) {
                    bulk::on_packet_transmitted(&mut self.usb, &ep, channel);
                }
            }
            _ => {
                // Notification endpoints, and anything stale.
                let value = epr
                    .update()
                    .clear_transfer_complete(UsbDirection::Out)
                    .clear_transfer_complete(UsbDirection::In)
                    .bits();
                self.usb.write_epr(index, value);
            }
        }
    }

    fn on_control(&mut self, epr: Epr) {
        let Some(ep0) = self.endpoints.get(0).copied() else {
            let value = epr
                .update()
                .clear_transfer_complete(UsbDirection::Out)
                .clear_transfer_complete(UsbDirection::In)
                .bits();
            self.usb.write_epr(0, value);
            return;
        };

        if epr.is_complete(UsbDirection::In) {
            if let Some(request) = self.control.on_in(&mut self.usb, &ep0) {
                self.on_status_complete(&request);
            }
        }
        if epr.is_complete(UsbDirection::Out) {
            let result = if epr.is_setup() {
                self.control.on_setup(&mut self.usb, &ep0)
            } else {
                self.control.on_out(&mut self.usb, &ep0)
            };
            let result = match result {
                Ok(Some(request)) => self.dispatch(&request).and_then(|response| match response {
                    Response::Data(len) => self.control.respond(&mut self.usb, &ep0, len),
                    Response::Accept => self.control.accept(&mut self.usb, &ep0),
                }),
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(_err) = result {
                warn!("EP0 {}", _err);
                self.control.stall(&mut self.usb);
            }
        }
    }

    /// Act on requests that only take effect after their status stage.
    fn on_status_complete(&mut self, request: &Request) {
        if request.request_type == RequestType::Standard
            && request.recipient == Recipient::Device
            && request.request == Request::SET_ADDRESS
        {
            self.address = request.value as u8;
            self.usb.set_address(self.address);
            self.state = if self.address == 0 {
                UsbDeviceState::Default
            } else {
                UsbDeviceState::Addressed
            };
            debug!("ADDRESS {}", self.address);
        }
    }

    fn dispatch(&mut self, request: &Request) -> Result<Response, Error> {
        match (request.request_type, request.recipient) {
            (RequestType::Standard, Recipient::Device) => self.standard_device(request),
            (RequestType::Standard, Recipient::Interface) => self.standard_interface(request),
            (RequestType::Standard, Recipient::Endpoint) => self.standard_endpoint(request),
            (RequestType::Class, Recipient::Interface) => self.class_interface(request),
            _ => Err(Error::Protocol),
        }
    }

    fn standard_device(&mut self, request: &Request) -> Result<Response, Error> {
        match request.request {
            Request::GET_STATUS => {
                // Bus powered, no remote wakeup.
                self.control.buffer_mut()[..2].copy_from_slice(&[0, 0]);
                Ok(Response::Data(2))
            }
            Request::GET_DESCRIPTOR => {
                let (kind, index) = request.descriptor_type_index();
                let buf = self.control.buffer_mut();
                let len = match kind {
                    descriptor::kind::DEVICE => descriptor::device(&self.config, buf)?,
                    descriptor::kind::CONFIGURATION => descriptor::configuration(&self.config, &self.layout, buf)?,
                    descriptor::kind::STRING => descriptor::string(&self.config, index, buf).ok_or(Error::Protocol)??,
                    descriptor::kind::DEVICE_QUALIFIER => descriptor::qualifier(&self.config, buf)?,
                    _ => return Err(Error::Protocol),
                };
                Ok(Response::Data(len))
            }
            Request::GET_CONFIGURATION => {
                let value = match self.state {
                    UsbDeviceState::Configured => descriptor::CONFIGURATION_VALUE,
                    _ => 0,
                };
                self.control.buffer_mut()[0] = value;
                Ok(Response::Data(1))
            }
            Request::SET_ADDRESS if request.value <= 127 && self.state != UsbDeviceState::Configured => {
                Ok(Response::Accept)
            }
            Request::SET_CONFIGURATION => self.set_configuration(request.value).map(|()| Response::Accept),
            _ => Err(Error::Protocol),
        }
    }

    fn set_configuration(&mut self, value: u16) -> Result<(), Error> {
        if self.state == UsbDeviceState::Default {
            return Err(Error::Protocol);
        }
        if value != 0 && value != u16::from(descriptor::CONFIGURATION_VALUE) {
            return Err(Error::Protocol);
        }

        if self.state == UsbDeviceState::Configured {
            self.deconfigure();
        }
        if value == 0 {
            return Ok(());
        }

        let size = self.config.bulk_max_packet_size;
        for channel in 0..N {
            let sizes = Sizes {
                tx: Some(size),
                rx: Some(size),
            };
            let opened = self
                .endpoints
                .open(&mut self.usb, self.layout.data_endpoint(channel), EndpointKind::Bulk, sizes)
                .and_then(|()| match self.layout.notification_endpoint(channel) {
                    Some(number) => {
                        let sizes = Sizes {
                            tx: Some(descriptor::NOTIFICATION_PACKET_SIZE),
                            rx: None,
                        };
                        self.endpoints.open(&mut self.usb, number, EndpointKind::Interrupt, sizes)
                    }
                    None => Ok(()),
                });
            if let Err(err) = opened {
                self.endpoints.close_data(&mut self.usb);
                return Err(err);
            }
        }
        self.state = UsbDeviceState::Configured;
        debug!("CONFIGURED");
        Ok(())
    }

    /// Return to the addressed state. Every channel disconnects.
    fn deconfigure(&mut self) {
        for channel in 0..N {
            if self.channels[channel].is_ready() {
                self.disconnect(channel);
            }
        }
        self.endpoints.close_data(&mut self.usb);
        self.state = UsbDeviceState::Addressed;
        debug!("DECONFIGURED");
    }

    fn standard_interface(&mut self, request: &Request) -> Result<Response, Error> {
        if self.state != UsbDeviceState::Configured || usize::from(request.index) >= 2 * N {
            return Err(Error::Protocol);
        }
        match request.request {
            Request::GET_STATUS => {
                self.control.buffer_mut()[..2].copy_from_slice(&[0, 0]);
                Ok(Response::Data(2))
            }
            Request::GET_INTERFACE => {
                self.control.buffer_mut()[0] = 0;
                Ok(Response::Data(1))
            }
            Request::SET_INTERFACE if request.value == 0 => Ok(Response::Accept),
            _ => Err(Error::Protocol),
        }
    }

    fn standard_endpoint(&mut self, request: &Request) -> Result<Response, Error> {
        let number = (request.index & 0x0F) as u8;
        let direction = if request.index & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        };
        let status = self
            .endpoints
            .get(number)
            .map(|_| self.usb.read_epr(usize::from(number)).status(direction))
            .filter(|&status| status != Status::Disabled);
        let halt = request.value == Request::FEATURE_ENDPOINT_HALT && number != 0;

        match (request.request, status) {
            (Request::GET_STATUS, Some(status)) => {
                let halted = u8::from(status == Status::Stall);
                self.control.buffer_mut()[..2].copy_from_slice(&[halted, 0]);
                Ok(Response::Data(2))
            }
            (Request::GET_STATUS, None) => Err(Error::Protocol),
            (Request::CLEAR_FEATURE, Some(_)) if halt => {
                self.set_halt(number, direction, false);
                Ok(Response::Accept)
            }
            (Request::SET_FEATURE, Some(_)) if halt => {
                self.set_halt(number, direction, true);
                Ok(Response::Accept)
            }
            // Acknowledged, and otherwise ignored.
            _ if request.direction == UsbDirection::In => Ok(Response::Data(0)),
            _ => Ok(Response::Accept),
        }
    }

    /// Stall, or un-stall, one direction of a data endpoint.
    ///
    /// Un-stalling returns the data toggle to DATA0, and resumes where the
    /// channel left off.
    fn set_halt(&mut self, number: u8, direction: UsbDirection, halt: bool) {
        let index = usize::from(number);
        let current = self.usb.read_epr(index);
        let value = if halt {
            current.update().status(direction, Status::Stall).bits()
        } else {
            let channel = match self.layout.endpoint_owner(number) {
                Some((channel, Role::Data)) => Some(&self.channels[channel]),
                _ => None,
            };
            let status = match direction {
                UsbDirection::In if channel.is_some_and(|channel| channel.tx_busy) => Status::Valid,
                UsbDirection::Out if channel.is_some_and(|channel| channel.rx_held) => Status::Nak,
                UsbDirection::In => Status::Nak,
                UsbDirection::Out => Status::Valid,
            };
            current
                .update()
                .status(direction, status)
                .reset_data_toggle(direction)
                .bits()
        };
        self.usb.write_epr(index, value);
        debug!("EP{} HALT {}", number, halt);
    }

    fn class_interface(&mut self, request: &Request) -> Result<Response, Error> {
        if self.state != UsbDeviceState::Configured {
            return Err(Error::Protocol);
        }
        let channel = self.layout.interface_owner(request.index).ok_or(Error::Protocol)?;

        match request.request {
            acm::request::SET_LINE_CODING if request.direction == UsbDirection::Out => {
                let requested = LineCoding::parse(self.control.data()).ok_or(Error::Protocol)?;
                let coding = match self.handler(channel) {
                    Some(handler) => handler.line_coding(channel, &requested),
                    None => requested,
                };
                self.channels[channel].line_coding = coding;
                debug!("CH{} LINE CODING {}", channel, coding.baud_rate);
                Ok(Response::Accept)
            }
            acm::request::GET_LINE_CODING if request.direction == UsbDirection::In => {
                let bytes = self.channels[channel].line_coding.to_bytes();
                self.control.buffer_mut()[..bytes.len()].copy_from_slice(&bytes);
                Ok(Response::Data(bytes.len()))
            }
            acm::request::SET_CONTROL_LINE_STATE => {
                let lines = ControlLines::from_bits_truncate(request.value);
                let transition = self.channels[channel].set_control_lines(lines);
                if transition == Transition::Connected {
                    self.timed_out[channel] = false;
                }
                if let Some(handler) = self.handler(channel) {
                    handler.control_lines(channel, lines);
                    if transition == Transition::Connected {
                        handler.connected(channel);
                    }
                }
                debug!("CH{} LINES {}", channel, lines);
                Ok(Response::Accept)
            }
            acm::request::SEND_BREAK => {
                if let Some(handler) = self.handler(channel) {
                    handler.break_requested(channel, request.value);
                }
                if self.config.break_policy == BreakPolicy::Disconnect && self.channels[channel].is_ready() {
                    self.disconnect(channel);
                }
                Ok(Response::Accept)
            }
            _ => Err(Error::Protocol),
        }
    }

    fn handler(&mut self, channel: usize) -> Option<&mut (dyn ChannelHandler + Send + 'a)> {
        self.handlers.get_mut(channel)?.as_deref_mut()
    }

    /// Force a channel not-ready, and abandon its transfers.
    fn disconnect(&mut self, channel: usize) {
        self.channels[channel].disconnect();
        if let Some(ep) = self.endpoints.get(self.layout.data_endpoint(channel)).copied() {
            bulk::abort(&mut self.usb, &ep);
        }
        if let Some(handler) = self.handler(channel) {
            handler.disconnected(channel);
        }
        debug!("CH{} DISCONNECTED", channel);
    }

    fn kick(&mut self, channel: usize) {
        if let Some(ep) = self.endpoints.get(self.layout.data_endpoint(channel)).copied() {
            bulk::kick(&mut self.usb, &ep, &mut self.channels[channel]);
        }
    }

    fn resume_rx(&mut self, channel: usize) {
        if let Some(ep) = self.endpoints.get(self.layout.data_endpoint(channel)).copied() {
            bulk::resume_rx(&mut self.usb, &ep, &mut self.channels[channel]);
        }
    }

    /// Returns the channel if it's ready for I/O.
    fn ready(&mut self, channel: usize) -> Result<&mut Channel<RX, TX>, Error> {
        if channel >= N {
            return Err(Error::InvalidChannel);
        }
        if self.timed_out[channel] {
            return Err(Error::DisconnectTimeout);
        }
        if self.state != UsbDeviceState::Configured || !self.channels[channel].is_ready() {
            return Err(Error::NotReady);
        }
        Ok(&mut self.channels[channel])
    }

    /// Queue `bytes` for the host.
    ///
    /// All of `bytes` is queued, or nothing is. Returns the number of bytes
    /// queued, or [`Error::BufferOverflow`] if they don't fit the transmit
    /// ring.
    pub fn send(&mut self, channel: usize, bytes: &[u8]) -> Result<usize, Error> {
        let ch = self.ready(channel)?;
        if bytes.is_empty() {
            return Ok(0);
        }
        if ch.tx.write(bytes) == 0 {
            return Err(Error::BufferOverflow);
        }
        self.kick(channel);
        Ok(bytes.len())
    }

    /// Queue `text`, followed by `"\r\n"`.
    ///
    /// Like [`send()`](Self::send), the whole line is queued, or nothing
    /// is.
    pub fn send_line(&mut self, channel: usize, text: &str) -> Result<usize, Error> {
        let ch = self.ready(channel)?;
        let written = ch.tx.write_parts(&[text.as_bytes(), b"\r\n"]);
        if written == 0 {
            return Err(Error::BufferOverflow);
        }
        self.kick(channel);
        Ok(written)
    }

    /// Take received bytes.
    ///
    /// Returns the number of bytes copied into `buf`, which may be zero.
    pub fn receive(&mut self, channel: usize, buf: &mut [u8]) -> Result<usize, Error> {
        let count = self.ready(channel)?.rx.read(buf);
        self.resume_rx(channel);
        Ok(count)
    }

    /// Take one received line.
    ///
    /// Lines end in `'\n'`. The line is copied into `buf` without its
    /// terminator, and without a `'\r'` before it. Returns `Ok(None)` if
    /// there's no complete line yet.
    ///
    /// Returns [`Error::LineTooLong`] if the line can't fit `buf`, or the
    /// receive ring. Call [`discard_input()`](Self::discard_input) to
    /// recover.
    pub fn receive_line(&mut self, channel: usize, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        let line = self.ready(channel)?.rx.read_until(b'\n', buf);
        self.resume_rx(channel);
        match line? {
            Some(len) => Ok(Some(match buf[..len] {
                [.., b'\r'] => len - 1,
                _ => len,
            })),
            // No room for the next packet, and no end of line to make room.
            None if self.channels[channel].rx_held => Err(Error::LineTooLong),
            None => Ok(None),
        }
    }

    /// Drop every received byte, and reset the receive overflow flag.
    ///
    /// A packet waiting for room in the receive ring is dropped too.
    pub fn discard_input(&mut self, channel: usize) -> Result<(), Error> {
        self.ready(channel)?.rx.clear();
        if let Some(ep) = self.endpoints.get(self.layout.data_endpoint(channel)).copied() {
            bulk::discard_held(&mut self.usb, &ep, &mut self.channels[channel]);
        }
        Ok(())
    }

    /// Indicates if the channel is ready for I/O: the device is configured,
    /// and the host raised DTR.
    pub fn channel_ready(&self, channel: usize) -> bool {
        self.state == UsbDeviceState::Configured && self.channels.get(channel).is_some_and(Channel::is_ready)
    }

    /// Indicates if the host took every queued byte.
    pub fn is_flushed(&self, channel: usize) -> bool {
        self.channels
            .get(channel)
            .map_or(true, |channel| channel.tx.is_empty() && !channel.tx_busy)
    }

    /// Indicates if the receive ring overflowed since the channel
    /// connected, or since the input was last discarded.
    pub fn overflowed(&self, channel: usize) -> bool {
        self.channels.get(channel).is_some_and(|channel| channel.rx.overflowed())
    }

    /// The line coding the host last set.
    pub fn line_coding(&self, channel: usize) -> Option<LineCoding> {
        self.channels.get(channel).map(|channel| channel.line_coding)
    }

    /// DTR and RTS, as the host last set them.
    pub fn control_lines(&self, channel: usize) -> Option<ControlLines> {
        self.channels.get(channel).map(|channel| channel.control_lines)
    }

    /// Housekeeping. Call from the main loop, with a millisecond clock.
    ///
    /// Takes held packets once there's room, and disconnects channels that
    /// dropped DTR, or stopped taking data, for longer than the configured
    /// timeouts. Returns the number of channels that were disconnected.
    pub fn service(&mut self, now: u32) -> usize {
        let mut disconnected = 0;
        for channel in 0..N {
            self.resume_rx(channel);
            let expired = self.channels[channel].check_timeouts(
                now,
                self.config.disconnect_timeout,
                self.config.transmit_timeout,
            );
            if expired {
                warn!("CH{} TIMEOUT", channel);
                self.disconnect(channel);
                self.timed_out[channel] = true;
                disconnected += 1;
            }
        }
        disconnected
    }

    /// The device state. Suspension overrides the others.
    pub fn state(&self) -> UsbDeviceState {
        if self.suspended {
            UsbDeviceState::Suspend
        } else {
            self.state
        }
    }

    /// The address the host assigned.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Where the control pipe stands.
    pub fn control_stage(&self) -> Stage {
        self.control.stage()
    }

    pub fn usb(&self) -> &P {
        &self.usb
    }

    pub fn usb_mut(&mut self) -> &mut P {
        &mut self.usb
    }
}

/// Make sure every buffer the device will ever need fits the packet memory.
///
/// The order matches the allocation order at runtime: endpoint 0, then
/// each channel's endpoints, each transmit buffer before its receive
/// buffer.
fn check_packet_memory(config: &Config, layout: &Layout, pma_size: u16) -> Result<(), Error> {
    let mut requests = [buffer::Request {
        endpoint: 0,
        direction: UsbDirection::In,
        size: 0,
    }; 2 * ENDPOINT_COUNT];
    let mut count = 0;
    let mut push = |endpoint, direction, size| {
        requests[count] = buffer::Request {
            endpoint,
            direction,
            size,
        };
        count += 1;
    };

    let size_0 = u16::from(config.max_packet_size_0);
    push(0, UsbDirection::In, size_0);
    push(0, UsbDirection::Out, size_0);
    for channel in 0..layout.channels() {
        let number = layout.data_endpoint(channel);
        push(number, UsbDirection::In, config.bulk_max_packet_size);
        push(number, UsbDirection::Out, config.bulk_max_packet_size);
        if let Some(number) = layout.notification_endpoint(channel) {
            push(number, UsbDirection::In, descriptor::NOTIFICATION_PACKET_SIZE);
        }
    }

    let mut buffers = [Buffer::default(); 2 * ENDPOINT_COUNT];
    buffer::plan(&mut Allocator::new(pma_size), &requests[..count], &mut buffers)
}
