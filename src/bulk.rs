//! Moving bulk packets in and out of the channel rings
//!
//! Received packets are only taken out of packet memory once the whole
//! packet fits in the receive ring. Until then, the OUT direction stays at
//! NAK, and the host retries; nothing is dropped. Transmission runs from
//! the transmit ring, one packet at a time.

use crate::{
    channel::Channel,
    endpoint::{self, Endpoint},
    epr::Status,
    peripheral::UsbPeripheral,
};
use usb_device::UsbDirection;

/// Largest bulk packet on a full-speed bus.
const MAX_PACKET_SIZE: usize = 64;

/// Handle a completed OUT transaction.
pub fn on_packet_received<P: UsbPeripheral, const RX: usize, const TX: usize>(
    usb: &mut P,
    ep: &Endpoint,
    channel: &mut Channel<RX, TX>,
) {
    let index = usize::from(ep.number());
    if !channel.is_ready() {
        // Nobody's listening; the rings are cleared on connect anyway.
        trace!("EP{} DROP", ep.number());
        endpoint::clear_and_set_status(usb, index, UsbDirection::Out, Status::Valid);
        return;
    }
    endpoint::clear_transfer_complete(usb, index, UsbDirection::Out);
    channel.rx_held = true;
    resume_rx(usb, ep, channel);
}

/// Take a held packet, if the receive ring has room for it now.
///
/// Call after the application drains the receive ring.
pub fn resume_rx<P: UsbPeripheral, const RX: usize, const TX: usize>(
    usb: &mut P,
    ep: &Endpoint,
    channel: &mut Channel<RX, TX>,
) {
    if !channel.rx_held {
        return;
    }
    let count = usize::from(ep.received(usb));
    if channel.rx.free() < count {
        trace!("EP{} HOLD {}", ep.number(), count);
        return;
    }
    let mut packet = [0; MAX_PACKET_SIZE];
    let count = ep.read(usb, &mut packet);
    channel.rx.write(&packet[..count]);
    channel.rx_held = false;
    endpoint::set_status(usb, usize::from(ep.number()), UsbDirection::Out, Status::Valid);
}

/// Drop a held packet without reading it, and accept the next one.
pub fn discard_held<P: UsbPeripheral, const RX: usize, const TX: usize>(
    usb: &mut P,
    ep: &Endpoint,
    channel: &mut Channel<RX, TX>,
) {
    if channel.rx_held {
        channel.rx_held = false;
        endpoint::set_status(usb, usize::from(ep.number()), UsbDirection::Out, Status::Valid);
    }
}

/// Handle a completed IN transaction.
pub fn on_packet_transmitted<P: UsbPeripheral, const RX: usize, const TX: usize>(
    usb: &mut P,
    ep: &Endpoint,
    channel: &mut Channel<RX, TX>,
) {
    endpoint::clear_transfer_complete(usb, usize::from(ep.number()), UsbDirection::In);
    channel.tx_busy = false;
    channel.note_tx_progress();
    transmit_next(usb, ep, channel);
}

/// Start transmitting, if the IN direction is idle.
pub fn kick<P: UsbPeripheral, const RX: usize, const TX: usize>(
    usb: &mut P,
    ep: &Endpoint,
    channel: &mut Channel<RX, TX>,
) {
    if !channel.tx_busy {
        transmit_next(usb, ep, channel);
    }
}

/// Arm the next packet: a chunk of the transmit ring, or the empty packet
/// that ends a transfer of full packets.
fn transmit_next<P: UsbPeripheral, const RX: usize, const TX: usize>(
    usb: &mut P,
    ep: &Endpoint,
    channel: &mut Channel<RX, TX>,
) {
    let max_packet_size = usize::from(ep.tx_capacity()).min(MAX_PACKET_SIZE);
    let mut packet = [0; MAX_PACKET_SIZE];
    let count = channel.tx.read(&mut packet[..max_packet_size]);
    if count == 0 && usize::from(channel.last_chunk) != max_packet_size {
        channel.last_chunk = 0;
        return;
    }
    match ep.transmit(usb, &packet[..count]) {
        Ok(()) => {
            channel.last_chunk = count as u16;
            channel.tx_busy = true;
        }
        Err(_) => {
            warn!("EP{} TX {}", ep.number(), count);
        }
    }
}

/// Stop both directions after a disconnect. Anything armed is abandoned,
/// and the OUT direction accepts packets again.
pub fn abort<P: UsbPeripheral>(usb: &mut P, ep: &Endpoint) {
    let index = usize::from(ep.number());
    let current = usb.read_epr(index);
    let value = current
        .update()
        .clear_transfer_complete(UsbDirection::In)
        .status(UsbDirection::In, Status::Nak)
        .status(UsbDirection::Out, Status::Valid)
        .bits();
    usb.write_epr(index, value);
}
