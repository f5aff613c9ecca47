//! Logical serial channels

use crate::{
    acm::{ControlLines, LineCoding},
    ring::RingBuffer,
    timeout::Deadline,
};

/// The result of a control line change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Nothing changed for the application.
    None,
    /// DTR rose on a channel that wasn't ready.
    Connected,
}

/// One virtual serial port
///
/// Owns the two byte rings that the application and the bulk endpoints
/// exchange data through, and the CDC state the host sets.
pub(crate) struct Channel<const RX: usize, const TX: usize> {
    pub rx: RingBuffer<RX>,
    pub tx: RingBuffer<TX>,
    pub line_coding: LineCoding,
    pub control_lines: ControlLines,
    ready: bool,
    /// Size of the last IN packet. A full packet at the end of the data
    /// calls for a zero-length packet.
    pub last_chunk: u16,
    /// An IN packet is armed, or about to be.
    pub tx_busy: bool,
    /// An OUT packet waits in packet memory for room in `rx`. The endpoint
    /// NAKs until it's taken.
    pub rx_held: bool,
    /// An IN packet completed since the last service.
    tx_progress: bool,
    dtr_deadline: Option<Deadline>,
    tx_deadline: Option<Deadline>,
}

impl<const RX: usize, const TX: usize> Channel<RX, TX> {
    pub fn new() -> Self {
        Channel {
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            line_coding: LineCoding::default(),
            control_lines: ControlLines::empty(),
            ready: false,
            last_chunk: 0,
            tx_busy: false,
            rx_held: false,
            tx_progress: false,
            dtr_deadline: None,
            tx_deadline: None,
        }
    }

    /// Forget everything the host told us. Used on bus reset.
    pub fn reset(&mut self) {
        self.disconnect();
        self.line_coding = LineCoding::default();
        self.control_lines = ControlLines::empty();
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Apply a `SET_CONTROL_LINE_STATE`.
    pub fn set_control_lines(&mut self, lines: ControlLines) -> Transition {
        self.control_lines = lines;
        if !lines.contains(ControlLines::DTR) {
            return Transition::None;
        }
        self.dtr_deadline = None;
        if self.ready {
            Transition::None
        } else {
            self.rx.clear();
            self.tx.clear();
            self.last_chunk = 0;
            self.ready = true;
            Transition::Connected
        }
    }

    /// Drop the connection. Both rings are emptied.
    ///
    /// The caller is responsible for the endpoints.
    pub fn disconnect(&mut self) {
        self.ready = false;
        self.rx.clear();
        self.tx.clear();
        self.last_chunk = 0;
        self.tx_busy = false;
        self.rx_held = false;
        self.tx_progress = false;
        self.dtr_deadline = None;
        self.tx_deadline = None;
    }

    /// Note that an IN packet completed.
    pub fn note_tx_progress(&mut self) {
        self.tx_progress = true;
    }

    /// Update the disconnect timers.
    ///
    /// Returns `true` if the channel has been abandoned: DTR stayed low for
    /// `disconnect_timeout`, or an armed IN packet went unclaimed for
    /// `transmit_timeout`.
    pub fn check_timeouts(&mut self, now: u32, disconnect_timeout: u32, transmit_timeout: u32) -> bool {
        if !self.ready {
            return false;
        }

        if self.control_lines.contains(ControlLines::DTR) {
            self.dtr_deadline = None;
        } else {
            let deadline = *self
                .dtr_deadline
                .get_or_insert_with(|| Deadline::after(now, disconnect_timeout));
            if deadline.has_expired(now) {
                return true;
            }
        }

        if !self.tx_busy {
            self.tx_deadline = None;
        } else if core::mem::take(&mut self.tx_progress) || self.tx_deadline.is_none() {
            self.tx_deadline = Some(Deadline::after(now, transmit_timeout));
        } else if self.tx_deadline.is_some_and(|deadline| deadline.has_expired(now)) {
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, Transition};
    use crate::acm::{ControlLines, LineCoding};

    type TestChannel = Channel<16, 16>;

    #[test]
    fn reset_restores_line_coding() {
        let mut ch = TestChannel::new();
        assert_eq!(ch.line_coding, LineCoding::default());
        ch.line_coding.baud_rate = 9600;
        ch.set_control_lines(ControlLines::DTR);
        ch.reset();
        assert_eq!(ch.line_coding, LineCoding::default());
        assert!(ch.control_lines.is_empty());
        assert!(!ch.is_ready());
    }

    #[test]
    fn ready_after_dtr() {
        let mut ch = TestChannel::new();
        assert!(!ch.is_ready());
        assert_eq!(ch.set_control_lines(ControlLines::RTS), Transition::None);
        assert!(!ch.is_ready());
        assert_eq!(ch.set_control_lines(ControlLines::DTR), Transition::Connected);
        assert!(ch.is_ready());
        assert_eq!(
            ch.set_control_lines(ControlLines::DTR | ControlLines::RTS),
            Transition::None
        );
    }

    #[test]
    fn connect_clears_stale_data() {
        let mut ch = TestChannel::new();
        ch.rx.write(b"stale");
        ch.tx.write(b"stale");
        ch.set_control_lines(ControlLines::DTR);
        assert!(ch.rx.is_empty());
        assert!(ch.tx.is_empty());
    }

    #[test]
    fn dtr_drop_disconnects_after_timeout() {
        let mut ch = TestChannel::new();
        ch.set_control_lines(ControlLines::DTR);
        ch.set_control_lines(ControlLines::empty());
        assert!(ch.is_ready(), "Dropping DTR isn't immediate");

        assert!(!ch.check_timeouts(1000, 500, 1000));
        assert!(!ch.check_timeouts(1499, 500, 1000));
        assert!(ch.check_timeouts(1500, 500, 1000));
    }

    #[test]
    fn dtr_bounce_cancels_disconnect() {
        let mut ch = TestChannel::new();
        ch.set_control_lines(ControlLines::DTR);
        ch.tx.write(b"keep");
        ch.set_control_lines(ControlLines::empty());
        assert!(!ch.check_timeouts(0, 500, 1000));
        assert_eq!(ch.set_control_lines(ControlLines::DTR), Transition::None);
        assert!(!ch.check_timeouts(600, 500, 1000));
        assert_eq!(ch.tx.available(), 4, "Still the same session");
    }

    #[test]
    fn stuck_transmitter() {
        let mut ch = TestChannel::new();
        ch.set_control_lines(ControlLines::DTR);
        ch.tx_busy = true;
        assert!(!ch.check_timeouts(0, 500, 100));
        assert!(!ch.check_timeouts(50, 500, 100));

        // Progress pushes the deadline out.
        ch.note_tx_progress();
        assert!(!ch.check_timeouts(90, 500, 100));
        assert!(!ch.check_timeouts(150, 500, 100));
        assert!(ch.check_timeouts(190, 500, 100));
    }

    #[test]
    fn disconnect_resets_transfer_state() {
        let mut ch = TestChannel::new();
        ch.set_control_lines(ControlLines::DTR);
        ch.rx.write(b"abc");
        ch.tx_busy = true;
        ch.rx_held = true;
        ch.last_chunk = 64;
        ch.disconnect();
        assert!(!ch.is_ready());
        assert!(ch.rx.is_empty());
        assert!(!ch.tx_busy);
        assert!(!ch.rx_held);
        assert_eq!(ch.last_chunk, 0);
        assert!(!ch.check_timeouts(10_000, 500, 100));
    }
}
