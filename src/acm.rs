//! CDC-ACM class definitions
//!
//! Line coding, control lines, and the hooks an application registers to
//! observe them.

/// CDC class request codes.
pub mod request {
    pub const SET_LINE_CODING: u8 = 0x20;
    pub const GET_LINE_CODING: u8 = 0x21;
    pub const SET_CONTROL_LINE_STATE: u8 = 0x22;
    pub const SEND_BREAK: u8 = 0x23;
}

/// Size of the line coding structure on the wire.
pub const LINE_CODING_SIZE: usize = 7;

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum StopBits {
    One = 0,
    OnePointFive = 1,
    Two = 2,
}

/// Parity bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

/// Serial parameters that the host requested for a channel.
///
/// The driver doesn't use these; there's no physical UART. They're stored
/// so the host can read them back, and forwarded to the channel's
/// [`ChannelHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct LineCoding {
    pub baud_rate: u32,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// One of 5, 6, 7, 8 or 16.
    pub data_bits: u8,
}

impl Default for LineCoding {
    /// 115200 baud, 8N1.
    fn default() -> Self {
        LineCoding {
            baud_rate: 115_200,
            stop_bits: StopBits::One,
            parity: Parity::None,
            data_bits: 8,
        }
    }
}

impl LineCoding {
    /// Decode the class request payload.
    ///
    /// Returns `None` if the payload is short, or if any field is out of
    /// range.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; LINE_CODING_SIZE] = bytes.get(..LINE_CODING_SIZE)?.try_into().ok()?;
        let stop_bits = match bytes[4] {
            0 => StopBits::One,
            1 => StopBits::OnePointFive,
            2 => StopBits::Two,
            _ => return None,
        };
        let parity = match bytes[5] {
            0 => Parity::None,
            1 => Parity::Odd,
            2 => Parity::Even,
            3 => Parity::Mark,
            4 => Parity::Space,
            _ => return None,
        };
        let data_bits = match bytes[6] {
            bits @ (5..=8 | 16) => bits,
            _ => return None,
        };
        Some(LineCoding {
            baud_rate: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            stop_bits,
            parity,
            data_bits,
        })
    }

    /// Encode the class request payload.
    pub fn to_bytes(&self) -> [u8; LINE_CODING_SIZE] {
        let baud = self.baud_rate.to_le_bytes();
        [
            baud[0],
            baud[1],
            baud[2],
            baud[3],
            self.stop_bits as u8,
            self.parity as u8,
            self.data_bits,
        ]
    }
}

bitflags::bitflags! {
    /// Control line state, from `SET_CONTROL_LINE_STATE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControlLines: u16 {
        /// Data terminal ready. The host has the port open.
        const DTR = 1 << 0;
        /// Request to send.
        const RTS = 1 << 1;
    }
}

#[cfg(feature = "defmt-03")]
impl defmt::Format for ControlLines {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ControlLines({=u16:#x})", self.bits())
    }
}

/// What the driver does when the host sends `SEND_BREAK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum BreakPolicy {
    /// Treat the break as a disconnect. The channel becomes not-ready, and
    /// both rings are cleared. The host must raise DTR again.
    #[default]
    Disconnect,
    /// Only tell the channel's handler.
    Notify,
}

/// Observes one channel's class events.
///
/// Every method has a default that accepts the request and does nothing
/// else. Methods run in the USB interrupt context, so keep them short, and
/// never call back into the driver.
pub trait ChannelHandler {
    /// The host set a new line coding.
    ///
    /// Returns the coding that's reported back to the host. Round the baud
    /// rate here if the application emulates a real UART.
    fn line_coding(&mut self, channel: usize, requested: &LineCoding) -> LineCoding {
        let _ = channel;
        *requested
    }

    /// The host changed DTR or RTS.
    fn control_lines(&mut self, channel: usize, lines: ControlLines) {
        let _ = (channel, lines);
    }

    /// The host sent a break. `duration` is in milliseconds; `0xFFFF`
    /// means "until further notice".
    fn break_requested(&mut self, channel: usize, duration: u16) {
        let _ = (channel, duration);
    }

    /// The channel went ready, because DTR rose.
    fn connected(&mut self, channel: usize) {
        let _ = channel;
    }

    /// The channel stopped being ready: DTR stayed low past the disconnect
    /// timeout, transmission stalled, a break arrived, or the bus reset.
    fn disconnected(&mut self, channel: usize) {
        let _ = channel;
    }
}

/// A handler that accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Accept;

impl ChannelHandler for Accept {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_115200_8n1() {
        let bytes = [0x00, 0xC2, 0x01, 0x00, 0, 0, 8];
        let coding = LineCoding::parse(&bytes).unwrap();
        assert_eq!(coding, LineCoding::default());
        assert_eq!(coding.to_bytes(), bytes);
    }

    #[test]
    fn decode_9600_7e2() {
        let coding = LineCoding::parse(&[0x80, 0x25, 0, 0, 2, 2, 7]).unwrap();
        assert_eq!(coding.baud_rate, 9600);
        assert_eq!(coding.stop_bits, StopBits::Two);
        assert_eq!(coding.parity, Parity::Even);
        assert_eq!(coding.data_bits, 7);
    }

    #[test]
    fn reject_malformed() {
        assert_eq!(LineCoding::parse(&[0, 0xC2, 1, 0, 0, 0]), None);
        assert_eq!(LineCoding::parse(&[0, 0xC2, 1, 0, 3, 0, 8]), None);
        assert_eq!(LineCoding::parse(&[0, 0xC2, 1, 0, 0, 5, 8]), None);
        assert_eq!(LineCoding::parse(&[0, 0xC2, 1, 0, 0, 0, 9]), None);
    }

    #[test]
    fn control_lines_from_wvalue() {
        let lines = ControlLines::from_bits_truncate(0x0003);
        assert!(lines.contains(ControlLines::DTR | ControlLines::RTS));
        assert_eq!(ControlLines::from_bits_truncate(0x0100), ControlLines::empty());
    }
}
