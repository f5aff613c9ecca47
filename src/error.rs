//! Driver errors

use core::fmt;

/// Errors surfaced by the driver and the serial channels.
///
/// Every error is recoverable. None of them indicate that the peripheral
/// or the driver state is corrupt; the worst outcome is lost or truncated
/// bytes on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A ring buffer couldn't accept the data.
    ///
    /// The ring's sticky overflow flag is set, and stays set until the
    /// ring is cleared.
    BufferOverflow,
    /// The receive buffer (or the caller's line buffer) filled up before a
    /// line delimiter arrived. Discard the channel input to recover.
    LineTooLong,
    /// Unsupported or malformed control request. The host sees a STALL.
    Protocol,
    /// The channel isn't ready for I/O: the device isn't configured, or the
    /// host hasn't asserted DTR.
    NotReady,
    /// The host stopped talking to the channel for longer than the
    /// configured timeout. The channel was forced not-ready.
    DisconnectTimeout,
    /// The channel index is out of range.
    InvalidChannel,
    /// There isn't enough packet memory for the requested buffers.
    EndpointMemoryOverflow,
    /// The channel layout needs more endpoints than the peripheral provides.
    EndpointOverflow,
    /// A deadline passed before the awaited condition became true.
    Timeout,
    /// A wait was cancelled by its yield callback.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::BufferOverflow => "ring buffer overflow",
            Error::LineTooLong => "line exceeds the receive buffer",
            Error::Protocol => "unsupported control request",
            Error::NotReady => "channel not ready",
            Error::DisconnectTimeout => "host disconnected",
            Error::InvalidChannel => "invalid channel",
            Error::EndpointMemoryOverflow => "packet memory exhausted",
            Error::EndpointOverflow => "not enough endpoints",
            Error::Timeout => "timed out",
            Error::Cancelled => "cancelled",
        };
        f.write_str(msg)
    }
}

impl From<Error> for usb_device::UsbError {
    fn from(err: Error) -> Self {
        use usb_device::UsbError;
        match err {
            Error::BufferOverflow | Error::LineTooLong => UsbError::BufferOverflow,
            Error::Protocol => UsbError::Unsupported,
            Error::NotReady | Error::Timeout => UsbError::WouldBlock,
            Error::DisconnectTimeout | Error::Cancelled => UsbError::InvalidState,
            Error::InvalidChannel => UsbError::InvalidEndpoint,
            Error::EndpointMemoryOverflow => UsbError::EndpointMemoryOverflow,
            Error::EndpointOverflow => UsbError::EndpointOverflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use usb_device::UsbError;

    #[test]
    fn usb_error_interop() {
        assert_eq!(UsbError::from(Error::NotReady), UsbError::WouldBlock);
        assert_eq!(
            UsbError::from(Error::EndpointMemoryOverflow),
            UsbError::EndpointMemoryOverflow
        );
        assert_eq!(UsbError::from(Error::Protocol), UsbError::Unsupported);
    }
}
