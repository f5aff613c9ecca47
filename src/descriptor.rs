//! USB descriptors, and the endpoint layout they advertise
//!
//! Every channel is one CDC-ACM function: an interface association, a
//! communication interface carrying the CDC functional descriptors, and a
//! data interface with one bulk OUT / bulk IN pair. Channel `i` owns
//! interfaces `2i` and `2i + 1`.

use crate::{Config, Error};

/// Descriptor type codes.
pub mod kind {
    pub const DEVICE: u8 = 1;
    pub const CONFIGURATION: u8 = 2;
    pub const STRING: u8 = 3;
    pub const INTERFACE: u8 = 4;
    pub const ENDPOINT: u8 = 5;
    pub const DEVICE_QUALIFIER: u8 = 6;
    pub const INTERFACE_ASSOCIATION: u8 = 11;
    pub const CS_INTERFACE: u8 = 0x24;
}

const USB_CLASS_CDC: u8 = 0x02;
const USB_CLASS_CDC_DATA: u8 = 0x0A;
const CDC_SUBCLASS_ACM: u8 = 0x02;
const CDC_PROTOCOL_NONE: u8 = 0x00;

const CDC_TYPE_HEADER: u8 = 0x00;
const CDC_TYPE_CALL_MANAGEMENT: u8 = 0x01;
const CDC_TYPE_ACM: u8 = 0x02;
const CDC_TYPE_UNION: u8 = 0x06;

/// Line coding, control line state and break requests.
const ACM_CAPABILITIES: u8 = 0x06;

const BULK: u8 = 0x02;
const INTERRUPT: u8 = 0x03;
/// Packet size of the interrupt IN notification endpoints.
pub const NOTIFICATION_PACKET_SIZE: u16 = 8;
const NOTIFICATION_INTERVAL: u8 = 255;

/// Bus powered, no remote wakeup.
const CONFIGURATION_ATTRIBUTES: u8 = 0x80;

/// The only configuration value.
pub const CONFIGURATION_VALUE: u8 = 1;

/// US English.
pub const LANGUAGE_ID: u16 = 0x0409;

/// String descriptor indices.
pub mod string_index {
    pub const MANUFACTURER: u8 = 1;
    pub const PRODUCT: u8 = 2;
    pub const SERIAL_NUMBER: u8 = 3;
}

const DEVICE_SIZE: usize = 18;
const QUALIFIER_SIZE: usize = 10;
const CONFIGURATION_HEADER_SIZE: usize = 9;
const FUNCTION_SIZE: usize = 59;
const NOTIFICATION_ENDPOINT_SIZE: usize = 7;

/// Endpoints available to channels. Endpoint 0 is the control pipe.
const DATA_ENDPOINTS: usize = crate::buffer::ENDPOINT_COUNT - 1;

/// What a channel uses an endpoint for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Role {
    Data,
    Notification,
}

/// Maps channels to endpoint numbers and interface numbers.
///
/// Without notifications, channel `i` uses endpoint `i + 1` in both
/// directions, and up to seven channels fit. With notifications, channel
/// `i` uses endpoint `2i + 1` for data and `2i + 2` for its interrupt IN
/// endpoint, and up to three channels fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Layout {
    channels: usize,
    notifications: bool,
}

impl Layout {
    /// Returns [`Error::EndpointOverflow`] if the channels don't fit the
    /// endpoint registers, or if there are no channels.
    pub const fn new(channels: usize, notifications: bool) -> Result<Self, Error> {
        let per_channel = if notifications { 2 } else { 1 };
        if channels == 0 || channels * per_channel > DATA_ENDPOINTS {
            Err(Error::EndpointOverflow)
        } else {
            Ok(Layout {
                channels,
                notifications,
            })
        }
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    pub const fn has_notifications(&self) -> bool {
        self.notifications
    }

    /// Endpoint number of the channel's bulk pair.
    pub const fn data_endpoint(&self, channel: usize) -> u8 {
        if self.notifications {
            (2 * channel + 1) as u8
        } else {
            (channel + 1) as u8
        }
    }

    /// Endpoint number of the channel's interrupt IN endpoint.
    pub const fn notification_endpoint(&self, channel: usize) -> Option<u8> {
        if self.notifications {
            Some((2 * channel + 2) as u8)
        } else {
            None
        }
    }

    /// The highest endpoint number in use.
    pub const fn last_endpoint(&self) -> u8 {
        if self.notifications {
            (2 * self.channels) as u8
        } else {
            self.channels as u8
        }
    }

    /// Find the channel that owns an endpoint number.
    pub fn endpoint_owner(&self, endpoint: u8) -> Option<(usize, Role)> {
        let endpoint = usize::from(endpoint);
        if endpoint == 0 || endpoint > usize::from(self.last_endpoint()) {
            return None;
        }
        if self.notifications {
            let channel = (endpoint - 1) / 2;
            let role = if endpoint % 2 == 1 {
                Role::Data
            } else {
                Role::Notification
            };
            Some((channel, role))
        } else {
            Some((endpoint - 1, Role::Data))
        }
    }

    /// Find the channel that owns an interface number.
    pub fn interface_owner(&self, interface: u16) -> Option<usize> {
        let channel = usize::from(interface / 2);
        (channel < self.channels).then_some(channel)
    }

    /// Size of the complete configuration descriptor.
    pub const fn configuration_size(&self) -> usize {
        let function = if self.notifications {
            FUNCTION_SIZE + NOTIFICATION_ENDPOINT_SIZE
        } else {
            FUNCTION_SIZE
        };
        CONFIGURATION_HEADER_SIZE + self.channels * function
    }
}

/// Writes descriptors into a byte buffer.
struct Writer<'b> {
    buf: &'b mut [u8],
    position: usize,
}

impl<'b> Writer<'b> {
    fn new(buf: &'b mut [u8]) -> Self {
        Writer { buf, position: 0 }
    }

    /// Write one descriptor. `bLength` and `bDescriptorType` are prepended.
    fn write(&mut self, descriptor_type: u8, body: &[u8]) -> Result<(), Error> {
        let length = body.len() + 2;
        let end = self.position + length;
        if end > self.buf.len() || length > usize::from(u8::MAX) {
            return Err(Error::BufferOverflow);
        }
        self.buf[self.position] = length as u8;
        self.buf[self.position + 1] = descriptor_type;
        self.buf[self.position + 2..end].copy_from_slice(body);
        self.position = end;
        Ok(())
    }

    fn endpoint(&mut self, address: u8, attributes: u8, size: u16, interval: u8) -> Result<(), Error> {
        let [lo, hi] = size.to_le_bytes();
        self.write(kind::ENDPOINT, &[address, attributes, lo, hi, interval])
    }

    fn finish(self) -> usize {
        self.position
    }
}

fn string_index(string: Option<&str>, index: u8) -> u8 {
    if string.is_some() {
        index
    } else {
        0
    }
}

/// Write the device descriptor.
pub fn device(config: &Config, buf: &mut [u8]) -> Result<usize, Error> {
    let [vid_lo, vid_hi] = config.vendor_id.to_le_bytes();
    let [pid_lo, pid_hi] = config.product_id.to_le_bytes();
    let [rel_lo, rel_hi] = config.device_release.to_le_bytes();
    let mut writer = Writer::new(buf);
    writer.write(
        kind::DEVICE,
        &[
            0x00,
            0x02, // USB 2.0
            0xEF, // Miscellaneous
            0x02, // Common class
            0x01, // Interface association
            config.max_packet_size_0,
            vid_lo,
            vid_hi,
            pid_lo,
            pid_hi,
            rel_lo,
            rel_hi,
            string_index(config.manufacturer, string_index::MANUFACTURER),
            string_index(config.product, string_index::PRODUCT),
            string_index(config.serial_number, string_index::SERIAL_NUMBER),
            1,
        ],
    )?;
    debug_assert_eq!(writer.position, DEVICE_SIZE);
    Ok(writer.finish())
}

/// Write the device qualifier descriptor.
pub fn qualifier(config: &Config, buf: &mut [u8]) -> Result<usize, Error> {
    let mut writer = Writer::new(buf);
    writer.write(
        kind::DEVICE_QUALIFIER,
        &[0x00, 0x02, 0xEF, 0x02, 0x01, config.max_packet_size_0, 1, 0],
    )?;
    debug_assert_eq!(writer.position, QUALIFIER_SIZE);
    Ok(writer.finish())
}

/// Write the complete configuration descriptor: the configuration, and
/// every channel's interfaces and endpoints.
pub fn configuration(config: &Config, layout: &Layout, buf: &mut [u8]) -> Result<usize, Error> {
    let total = layout.configuration_size() as u16;
    let [total_lo, total_hi] = total.to_le_bytes();
    let mut writer = Writer::new(buf);
    writer.write(
        kind::CONFIGURATION,
        &[
            total_lo,
            total_hi,
            (2 * layout.channels()) as u8,
            CONFIGURATION_VALUE,
            0,
            CONFIGURATION_ATTRIBUTES,
            config.max_power,
        ],
    )?;

    for channel in 0..layout.channels() {
        let comm = (2 * channel) as u8;
        let data = comm + 1;
        let endpoint = layout.data_endpoint(channel);
        let notification = layout.notification_endpoint(channel);

        writer.write(
            kind::INTERFACE_ASSOCIATION,
            &[comm, 2, USB_CLASS_CDC, CDC_SUBCLASS_ACM, CDC_PROTOCOL_NONE, 0],
        )?;
        writer.write(
            kind::INTERFACE,
            &[
                comm,
                0,
                notification.is_some() as u8,
                USB_CLASS_CDC,
                CDC_SUBCLASS_ACM,
                CDC_PROTOCOL_NONE,
                0,
            ],
        )?;
        writer.write(kind::CS_INTERFACE, &[CDC_TYPE_HEADER, 0x10, 0x01])?;
        writer.write(kind::CS_INTERFACE, &[CDC_TYPE_CALL_MANAGEMENT, 0x00, data])?;
        writer.write(kind::CS_INTERFACE, &[CDC_TYPE_ACM, ACM_CAPABILITIES])?;
        writer.write(kind::CS_INTERFACE, &[CDC_TYPE_UNION, comm, data])?;
        if let Some(notification) = notification {
            writer.endpoint(
                0x80 | notification,
                INTERRUPT,
                NOTIFICATION_PACKET_SIZE,
                NOTIFICATION_INTERVAL,
            )?;
        }
        writer.write(
            kind::INTERFACE,
            &[data, 0, 2, USB_CLASS_CDC_DATA, 0, 0, 0],
        )?;
        writer.endpoint(endpoint, BULK, config.bulk_max_packet_size, 0)?;
        writer.endpoint(0x80 | endpoint, BULK, config.bulk_max_packet_size, 0)?;
    }

    debug_assert_eq!(writer.position, usize::from(total));
    Ok(writer.finish())
}

/// Write string descriptor `index`.
///
/// Index 0 is the language table. Returns `None` for strings that aren't
/// configured.
pub fn string(config: &Config, index: u8, buf: &mut [u8]) -> Option<Result<usize, Error>> {
    let string = match index {
        0 => {
            let [lo, hi] = LANGUAGE_ID.to_le_bytes();
            return Some(Writer::new(buf).write(kind::STRING, &[lo, hi]).map(|()| 4));
        }
        string_index::MANUFACTURER => config.manufacturer?,
        string_index::PRODUCT => config.product?,
        string_index::SERIAL_NUMBER => config.serial_number?,
        _ => return None,
    };

    let length = 2 + 2 * string.encode_utf16().count();
    if length > usize::from(u8::MAX) || length > buf.len() {
        return Some(Err(Error::BufferOverflow));
    }
    buf[0] = length as u8;
    buf[1] = kind::STRING;
    for (unit, dst) in string.encode_utf16().zip(buf[2..length].chunks_exact_mut(2)) {
        dst.copy_from_slice(&unit.to_le_bytes());
    }
    Some(Ok(length))
}
