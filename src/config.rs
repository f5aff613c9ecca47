//! Device configuration

use crate::acm::BreakPolicy;

/// Device identity and driver tuning
///
/// Build one with [`new()`](Config::new) and the builder methods, then hand
/// it to [`Driver::new()`](crate::Driver::new). All methods are `const`, so
/// a configuration can live in a `static`.
///
/// ```
/// use usbfs_cdc::Config;
///
/// const CONFIG: Config = Config::new(0x1209, 0x0001)
///     .manufacturer("Acme")
///     .product("Motor controller")
///     .serial_number("0001")
///     .disconnect_timeout(250);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config<'a> {
    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
    pub(crate) device_release: u16,
    pub(crate) manufacturer: Option<&'a str>,
    pub(crate) product: Option<&'a str>,
    pub(crate) serial_number: Option<&'a str>,
    pub(crate) max_power: u8,
    pub(crate) max_packet_size_0: u8,
    pub(crate) bulk_max_packet_size: u16,
    pub(crate) disconnect_timeout: u32,
    pub(crate) transmit_timeout: u32,
    pub(crate) break_policy: BreakPolicy,
    pub(crate) notifications: bool,
}

impl<'a> Config<'a> {
    /// A configuration for the given vendor and product IDs.
    ///
    /// Defaults: release 1.00, no strings, 100 mA bus power, 64-byte
    /// packets, 500 ms disconnect timeout, 1 s transmit timeout, breaks
    /// treated as disconnects, no notification endpoints.
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Config {
            vendor_id,
            product_id,
            device_release: 0x0100,
            manufacturer: None,
            product: None,
            serial_number: None,
            max_power: 50,
            max_packet_size_0: 64,
            bulk_max_packet_size: 64,
            disconnect_timeout: 500,
            transmit_timeout: 1000,
            break_policy: BreakPolicy::Disconnect,
            notifications: false,
        }
    }

    /// Device release number, in BCD.
    pub const fn device_release(mut self, release: u16) -> Self {
        self.device_release = release;
        self
    }

    pub const fn manufacturer(mut self, manufacturer: &'a str) -> Self {
        self.manufacturer = Some(manufacturer);
        self
    }

    pub const fn product(mut self, product: &'a str) -> Self {
        self.product = Some(product);
        self
    }

    pub const fn serial_number(mut self, serial_number: &'a str) -> Self {
        self.serial_number = Some(serial_number);
        self
    }

    /// Maximum bus current, in milliamps.
    ///
    /// # Panics
    ///
    /// Panics if `max_power_ma` exceeds 500.
    pub const fn max_power(mut self, max_power_ma: u16) -> Self {
        assert!(max_power_ma <= 500, "USB bus power is limited to 500 mA");
        self.max_power = (max_power_ma / 2) as u8;
        self
    }

    /// Maximum packet size for the control endpoint.
    ///
    /// # Panics
    ///
    /// Panics if `size` isn't 8, 16, 32 or 64.
    pub const fn max_packet_size_0(mut self, size: u8) -> Self {
        assert!(
            matches!(size, 8 | 16 | 32 | 64),
            "Invalid control endpoint packet size"
        );
        self.max_packet_size_0 = size;
        self
    }

    /// Maximum packet size for the bulk data endpoints.
    ///
    /// # Panics
    ///
    /// Panics if `size` isn't 8, 16, 32 or 64.
    pub const fn bulk_max_packet_size(mut self, size: u16) -> Self {
        assert!(
            matches!(size, 8 | 16 | 32 | 64),
            "Invalid bulk endpoint packet size"
        );
        self.bulk_max_packet_size = size;
        self
    }

    /// How long DTR may stay low before a channel is forced not-ready, in
    /// milliseconds.
    pub const fn disconnect_timeout(mut self, millis: u32) -> Self {
        self.disconnect_timeout = millis;
        self
    }

    /// How long queued data may sit on an IN endpoint the host never polls,
    /// in milliseconds. After that, the channel is forced not-ready.
    pub const fn transmit_timeout(mut self, millis: u32) -> Self {
        self.transmit_timeout = millis;
        self
    }

    pub const fn break_policy(mut self, policy: BreakPolicy) -> Self {
        self.break_policy = policy;
        self
    }

    /// Give each channel an interrupt notification endpoint.
    ///
    /// Some hosts insist on one. It halves the number of channels that fit
    /// in the eight endpoints.
    pub const fn notifications(mut self, enable: bool) -> Self {
        self.notifications = enable;
        self
    }
}
