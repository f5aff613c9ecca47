//! A USB full-speed device driver for STM32 USB FS peripherals, exposing
//! one or more CDC-ACM serial channels
//!
//! `usbfs-cdc` drives the "USB FS device" block found on STM32 F0, F1, F3,
//! L0, L4 and G4 parts. It enumerates as a composite device with one
//! CDC-ACM function per channel, and moves bytes between each channel's
//! bulk endpoints and a pair of ring buffers.
//!
//! To interface the library, you must define a safe implementation of
//! [`Peripherals`], and build a [`Stm32Usb`] from it. Then, describe the
//! device with a [`Config`], and create a [`Driver`].
//!
//! ```no_run
//! use usbfs_cdc::{Config, Driver, Peripherals, Stm32Usb};
//!
//! struct Usb;
//!
//! unsafe impl Peripherals for Usb {
//!     fn usb(&self) -> *const () {
//!         0x4000_5C00 as _
//!     }
//!     fn pma(&self) -> *const () {
//!         0x4000_6000 as _
//!     }
//! }
//!
//! const CONFIG: Config = Config::new(0x1209, 0x0001).product("Two ports");
//!
//! let mut device: Driver<_, 2> = Driver::new(Stm32Usb::new(Usb), CONFIG).unwrap();
//! device.enable();
//! loop {
//!     // Typically in the USB interrupt handler.
//!     device.poll();
//!     # let now_ms = 0;
//!     device.service(now_ms);
//!     if device.channel_ready(1) {
//!         let _ = device.send_line(1, "hello");
//!     }
//! }
//! ```
//!
//! The driver never blocks. When the interrupt handler and the main loop
//! both need the driver, wrap it in a [`SharedDevice`].

#![no_std]

#[cfg(test)]
extern crate std;

#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

pub mod acm;
pub mod buffer;
pub mod descriptor;
pub mod epr;
pub mod ring;
pub mod timeout;

mod bulk;
mod bus;
mod channel;
mod config;
mod control;
mod driver;
mod endpoint;
mod error;
mod peripheral;
mod pma;
mod ral;
mod stm32;

#[cfg(test)]
mod sim;

pub use bus::SharedDevice;
pub use config::Config;
pub use control::Stage;
pub use driver::Driver;
pub use error::Error;
pub use peripheral::{Istr, UsbPeripheral};
pub use stm32::Stm32Usb;

/// A type that owns the USB FS register block and its packet memory
///
/// # Safety
///
/// `Peripherals` should only be implemented on a type that owns the USB
/// register block and the packet memory. The pointers returned by the
/// methods are assumed to be valid, and will be cast to a register
/// definition and to packet memory.
///
/// # Example
///
/// A safe implementation of `Peripherals` on top of a PAC. Assume that
/// `pac` is the device crate for your part.
///
/// ```
/// # mod pac {
/// #   pub struct USB; impl USB { pub const PTR: *const u32 = 0x4000_5C00 as _; }
/// #   pub const USB_PMA: usize = 0x4000_6000;
/// #   pub struct Peripherals { pub USB: USB }
/// #   impl Peripherals { pub fn take() -> Option<Self> { Some(Peripherals { USB: USB }) } }
/// # }
/// use usbfs_cdc::Peripherals;
///
/// struct Usb {
///     _usb: pac::USB,
/// }
///
/// unsafe impl Peripherals for Usb {
///     fn usb(&self) -> *const () {
///         pac::USB::PTR.cast()
///     }
///     fn pma(&self) -> *const () {
///         pac::USB_PMA as _
///     }
/// }
///
/// let peripherals = pac::Peripherals::take().unwrap();
/// let usb = Usb { _usb: peripherals.USB };
/// assert_eq!(usb.usb(), 0x4000_5C00 as *const ());
/// ```
pub unsafe trait Peripherals {
    /// Returns the address of the USB registers
    fn usb(&self) -> *const ();
    /// Returns the address of the packet memory, as the CPU sees it
    fn pma(&self) -> *const ();
}
