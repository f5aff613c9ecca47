//! Sharing the driver between the USB interrupt and the main loop

use crate::{
    acm::{ChannelHandler, LineCoding},
    peripheral::UsbPeripheral,
    timeout::{self, Clock, Deadline},
    Config, Driver, Error,
};
use core::{cell::RefCell, ops::ControlFlow};
use cortex_m::interrupt::{self, Mutex};
use usb_device::device::UsbDeviceState;

/// A [`Driver`] that both the USB interrupt handler and the application
/// can reach
///
/// Every method runs in a critical section. Place the device in a
/// `static`, call [`on_interrupt()`](SharedDevice::on_interrupt) from the
/// USB interrupt handler, and use the channel methods anywhere else.
pub struct SharedDevice<'a, P, const N: usize, const RX: usize = 256, const TX: usize = 256> {
    driver: Mutex<RefCell<Driver<'a, P, N, RX, TX>>>,
}

impl<'a, P: UsbPeripheral, const N: usize, const RX: usize, const TX: usize> SharedDevice<'a, P, N, RX, TX> {
    /// Wrap a driver.
    ///
    /// Register channel handlers before wrapping the driver.
    pub fn new(driver: Driver<'a, P, N, RX, TX>) -> Self {
        SharedDevice {
            driver: Mutex::new(RefCell::new(driver)),
        }
    }

    /// Create the driver, and wrap it.
    pub fn with_config(usb: P, config: Config<'a>) -> Result<Self, Error> {
        Driver::new(usb, config).map(Self::new)
    }

    /// Interrupt-safe, immutable access to the driver
    fn with_driver<R>(&self, func: impl FnOnce(&Driver<'a, P, N, RX, TX>) -> R) -> R {
        interrupt::free(|cs| {
            let driver = self.driver.borrow(cs);
            let driver = driver.borrow();
            func(&driver)
        })
    }

    /// Interrupt-safe, mutable access to the driver
    pub fn with_driver_mut<R>(&self, func: impl FnOnce(&mut Driver<'a, P, N, RX, TX>) -> R) -> R {
        interrupt::free(|cs| {
            let driver = self.driver.borrow(cs);
            let mut driver = driver.borrow_mut();
            func(&mut driver)
        })
    }

    /// Register the handler that observes `channel`.
    pub fn set_handler(&self, channel: usize, handler: &'a mut (dyn ChannelHandler + Send)) -> Result<(), Error> {
        self.with_driver_mut(|driver| driver.set_handler(channel, handler))
    }

    /// Enable the peripheral. See [`Driver::enable()`].
    pub fn enable(&self) {
        self.with_driver_mut(|driver| driver.enable());
    }

    /// Call from the USB interrupt handler.
    pub fn on_interrupt(&self) {
        self.with_driver_mut(|driver| driver.poll());
    }

    /// See [`Driver::service()`].
    pub fn service(&self, now: u32) -> usize {
        self.with_driver_mut(|driver| driver.service(now))
    }

    /// See [`Driver::send()`].
    pub fn send(&self, channel: usize, bytes: &[u8]) -> Result<usize, Error> {
        self.with_driver_mut(|driver| driver.send(channel, bytes))
    }

    /// See [`Driver::send_line()`].
    pub fn send_line(&self, channel: usize, text: &str) -> Result<usize, Error> {
        self.with_driver_mut(|driver| driver.send_line(channel, text))
    }

    /// See [`Driver::receive()`].
    pub fn receive(&self, channel: usize, buf: &mut [u8]) -> Result<usize, Error> {
        self.with_driver_mut(|driver| driver.receive(channel, buf))
    }

    /// See [`Driver::receive_line()`].
    pub fn receive_line(&self, channel: usize, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        self.with_driver_mut(|driver| driver.receive_line(channel, buf))
    }

    /// See [`Driver::discard_input()`].
    pub fn discard_input(&self, channel: usize) -> Result<(), Error> {
        self.with_driver_mut(|driver| driver.discard_input(channel))
    }

    pub fn channel_ready(&self, channel: usize) -> bool {
        self.with_driver(|driver| driver.channel_ready(channel))
    }

    pub fn line_coding(&self, channel: usize) -> Option<LineCoding> {
        self.with_driver(|driver| driver.line_coding(channel))
    }

    pub fn state(&self) -> UsbDeviceState {
        self.with_driver(|driver| driver.state())
    }

    /// Wait until the host takes every queued byte on `channel`.
    ///
    /// `yield_now` runs between checks, outside of the critical section.
    /// Returns [`Error::Timeout`] if `timeout` ticks of `clock` pass first,
    /// and [`Error::NotReady`] if the channel disconnects while waiting.
    pub fn flush(
        &self,
        channel: usize,
        clock: &impl Clock,
        timeout: u32,
        yield_now: impl FnMut() -> ControlFlow<()>,
    ) -> Result<(), Error> {
        let deadline = Deadline::after(clock.now(), timeout);
        let mut disconnected = false;
        timeout::poll_until(
            clock,
            deadline,
            || {
                self.with_driver(|driver| {
                    disconnected = !driver.channel_ready(channel);
                    disconnected || driver.is_flushed(channel)
                })
            },
            yield_now,
        )?;
        if disconnected {
            Err(Error::NotReady)
        } else {
            Ok(())
        }
    }
}
