//! Foreground/interrupt sharing of a strip driver.
//!
//! The completion interrupt and the main loop both need the driver; wrapping
//! it in a `critical-section` mutex serializes every entry point without a
//! global mutable singleton.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::{StripDriver, Transport};

/// Interrupt-safe owner of a [`StripDriver`].
///
/// Place one in a `static`, install the driver at startup with
/// [`SharedStrip::init`], stage colors from the main loop through
/// [`SharedStrip::with`], and call [`SharedStrip::on_transfer_complete`]
/// from the transfer-complete interrupt handler.
pub struct SharedStrip<T: Transport> {
    inner: Mutex<RefCell<Option<StripDriver<T>>>>,
}

impl<T: Transport> SharedStrip<T> {
    /// Create an empty slot, usable in `static` initializers.
    pub const fn new() -> SharedStrip<T> {
        SharedStrip {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the driver, replacing any previous one.
    pub fn init(&self, driver: StripDriver<T>) {
        critical_section::with(|cs| {
            self.inner.borrow(cs).replace(Some(driver));
        });
    }

    /// Run `f` against the driver under a critical section.
    ///
    /// Returns `None` when no driver has been installed.
    pub fn with<R>(&self, f: impl FnOnce(&mut StripDriver<T>) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().as_mut().map(f))
    }

    /// Completion-interrupt entry point; chains the next transfer.
    pub fn on_transfer_complete(&self) {
        self.with(StripDriver::handle_transfer_complete);
    }
}

impl<T: Transport> Default for SharedStrip<T> {
    fn default() -> SharedStrip<T> {
        SharedStrip::new()
    }
}
