#![no_std]

pub mod dither;
pub mod driver;
pub mod encoder;
pub mod fixed;
pub mod shared;

pub use dither::{DitherClock, MAX_DITHER_DEPTH};
pub use driver::{
    ConfigError, DriverState, MAX_SUPPORTED_LEDS, RESET_PULSE, StripDriver,
};
pub use encoder::ColorOrder;
pub use fixed::{Angle, Fixed};
pub use shared::SharedStrip;

pub use embassy_time::Duration;

/// RGB color as staged by the application, before wire reordering.
pub type Rgb = smart_leds::RGB8;

/// Abstract transfer peripheral trait
///
/// Implement this over your DMA + serial peripheral to support different
/// hardware platforms. The driver is generic over this trait and never
/// touches registers itself.
pub trait Transport {
    /// Begin moving `buffer` out to the strip and return immediately.
    ///
    /// The driver guarantees `buffer` stays untouched until the peripheral
    /// signals completion, so an implementation may hold the pointer for the
    /// duration of the transfer. Route the completion interrupt to
    /// [`SharedStrip::on_transfer_complete`] (or call
    /// [`StripDriver::handle_transfer_complete`] directly) to keep the strip
    /// refreshing.
    fn start_transfer(&mut self, buffer: &[u8]);

    /// Non-blocking poll of the transfer status.
    fn is_busy(&self) -> bool;
}
