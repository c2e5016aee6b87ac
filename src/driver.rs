//! Encoded frame ownership and the transfer state machine.
//!
//! [`StripDriver`] stages per-LED color targets, keeps one encoded frame per
//! dither slot plus a shared reset frame, and chains transfers through an
//! abstract [`Transport`]: every completion interrupt flips between sending
//! colors and sending the inter-frame reset pulse until [`StripDriver::stop`]
//! is called.

use core::fmt;

use embassy_time::Duration;
use heapless::Vec;

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::Rgb;
use crate::Transport;
use crate::dither::{self, DitherClock, MAX_DITHER_DEPTH};
use crate::encoder::{self, BYTES_PER_LED, ColorOrder, SPI_CLOCK_HZ};

/// Largest strip the driver will accept.
pub const MAX_SUPPORTED_LEDS: usize = 300;

const RESET_PULSE_MICROS: u64 = 300;

/// Minimum idle time the strip needs between frames to latch.
pub const RESET_PULSE: Duration = Duration::from_micros(RESET_PULSE_MICROS);

/// Reset frame length in transport bytes, covering [`RESET_PULSE`] at
/// [`SPI_CLOCK_HZ`].
pub const RESET_FRAME_LEN: usize =
    (SPI_CLOCK_HZ as u64 / 8 * RESET_PULSE_MICROS / 1_000_000) as usize;

/// The all-zero reset frame. A transport backed by a non-incrementing DMA
/// source may repeat its first byte instead of walking it.
static RESET_FRAME: [u8; RESET_FRAME_LEN] = [0; RESET_FRAME_LEN];

const MAX_FRAME_SLOTS: usize = MAX_DITHER_DEPTH as usize;
const ENCODED_FRAME_CAP: usize = MAX_SUPPORTED_LEDS * BYTES_PER_LED;
const DIRTY_WORDS: usize = MAX_SUPPORTED_LEDS.div_ceil(32);

type EncodedFrame = Vec<u8, ENCODED_FRAME_CAP>;

/// Transfer chaining state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Not started, or stopped. Nothing is chained.
    Idle,
    /// The active dither frame is on the wire.
    SendingColors,
    /// The inter-frame reset pulse is on the wire.
    SendingReset,
}

/// Errors detected while configuring the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Requested strip length exceeds [`MAX_SUPPORTED_LEDS`].
    TooManyLeds { requested: usize, max: usize },
    /// Requested dither depth exceeds [`MAX_DITHER_DEPTH`].
    DepthOutOfRange { requested: u8, max: u8 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TooManyLeds { requested, max } => {
                write!(f, "strip length {} exceeds the supported {}", requested, max)
            }
            ConfigError::DepthOutOfRange { requested, max } => {
                write!(f, "dither depth {} exceeds the supported {}", requested, max)
            }
        }
    }
}

/// LEDs whose encode into the in-flight frame is deferred.
#[derive(Debug)]
struct StaleMask {
    words: [u32; DIRTY_WORDS],
    any: bool,
}

impl StaleMask {
    const fn new() -> StaleMask {
        StaleMask {
            words: [0; DIRTY_WORDS],
            any: false,
        }
    }

    fn mark(&mut self, index: usize) {
        self.words[index / 32] |= 1 << (index % 32);
        self.any = true;
    }
}

/// WS2812 strip driver with temporal dithering.
///
/// Owns the staged colors, `max(depth, 1)` encoded frames and the transfer
/// state machine. Share one between the main loop and the completion
/// interrupt through [`crate::SharedStrip`].
pub struct StripDriver<T: Transport> {
    transport: T,
    num_leds: usize,
    order: ColorOrder,
    clock: DitherClock,
    /// Integer baseline per LED.
    base: Vec<Rgb, MAX_SUPPORTED_LEDS>,
    /// Dither remainder bits per LED, one field per channel.
    remainder: Vec<Rgb, MAX_SUPPORTED_LEDS>,
    frames: Vec<EncodedFrame, MAX_FRAME_SLOTS>,
    state: DriverState,
    /// Frame slot currently owned by the transport, if any.
    in_flight: Option<usize>,
    stale: StaleMask,
}

impl<T: Transport> StripDriver<T> {
    /// Create a driver for `num_leds` LEDs at the given dither depth.
    ///
    /// All LEDs start encoded as off. Fails when the configuration exceeds
    /// the supported limits.
    pub fn new(transport: T, num_leds: usize, depth: u8) -> Result<StripDriver<T>, ConfigError> {
        if num_leds > MAX_SUPPORTED_LEDS {
            return Err(ConfigError::TooManyLeds {
                requested: num_leds,
                max: MAX_SUPPORTED_LEDS,
            });
        }
        if depth > MAX_DITHER_DEPTH {
            return Err(ConfigError::DepthOutOfRange {
                requested: depth,
                max: MAX_DITHER_DEPTH,
            });
        }

        let clock = DitherClock::new(depth);
        let mut driver = StripDriver {
            transport,
            num_leds,
            order: ColorOrder::default(),
            clock,
            base: Vec::new(),
            remainder: Vec::new(),
            frames: Vec::new(),
            state: DriverState::Idle,
            in_flight: None,
            stale: StaleMask::new(),
        };

        // Capacities were validated above.
        driver.base.resize_default(num_leds).ok();
        driver.remainder.resize_default(num_leds).ok();
        for _ in 0..clock.slot_count() {
            let mut frame = EncodedFrame::new();
            frame.resize_default(num_leds * BYTES_PER_LED).ok();
            driver.frames.push(frame).ok();
        }
        // Zeroed frames are not valid pulse trains yet; encode the off state.
        for index in 0..num_leds {
            driver.encode_all_slots(index);
        }

        #[cfg(feature = "esp32-log")]
        println!("ws2812: {} leds, dither depth {}", num_leds, depth);

        Ok(driver)
    }

    /// Select the wire channel order (default GRB) and re-encode.
    #[must_use]
    pub fn with_color_order(mut self, order: ColorOrder) -> StripDriver<T> {
        self.order = order;
        for index in 0..self.num_leds {
            self.encode_all_slots(index);
        }
        self
    }

    /// Stage an 8-bit color. An out-of-range index is ignored by design,
    /// since animation code commonly runs past the strip end.
    pub fn set_led(&mut self, index: usize, r: u8, g: u8, b: u8) {
        self.set_split(index, [(r, 0), (g, 0), (b, 0)]);
    }

    /// Stage a color from 16-bit channel numerators over 65535.
    ///
    /// This is the bit-reproducible high-resolution entry point; the extra
    /// bits below the strip's native 8 are shown by temporal dithering.
    pub fn set_led_u16(&mut self, index: usize, r: u16, g: u16, b: u16) {
        let depth = self.clock.depth();
        self.set_split(
            index,
            [
                dither::split_u16(r, depth),
                dither::split_u16(g, depth),
                dither::split_u16(b, depth),
            ],
        );
    }

    /// Stage a color from unit-interval floats, clamped to `[0.0, 1.0]`.
    pub fn set_led_f32(&mut self, index: usize, r: f32, g: f32, b: f32) {
        let depth = self.clock.depth();
        self.set_split(
            index,
            [
                dither::split_unit(r, depth),
                dither::split_unit(g, depth),
                dither::split_unit(b, depth),
            ],
        );
    }

    /// Turn every LED off.
    pub fn clear(&mut self) {
        for index in 0..self.num_leds {
            self.set_led(index, 0, 0, 0);
        }
    }

    /// Begin continuous refresh with the mandatory leading reset pulse.
    ///
    /// No-op unless the driver is idle. After a [`StripDriver::stop`], wait
    /// for [`StripDriver::busy`] to clear before restarting so the drained
    /// transfer is not overlapped.
    pub fn start(&mut self) {
        if self.state != DriverState::Idle {
            return;
        }
        self.release_in_flight();
        self.state = DriverState::SendingReset;

        #[cfg(feature = "esp32-log")]
        println!("ws2812: start");

        self.transport.start_transfer(&RESET_FRAME);
    }

    /// Stop refreshing. The running transfer drains but is not rechained;
    /// the stop takes effect when its completion interrupt fires.
    pub fn stop(&mut self) {
        self.state = DriverState::Idle;

        #[cfg(feature = "esp32-log")]
        println!("ws2812: stop");
    }

    /// Route the transport's transfer-complete interrupt here.
    ///
    /// Releases the finished frame (applying any writes deferred while the
    /// transport owned it), then chains the next transfer: the dither frame
    /// after a reset pulse, a reset pulse after a dither frame, nothing once
    /// stopped.
    pub fn handle_transfer_complete(&mut self) {
        self.release_in_flight();
        match self.state {
            DriverState::Idle => {}
            DriverState::SendingReset => {
                let slot = self.clock.active_index();
                self.state = DriverState::SendingColors;
                self.in_flight = Some(slot);
                self.transport.start_transfer(&self.frames[slot]);
            }
            DriverState::SendingColors => {
                self.clock.advance();
                self.state = DriverState::SendingReset;
                self.transport.start_transfer(&RESET_FRAME);
            }
        }
    }

    /// Non-blocking poll of the transport's transfer status.
    pub fn busy(&self) -> bool {
        self.transport.is_busy()
    }

    pub fn num_leds(&self) -> usize {
        self.num_leds
    }

    pub fn depth(&self) -> u8 {
        self.clock.depth()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn color_order(&self) -> ColorOrder {
        self.order
    }

    /// Staged baseline color of an LED.
    pub fn color_at(&self, index: usize) -> Option<Rgb> {
        self.base.get(index).copied()
    }

    /// Encoded frame for a dither slot, for host-side inspection.
    pub fn encoded_frame(&self, slot: usize) -> Option<&[u8]> {
        self.frames.get(slot).map(Vec::as_slice)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn set_split(&mut self, index: usize, channels: [(u8, u8); 3]) {
        if index >= self.num_leds {
            return;
        }
        self.base[index] = Rgb {
            r: channels[0].0,
            g: channels[1].0,
            b: channels[2].0,
        };
        self.remainder[index] = Rgb {
            r: channels[0].1,
            g: channels[1].1,
            b: channels[2].1,
        };
        self.encode_all_slots(index);
    }

    /// Re-encode one LED into every frame slot the transport does not own.
    /// The owned slot is marked stale and caught up on release, so a running
    /// transfer never reads a half-written frame.
    fn encode_all_slots(&mut self, index: usize) {
        for slot in 0..self.frames.len() {
            if self.in_flight == Some(slot) {
                self.stale.mark(index);
            } else {
                self.encode_slot(index, slot);
            }
        }
    }

    fn encode_slot(&mut self, index: usize, slot: usize) {
        let base = self.base[index];
        let remainder = self.remainder[index];
        #[allow(clippy::cast_possible_truncation)]
        let bit = slot as u8;
        let color = Rgb {
            r: dither::slot_value(base.r, remainder.r, bit),
            g: dither::slot_value(base.g, remainder.g, bit),
            b: dither::slot_value(base.b, remainder.b, bit),
        };
        let offset = index * BYTES_PER_LED;
        encoder::encode_color(
            color,
            self.order,
            &mut self.frames[slot][offset..offset + BYTES_PER_LED],
        );
    }

    fn release_in_flight(&mut self) {
        let Some(slot) = self.in_flight.take() else {
            return;
        };
        if !self.stale.any {
            return;
        }
        let words = self.stale.words;
        self.stale = StaleMask::new();
        for (word_index, mut word) in words.into_iter().enumerate() {
            while word != 0 {
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                let index = word_index * 32 + bit;
                if index < self.num_leds {
                    self.encode_slot(index, slot);
                }
            }
        }
    }
}
