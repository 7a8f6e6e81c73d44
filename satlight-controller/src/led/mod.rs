//! LED strip output.
//!
//! The render loop builds one [`Frame`] per tick and hands it to a
//! [`LedDriver`]. Drivers own whatever hardware handle they need; the
//! rest of the controller never touches pixels directly.

use serde::{Deserialize, Serialize};
use smart_leds::{RGB8, SmartLedsWrite, brightness};

use crate::error::LedError;

#[cfg(feature = "spi")]
mod spi;
#[cfg(feature = "spi")]
pub use spi::open_spi_driver;

pub const OFF: RGB8 = RGB8::new(0, 0, 0);

/// Full-strip color buffer, satellite-major: satellite `i` owns
/// LEDs `[i * leds_per_satellite, (i + 1) * leds_per_satellite)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pixels: Vec<RGB8>,
}

impl Frame {
    pub fn blank(len: usize) -> Self {
        Self {
            pixels: vec![OFF; len],
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[RGB8] {
        &self.pixels
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|p| *p == OFF)
    }

    /// Paint every LED belonging to `satellite`. Out-of-range LEDs are ignored.
    pub fn fill_satellite(&mut self, satellite: usize, leds_per_satellite: usize, color: RGB8) {
        let start = satellite * leds_per_satellite;
        let end = (start + leds_per_satellite).min(self.pixels.len());
        if start < end {
            self.pixels[start..end].fill(color);
        }
    }
}

/// Channel order the strip expects on the wire. WS2812 parts are GRB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorOrder {
    #[default]
    Grb,
    Rgb,
}

impl ColorOrder {
    /// Remap `color` so that a GRB-native driver lights the intended color.
    pub fn apply(&self, color: RGB8) -> RGB8 {
        match self {
            ColorOrder::Grb => color,
            ColorOrder::Rgb => RGB8::new(color.g, color.r, color.b),
        }
    }
}

/// Which driver the binary should construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Log frames instead of driving hardware
    #[default]
    Log,
    /// WS2812 strip on a Linux SPI bus (`spi` feature)
    Spi,
    /// Render without any output
    #[serde(rename = "none")]
    Disabled,
}

/// Sink for rendered frames.
pub trait LedDriver: Send {
    /// Push a whole frame to the strip.
    fn show(&mut self, frame: &Frame) -> Result<(), LedError>;

    /// Turn every LED off.
    fn blank(&mut self, len: usize) -> Result<(), LedError> {
        self.show(&Frame::blank(len))
    }
}

/// Discards every frame.
#[derive(Debug, Default)]
pub struct NullDriver;

impl LedDriver for NullDriver {
    fn show(&mut self, _frame: &Frame) -> Result<(), LedError> {
        Ok(())
    }
}

/// Debug-logs frames when they change. Useful without a strip attached.
#[derive(Debug, Default)]
pub struct LogDriver {
    last: Option<Frame>,
}

impl LedDriver for LogDriver {
    fn show(&mut self, frame: &Frame) -> Result<(), LedError> {
        if self.last.as_ref() != Some(frame) {
            let hex: Vec<String> = frame
                .pixels()
                .iter()
                .map(|p| format!("{:02x}{:02x}{:02x}", p.r, p.g, p.b))
                .collect();
            tracing::debug!("Frame ({} LEDs): {}", frame.len(), hex.join(" "));
            self.last = Some(frame.clone());
        }
        Ok(())
    }
}

/// Adapter for any `smart_leds` writer, applying global brightness and channel order.
pub struct SmartLedsDriver<W> {
    writer: W,
    brightness: u8,
    order: ColorOrder,
}

impl<W> SmartLedsDriver<W>
where
    W: SmartLedsWrite<Color = RGB8> + Send,
    W::Error: std::fmt::Debug,
{
    pub fn new(writer: W, brightness: u8, order: ColorOrder) -> Self {
        Self {
            writer,
            brightness,
            order,
        }
    }
}

impl<W> LedDriver for SmartLedsDriver<W>
where
    W: SmartLedsWrite<Color = RGB8> + Send,
    W::Error: std::fmt::Debug,
{
    fn show(&mut self, frame: &Frame) -> Result<(), LedError> {
        let order = self.order;
        let pixels = frame.pixels().iter().map(|p| order.apply(*p));
        self.writer
            .write(brightness(pixels, self.brightness))
            .map_err(|e| LedError::Write(format!("{:?}", e)))
    }
}

/// Build the driver named by `kind`.
pub fn build_driver(
    kind: DriverKind,
    spi_device: &str,
    brightness: u8,
    order: ColorOrder,
) -> anyhow::Result<Box<dyn LedDriver>> {
    match kind {
        DriverKind::Log => Ok(Box::new(LogDriver::default())),
        DriverKind::Disabled => Ok(Box::new(NullDriver)),
        #[cfg(feature = "spi")]
        DriverKind::Spi => open_spi_driver(spi_device, brightness, order),
        #[cfg(not(feature = "spi"))]
        DriverKind::Spi => {
            let _ = (spi_device, brightness, order);
            anyhow::bail!("LED driver 'spi' requested but the controller was built without the `spi` feature")
        }
    }
}
