use anyhow::{Context, Result, anyhow};
use linux_embedded_hal::SpidevBus;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use ws2812_spi::Ws2812;

use super::{ColorOrder, LedDriver, SmartLedsDriver};

/// WS2812 timing needs an SPI clock between 2 and 3.8 MHz.
const SPI_SPEED_HZ: u32 = 3_800_000;

/// Open a WS2812 strip wired to the MOSI pin of `device`.
pub fn open_spi_driver(device: &str, brightness: u8, order: ColorOrder) -> Result<Box<dyn LedDriver>> {
    let mut bus = SpidevBus::open(device)
        .map_err(|e| anyhow!("{:?}", e))
        .context(format!("Failed to open SPI device {}", device))?;

    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(SPI_SPEED_HZ)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    bus.configure(&options)
        .map_err(|e| anyhow!("{:?}", e))
        .context(format!("Failed to configure SPI device {}", device))?;

    tracing::info!("Driving WS2812 strip on {} at {} Hz", device, SPI_SPEED_HZ);
    Ok(Box::new(SmartLedsDriver::new(Ws2812::new(bus), brightness, order)))
}
