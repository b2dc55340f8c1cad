//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the two pieces of hardware the monitor
//!     touches: the microphone (through an MCP3208 12-bit ADC on SPI) and the
//!     busy LED (a plain GPIO output).
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal`) and a development machine (using mocks).
//!
//! design philosophy:
//!     - "Compile Anywhere": The host should compile on Windows/Mac/Linux.
//!     - "Zero Cost": On the Pi, this compiles down to direct `rppal` calls.
//!
//! relationships:
//!     - used by: sampler.rs (tight read loop + LED toggling)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use crate::config::HardwareConfig;
use anyhow::Result;

/// Largest value a 12-bit ADC conversion can return
pub const ADC_MAX: u16 = 4095;

pub trait HardwareProvider: Send + Sync {
    /// One conversion on the given ADC channel, 0..=ADC_MAX
    fn read_adc(&self, channel: u8) -> Result<u16>;
    fn set_gpio_mode(&self, pin: u8, mode: &str) -> Result<()>;
    fn write_gpio(&self, pin: u8, level: bool) -> Result<()>;
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub struct Hal {
    noise: std::sync::atomic::AtomicU32,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new(_config: &HardwareConfig) -> Result<Self> {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Ok(Self { noise: std::sync::atomic::AtomicU32::new(0x2545_F491) })
    }
}

#[cfg(not(feature = "hardware"))]
impl HardwareProvider for Hal {
    fn read_adc(&self, _channel: u8) -> Result<u16> {
        use std::sync::atomic::Ordering;
        // xorshift32 around a quiet-room baseline
        let mut x = self.noise.load(Ordering::Relaxed);
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise.store(x, Ordering::Relaxed);
        Ok(1600 + (x % 800) as u16)
    }

    fn set_gpio_mode(&self, pin: u8, mode: &str) -> Result<()> {
        tracing::debug!("[MOCK GPIO] Pin {} set to {}", pin, mode);
        Ok(())
    }

    fn write_gpio(&self, pin: u8, level: bool) -> Result<()> {
        tracing::debug!("[MOCK GPIO] Pin {} write {}", pin, level);
        Ok(())
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct Hal {
    spi: std::sync::Mutex<rppal::spi::Spi>,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new(config: &HardwareConfig) -> Result<Self> {
        use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
        tracing::info!("Using REAL HARDWARE HAL (rppal)");
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, config.spi_clock_hz, Mode::Mode0)?;
        Ok(Self { spi: std::sync::Mutex::new(spi) })
    }
}

#[cfg(feature = "hardware")]
impl HardwareProvider for Hal {
    fn read_adc(&self, channel: u8) -> Result<u16> {
        // MCP3208 single-ended: start bit, SGL, D2..D0 spread over two bytes
        let write = [0x06 | ((channel & 0x07) >> 2), (channel & 0x03) << 6, 0x00];
        let mut read = [0u8; 3];
        let spi = self.spi.lock().map_err(|_| anyhow::anyhow!("SPI bus lock poisoned"))?;
        spi.transfer(&mut read, &write)?;
        Ok((((read[1] & 0x0F) as u16) << 8) | read[2] as u16)
    }

    fn set_gpio_mode(&self, pin: u8, mode: &str) -> Result<()> {
        use rppal::gpio::Gpio;
        let gpio = Gpio::new()?;
        match mode {
            "output" => {
                let mut p = gpio.get(pin)?.into_output();
                p.set_reset_on_drop(false);
            }
            _ => {
                let mut p = gpio.get(pin)?.into_input();
                p.set_reset_on_drop(false);
            }
        }
        Ok(())
    }

    fn write_gpio(&self, pin: u8, level: bool) -> Result<()> {
        use rppal::gpio::Gpio;
        let gpio = Gpio::new()?;
        let mut p = gpio.get(pin)?.into_output();
        // keep the level after the handle is dropped
        p.set_reset_on_drop(false);
        if level { p.set_high(); } else { p.set_low(); }
        Ok(())
    }
}
