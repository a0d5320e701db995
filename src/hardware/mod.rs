// src/hardware/mod.rs
pub mod frontpanel;
pub mod gpio;
pub mod i2c;
pub mod motor;

pub use i2c::{I2cPort, NullPort, RecordingPort};
pub use motor::{Motor, MotorCommand};

use thiserror::Error;

/// Whole-byte status both boards use to report a fault on their interrupt
/// line.
pub const ERROR_STATUS: u8 = 0xFF;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("I2C bus error: {0}")]
    I2c(#[from] rppal::i2c::Error),
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("simulated bus failure")]
    Simulated,
}
