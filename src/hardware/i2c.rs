// src/hardware/i2c.rs - Bus seam between the protocol layer and rppal
use super::HardwareError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// One I²C peer: write-only command transactions plus the single-byte status
/// read performed after its interrupt line fires.
pub trait I2cPort {
    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError>;
    fn read_byte(&mut self) -> Result<u8, HardwareError>;
}

/// A real bus peer. Each device gets its own handle with the slave address
/// latched at open time; the engine task is the only caller, so transactions
/// are serialized by construction.
pub struct RppalPort {
    bus: rppal::i2c::I2c,
}

impl RppalPort {
    pub fn open(bus: u8, slave_address: u16) -> Result<Self, HardwareError> {
        let mut i2c = rppal::i2c::I2c::with_bus(bus)?;
        i2c.set_slave_address(slave_address)?;
        Ok(Self { bus: i2c })
    }
}

impl I2cPort for RppalPort {
    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        self.bus.write(bytes)?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, HardwareError> {
        let mut buf = [0u8; 1];
        self.bus.read(&mut buf)?;
        Ok(buf[0])
    }
}

/// No-hardware stand-in for debug builds.
pub struct NullPort;

impl I2cPort for NullPort {
    fn write(&mut self, _bytes: &[u8]) -> Result<(), HardwareError> {
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, HardwareError> {
        Ok(super::motor::SUCCESS)
    }
}

/// Test double: records every write and replays scripted read bytes. The
/// log and script are shared handles so a test keeps visibility after the
/// port moves into the device under test.
#[derive(Default, Clone)]
pub struct RecordingPort {
    writes: Rc<RefCell<Vec<Vec<u8>>>>,
    reads: Rc<RefCell<VecDeque<u8>>>,
    fail_writes: Rc<RefCell<bool>>,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.borrow().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    pub fn push_read(&self, byte: u8) {
        self.reads.borrow_mut().push_back(byte);
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.borrow_mut() = fail;
    }
}

impl I2cPort for RecordingPort {
    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        if *self.fail_writes.borrow() {
            return Err(HardwareError::Simulated);
        }
        self.writes.borrow_mut().push(bytes.to_vec());
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, HardwareError> {
        self.reads
            .borrow_mut()
            .pop_front()
            .ok_or(HardwareError::Simulated)
    }
}
