#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bme688_driver::{AmbientStore, Clock};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, ErrorType, Operation};

pub const ADDR: u8 = 0x77;

/// Calibration block at 0x89.
pub const CALIB_BLOCK_1: [u8; 25] = [
    0x00, 0xF8, 0x66, 0x03, 0x00, 0xC5, 0x8E, 0x3C, 0xD7, 0x58, 0x00, 0x5B, 0x1A, 0xB0, 0xFF,
    0x34, 0x1E, 0x00, 0x00, 0xB9, 0xF8, 0x70, 0xF4, 0x1E, 0x00,
];

/// Calibration block at 0xE1.
pub const CALIB_BLOCK_2: [u8; 16] = [
    0x3F, 0x3E, 0x30, 0x00, 0x2D, 0x14, 0x78, 0x9C, 0x4D, 0x66, 0x9C, 0xE3, 0xE2, 0x12, 0x00,
    0x00,
];

pub const RES_HEAT_VAL: u8 = 0x28;
pub const RES_HEAT_RANGE: u8 = 0x10;

/// 0x1F..=0x2D: press 420000, temp 500000, hum 23000, gas 400 in range 5,
/// gas valid and heater stable.
pub const FIELD_BLOCK: [u8; 15] = [
    0x66, 0x8A, 0x00, 0x7A, 0x12, 0x00, 0x59, 0xD8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x64, 0x35,
];

/// Byte store backed by a plain vector.
pub struct MemStore(pub Vec<u8>);

impl MemStore {
    pub fn new() -> Self {
        Self(vec![0; 4096])
    }
}

impl AmbientStore for MemStore {
    type Error = ();

    fn read_byte(&mut self, offset: u16) -> Result<u8, ()> {
        self.0.get(offset as usize).copied().ok_or(())
    }

    fn write_byte(&mut self, offset: u16, value: u8) -> Result<(), ()> {
        let byte = self.0.get_mut(offset as usize).ok_or(())?;
        *byte = value;
        Ok(())
    }
}

/// Store that rejects every access.
pub struct BrokenStore;

impl AmbientStore for BrokenStore {
    type Error = ();

    fn read_byte(&mut self, _offset: u16) -> Result<u8, ()> {
        Err(())
    }

    fn write_byte(&mut self, _offset: u16, _value: u8) -> Result<(), ()> {
        Err(())
    }
}

/// Simulated time in nanoseconds, advanced by [`FakeDelay`] and read by [`FakeClock`].
pub type SimTime = Rc<Cell<u64>>;

pub struct FakeClock(pub SimTime);

impl Clock for FakeClock {
    fn now_ms(&mut self) -> u64 {
        self.0.get() / 1_000_000
    }
}

pub struct FakeDelay(pub SimTime);

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + ns as u64);
    }
}

/// Register file of a BME688 that completes every forced measurement at once.
///
/// Registers are shared so tests can change the next sample while the driver
/// owns the bus.
#[derive(Clone)]
pub struct FakeSensor {
    pub regs: Rc<RefCell<[u8; 256]>>,
    pub forced_count: Rc<Cell<u32>>,
    pointer: u8,
}

impl FakeSensor {
    pub fn new() -> Self {
        let mut regs = [0u8; 256];
        regs[0xD0] = 0x61;
        regs[0x89..0x89 + 25].copy_from_slice(&CALIB_BLOCK_1);
        regs[0xE1..0xE1 + 16].copy_from_slice(&CALIB_BLOCK_2);
        regs[0x00] = RES_HEAT_VAL;
        regs[0x02] = RES_HEAT_RANGE;
        regs[0x1F..=0x2D].copy_from_slice(&FIELD_BLOCK);

        Self {
            regs: Rc::new(RefCell::new(regs)),
            forced_count: Rc::new(Cell::new(0)),
            pointer: 0,
        }
    }

    pub fn set_gas_adc(&self, gas_adc: u16) {
        let mut regs = self.regs.borrow_mut();
        regs[0x2C] = (gas_adc >> 2) as u8;
        regs[0x2D] = (regs[0x2D] & 0x3F) | (((gas_adc & 0x03) as u8) << 6);
    }

    pub fn set_hum_adc(&self, hum_adc: u16) {
        let mut regs = self.regs.borrow_mut();
        regs[0x25] = (hum_adc >> 8) as u8;
        regs[0x26] = hum_adc as u8;
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&reg, values)) = bytes.split_first() else {
            return;
        };
        self.pointer = reg;

        let mut regs = self.regs.borrow_mut();
        for (i, value) in values.iter().enumerate() {
            let addr = reg.wrapping_add(i as u8);
            if addr == 0x74 && value & 0x03 == 0x01 {
                self.forced_count.set(self.forced_count.get() + 1);
                regs[0x1D] = 0x80;
                regs[0x74] = value & !0x03;
            } else {
                regs[addr as usize] = *value;
            }
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        let regs = self.regs.borrow();
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = regs[self.pointer.wrapping_add(i as u8) as usize];
        }
    }
}

impl ErrorType for FakeSensor {
    type Error = ErrorKind;
}

impl i2c::I2c for FakeSensor {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != ADDR {
            return Err(ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.write(bytes),
                Operation::Read(buffer) => self.read(buffer),
            }
        }
        Ok(())
    }
}
