//! In-memory register bank.
//!
//! Used for dry runs and tests: writes are kept and can be read back, nothing
//! reaches the hardware.

use std::cell::RefCell;

use log::debug;

use super::{high_byte_register, RegisterPort};
use crate::errors::FanControlError;

pub struct DummyPort {
    registers: RefCell<[u8; 256]>,
}

impl DummyPort {
    pub fn new() -> Self {
        Self {
            registers: RefCell::new([0; 256]),
        }
    }
}

impl Default for DummyPort {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterPort for DummyPort {
    fn read_byte(&self, register: u8) -> Result<u8, FanControlError> {
        Ok(self.registers.borrow()[register as usize])
    }

    fn read_word(&self, register: u8) -> Result<u16, FanControlError> {
        let high_register = high_byte_register(register)?;
        let registers = self.registers.borrow();
        Ok(u16::from_le_bytes([
            registers[register as usize],
            registers[high_register as usize],
        ]))
    }

    fn write_byte(&self, register: u8, value: u8) -> Result<(), FanControlError> {
        debug!("dummy: write 0x{:02X} <- {}", register, value);
        self.registers.borrow_mut()[register as usize] = value;
        Ok(())
    }

    fn write_word(&self, register: u8, value: u16) -> Result<(), FanControlError> {
        let high_register = high_byte_register(register)?;
        debug!("dummy: write word 0x{:02X} <- {}", register, value);
        let [low, high] = value.to_le_bytes();
        let mut registers = self.registers.borrow_mut();
        registers[register as usize] = low;
        registers[high_register as usize] = high;
        Ok(())
    }
}
