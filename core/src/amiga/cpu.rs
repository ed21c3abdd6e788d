//! Interface to the CPU execution unit

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::bus::Address;
use crate::tickable::{Ticks, cpu_cycles};
use crate::types::Word;

/// Bus as seen by the CPU. Chip accesses stall until the CPU gets a bus
/// cycle, so the clock may have moved on when an access returns.
pub trait CpuBus {
    fn read_word(&mut self, addr: Address) -> Word;
    fn write_word(&mut self, addr: Address, val: Word);

    /// Current master clock
    fn clock(&self) -> Ticks;
}

/// A CPU that can be driven by the chipset
pub trait CpuCore {
    /// Executes one instruction and returns the ticks it took, not counting
    /// bus wait states.
    fn execute_next_instruction(&mut self, bus: &mut dyn CpuBus) -> Result<Ticks>;

    fn reset(&mut self);
}

impl<T: CpuCore + ?Sized> CpuCore for Box<T> {
    fn execute_next_instruction(&mut self, bus: &mut dyn CpuBus) -> Result<Ticks> {
        (**self).execute_next_instruction(bus)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// CPU that executes NOPs and never touches the bus
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IdleCpu {
    instructions: u64,
}

impl IdleCpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }
}

impl CpuCore for IdleCpu {
    fn execute_next_instruction(&mut self, _bus: &mut dyn CpuBus) -> Result<Ticks> {
        self.instructions += 1;
        Ok(cpu_cycles(4))
    }

    fn reset(&mut self) {
        self.instructions = 0;
    }
}
