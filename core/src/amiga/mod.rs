pub mod agnus;
pub mod beam;
pub mod blitter;
pub mod chipset;
pub mod control;
pub mod copper;
pub mod cpu;
pub mod custom;
pub mod inspect;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::bus::ChipMemory;
use crate::tickable::{TICKS_PER_CPU_CYCLE, Ticks};

use agnus::AgnusRevision;
use beam::VideoFormat;
use chipset::Chipset;
use control::RunLoopFlags;
use cpu::CpuCore;

/// A CPU and the chipset it drives
#[derive(Serialize, Deserialize)]
pub struct Amiga<C: CpuCore, M: ChipMemory> {
    pub cpu: C,
    pub chipset: Chipset<M>,
}

impl<C: CpuCore, M: ChipMemory> Amiga<C, M> {
    pub fn new(cpu: C, mem: M, format: VideoFormat, revision: AgnusRevision) -> Self {
        Self {
            cpu,
            chipset: Chipset::new(mem, format, revision),
        }
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.chipset.reset();
    }

    pub fn clock(&self) -> Ticks {
        self.chipset.clock()
    }

    /// Executes one CPU instruction and lets the chipset catch up
    pub fn step(&mut self) -> Result<()> {
        let start = self.chipset.clock();
        let ticks = self.cpu.execute_next_instruction(&mut self.chipset)?;
        debug_assert!(ticks > 0);
        let target = (start + ticks.max(TICKS_PER_CPU_CYCLE)).max(self.chipset.clock());
        self.chipset.advance_to(target);
        Ok(())
    }

    /// Runs until the frame in progress completed or a run loop flag was
    /// raised. Returns the raised flags, which stay raised.
    pub fn run_frame(&mut self) -> Result<RunLoopFlags> {
        let frame = self.chipset.agnus.frame().nr;
        loop {
            self.step()?;
            let flags = self.chipset.control().get();
            if flags.any() || self.chipset.agnus.frame().nr != frame {
                return Ok(flags);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amiga::cpu::IdleCpu;
    use crate::bus::chipram::ChipRam;

    fn amiga() -> Amiga<IdleCpu, ChipRam> {
        Amiga::new(
            IdleCpu::new(),
            ChipRam::new(0x8_0000),
            VideoFormat::Pal,
            AgnusRevision::Ocs,
        )
    }

    #[test]
    fn frame_loop() {
        let mut a = amiga();
        let flags = a.run_frame().unwrap();
        assert!(!flags.any());
        assert_eq!(a.chipset.agnus.frame().nr, 1);
        assert_eq!(a.chipset.agnus.pos().v, 0);
        assert!(a.chipset.agnus.frame_completed());

        a.run_frame().unwrap();
        assert_eq!(a.chipset.agnus.frame().nr, 2);
    }

    #[test]
    fn stop_flag_ends_frame_early() {
        let mut a = amiga();
        a.chipset
            .control()
            .raise(RunLoopFlags::none().with_stop(true));
        let flags = a.run_frame().unwrap();
        assert!(flags.stop());
        assert_eq!(a.chipset.agnus.frame().nr, 0);
        assert_eq!(a.cpu.instructions(), 1);
    }

    #[test]
    fn reset_restarts_clock() {
        let mut a = amiga();
        a.run_frame().unwrap();
        a.reset();
        assert_eq!(a.clock(), 0);
        assert_eq!(a.cpu.instructions(), 0);
        assert_eq!(a.chipset.agnus.frame().nr, 0);
    }
}
