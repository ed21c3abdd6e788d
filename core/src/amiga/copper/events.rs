//! Copper state machine
//!
//! Each state is one event in the Copper slot. Most states need a free bus
//! cycle; if the bus is taken the event is retried in the next cycle.

use log::*;

use super::changelog::RegChange;
use super::{CopperHit, CopperState};
use crate::amiga::agnus::arbiter::BusOwner;
use crate::amiga::chipset::Chipset;
use crate::amiga::control::RunLoopFlags;
use crate::amiga::custom::{COPJMP1, COPJMP2, is_color_reg, reg_name};
use crate::bus::{Accessor, ChipMemory};
use crate::scheduler::EventSlot;
use crate::tickable::{NEVER, dma_cycles};
use crate::types::Word;

impl<M: ChipMemory> Chipset<M> {
    pub(crate) fn service_copper_event(&mut self, state: CopperState, data: i64) {
        match state {
            CopperState::RequestDma | CopperState::Wakeup => self.copper_wakeup(),

            CopperState::WakeupBlit => {
                if self.blitter.is_active() {
                    self.copper_park(CopperState::WaitBlit);
                } else {
                    self.copper_wakeup();
                }
            }

            CopperState::Fetch => {
                if !self.copper_bus_free() {
                    return self.copper_retry();
                }
                self.copper.coppc0 = self.copper.coppc;
                self.check_breakpoint();

                self.copper.cop1ins = self.copper_read();
                self.copper.advance_pc();
                let next = if self.copper.is_move() {
                    CopperState::Move
                } else {
                    CopperState::WaitOrSkip
                };
                self.copper_schedule(next, 2);
            }

            CopperState::Move => {
                if !self.copper_bus_free() {
                    return self.copper_retry();
                }
                self.copper.cop2ins = self.copper_read();
                self.copper.advance_pc();
                self.copper.instructions += 1;

                let reg = self.copper.move_reg();
                if self.copper.is_illegal_address(reg, self.agnus.revision()) {
                    debug!(
                        "Copper halted at {:06X}: MOVE to {}",
                        self.copper.coppc0,
                        reg_name(reg)
                    );
                    self.agnus.sched.cancel(EventSlot::Copper);
                    return;
                }

                self.copper_schedule(CopperState::Fetch, 2);
                if self.copper.skip {
                    self.copper.skip = false;
                    return;
                }
                self.check_watchpoint(reg, self.copper.cop2ins);
                match reg {
                    COPJMP1 => self.copper_schedule_with(CopperState::Jmp1, 2, 1),
                    COPJMP2 => self.copper_schedule_with(CopperState::Jmp1, 2, 2),
                    _ => self.copper_move(reg, self.copper.cop2ins),
                }
            }

            CopperState::WaitOrSkip => {
                if !self.copper_bus_free() {
                    return self.copper_retry();
                }
                self.copper.cop2ins = self.copper_read();
                self.copper.advance_pc();
                self.copper.instructions += 1;

                let next = if self.copper.is_wait() {
                    CopperState::Wait1
                } else {
                    CopperState::Skip1
                };
                self.copper_schedule(next, 2);
            }

            CopperState::Wait1 => {
                if !self.copper_bus_free() {
                    return self.copper_retry();
                }
                self.copper_schedule(CopperState::Wait2, 2);
            }

            CopperState::Wait2 => {
                self.copper.skip = false;
                let bfd = self.copper.bfd();

                if !bfd && self.blitter.is_active() {
                    return self.copper_park(CopperState::WaitBlit);
                }
                if !self.copper_bus_free() || self.agnus.pos().h == 0xE1 {
                    return self.copper_retry();
                }
                self.schedule_wait_wakeup(bfd);
            }

            CopperState::WaitBlit => {
                // Only continue in a cycle the blitter or nobody owns
                let owner = self.agnus.bus_owner();
                if owner != BusOwner::None && owner != BusOwner::Blitter {
                    return self.copper_retry();
                }
                self.schedule_wait_wakeup(false);
            }

            CopperState::Skip1 => {
                if !self.copper_bus_free() {
                    return self.copper_retry();
                }
                self.copper_schedule(CopperState::Skip2, 2);
            }

            CopperState::Skip2 => {
                if !self.copper_bus_free() || self.agnus.pos().h == 0xE1 {
                    return self.copper_retry();
                }
                let pos = self.agnus.pos().add_cycles(2);
                let mut skip = self.copper.comparator(pos);
                if !self.copper.bfd() {
                    skip &= !self.blitter.is_active();
                }
                self.copper.skip = skip;
                self.copper_schedule(CopperState::Fetch, 2);
            }

            CopperState::Jmp1 => {
                // The cycle is taken even if the bus is busy
                self.agnus.allocate_bus(BusOwner::Copper);

                // In cycle $E0 the jump continues in $E1
                let delay = if self.agnus.pos().h == 0xE0 { 1 } else { 2 };
                self.copper_schedule_with(CopperState::Jmp2, delay, data);
            }

            CopperState::Jmp2 => {
                if !self.copper_bus_free() {
                    return self.copper_retry();
                }
                self.copper.jump_to_list(if data == 2 { 2 } else { 1 });
                self.copper_schedule(CopperState::Fetch, 2);
            }

            CopperState::Vblank => {
                let copdma = self.agnus.dmacon().copdma();
                if copdma && !self.agnus.allocate_bus(BusOwner::Copper) {
                    return self.copper_retry();
                }
                self.copper.jump_to_list(1);
                self.copper.active_in_this_frame = copdma;
                self.copper_schedule(CopperState::Fetch, 2);
            }
        }
    }

    fn copper_wakeup(&mut self) {
        // The Copper only starts on even cycles
        if !self.copper_bus_free() || self.agnus.pos().h % 2 == 1 {
            return self.copper_retry();
        }
        self.copper_schedule(CopperState::Fetch, 2);
    }

    fn copper_bus_free(&self) -> bool {
        self.agnus.bus_is_free(BusOwner::Copper)
    }

    /// Claims the current cycle and reads the word at the program counter
    fn copper_read(&mut self) -> Word {
        self.agnus.allocate_bus(BusOwner::Copper);
        self.agnus
            .dma_read(&mut self.mem, Accessor::Copper, self.copper.coppc)
    }

    fn copper_schedule(&mut self, state: CopperState, cycles: i64) {
        self.agnus
            .sched
            .schedule_rel(EventSlot::Copper, dma_cycles(cycles), state.into());
    }

    fn copper_schedule_with(&mut self, state: CopperState, cycles: i64, data: i64) {
        self.agnus.sched.schedule_rel_with(
            EventSlot::Copper,
            dma_cycles(cycles),
            state.into(),
            data,
        );
    }

    /// Retries the current state in the next cycle
    fn copper_retry(&mut self) {
        self.agnus
            .sched
            .reschedule_rel(EventSlot::Copper, dma_cycles(1));
    }

    /// Parks the Copper until something else wakes it up
    fn copper_park(&mut self, state: CopperState) {
        self.agnus
            .sched
            .schedule_abs(EventSlot::Copper, NEVER, state.into());
    }

    /// Schedules the end of a WAIT. Without a match in this frame the
    /// Copper sleeps until the next vertical blank.
    fn schedule_wait_wakeup(&mut self, bfd: bool) {
        let pos = self.agnus.pos();
        let Some(beam) = self
            .copper
            .find_match(pos, self.agnus.frame().num_lines())
        else {
            trace!("Copper WAIT {:04X} never matches", self.copper.vphp());
            return self.copper_park(CopperState::RequestDma);
        };

        let trigger = self.agnus.beam_to_clock(beam);
        if trigger - self.agnus.clock() <= dma_cycles(2) {
            self.copper_schedule(CopperState::Fetch, 2);
        } else {
            let state = if bfd {
                CopperState::Wakeup
            } else {
                CopperState::WakeupBlit
            };
            self.agnus
                .sched
                .schedule_abs(EventSlot::Copper, trigger, state.into());
        }
    }

    /// Executes the register write of a MOVE
    fn copper_move(&mut self, reg: Word, value: Word) {
        if is_color_reg(reg) {
            let pos = self.agnus.pos();
            let change = RegChange {
                frame: self.agnus.frame().nr,
                v: pos.v,
                pixel: 4 * pos.h,
                addr: reg,
                value,
            };
            self.copper.change_log.push(change);
        } else {
            self.poke_custom(reg, value, Accessor::Copper);
        }
    }

    fn check_watchpoint(&mut self, reg: Word, value: Word) {
        if self.copper.watchpoints.contains(&reg) {
            debug!("Copper watchpoint: {} = {:04X}", reg_name(reg), value);
            self.copper.hit = Some(CopperHit::Watchpoint(reg));
            self.control
                .raise(RunLoopFlags::none().with_watchpoint(true));
        }
    }

    fn check_breakpoint(&mut self) {
        let pc = self.copper.coppc;
        if self.copper.breakpoints.contains(&pc) {
            debug!("Copper breakpoint at {:06X}", pc);
            self.copper.hit = Some(CopperHit::Breakpoint(pc));
            self.control
                .raise(RunLoopFlags::none().with_breakpoint(true));
        }
    }
}
