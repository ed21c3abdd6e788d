//! The custom chips and chip memory, driven by the event scheduler

use std::sync::{Arc, Mutex};

use log::*;
use serde::{Deserialize, Serialize};

use crate::amiga::agnus::regs::Dmacon;
use crate::amiga::agnus::{Agnus, AgnusRevision, BusOwner};
use crate::amiga::beam::VideoFormat;
use crate::amiga::blitter::{Blitter, BlitterEvent};
use crate::amiga::control::RunLoopControl;
use crate::amiga::copper::Copper;
use crate::amiga::cpu::CpuBus;
use crate::amiga::custom::*;
use crate::amiga::inspect::InspectionSnapshot;
use crate::bus::{Accessor, Address, CUSTOM_BASE, ChipMemory};
use crate::debuggable::{Debuggable, DebuggableProperties, DebuggableProperty, DebuggablePropertyValue};
use crate::scheduler::{EventId, EventSlot, Slot};
use crate::tickable::{NEVER, Ticks, dma_cycles};
use crate::types::Word;
use crate::{dbgprop_nest, dbgprop_sdec};

/// Shared handle to the latest inspection snapshot
pub type SharedSnapshot = Arc<Mutex<InspectionSnapshot>>;

#[derive(Serialize, Deserialize)]
pub struct Chipset<M: ChipMemory> {
    pub agnus: Agnus,
    pub copper: Copper,
    pub blitter: Blitter,
    pub mem: M,

    /// Interval of the periodic inspection event (0 = off)
    inspection_interval: Ticks,

    #[serde(skip)]
    pub(crate) control: RunLoopControl,
    #[serde(skip)]
    inspection: SharedSnapshot,
    /// CPU obtained its bus cycle
    #[serde(skip)]
    cpu_granted: bool,
}

impl<M: ChipMemory> Chipset<M> {
    pub fn new(mem: M, format: VideoFormat, revision: AgnusRevision) -> Self {
        Self {
            agnus: Agnus::new(format, revision),
            copper: Copper::new(),
            blitter: Blitter::new(),
            mem,
            inspection_interval: 0,
            control: RunLoopControl::new(),
            inspection: SharedSnapshot::default(),
            cpu_granted: false,
        }
    }

    /// Hard reset of the chips. Memory contents survive.
    pub fn reset(&mut self) {
        self.agnus.reset();
        self.copper.reset();
        self.blitter.reset();
        self.set_inspection_interval(self.inspection_interval);
    }

    pub fn clock(&self) -> Ticks {
        self.agnus.clock()
    }

    pub fn control(&self) -> &RunLoopControl {
        &self.control
    }

    /// Connects the chipset to the handles held by the emulator thread
    pub fn attach(&mut self, control: RunLoopControl, inspection: SharedSnapshot) {
        self.control = control;
        self.inspection = inspection;
    }

    pub fn inspection(&self) -> SharedSnapshot {
        Arc::clone(&self.inspection)
    }

    pub fn set_inspection_interval(&mut self, ticks: Ticks) {
        self.inspection_interval = ticks;
        if ticks > 0 {
            self.agnus
                .sched
                .schedule_rel(EventSlot::Inspection, ticks, EventId::Inspect);
        } else {
            self.agnus.sched.cancel(EventSlot::Inspection);
        }
    }

    /// Refreshes the shared inspection snapshot
    pub fn inspect(&self) {
        let snapshot = InspectionSnapshot::capture(self);
        match self.inspection.lock() {
            Ok(mut s) => *s = snapshot,
            Err(e) => error!("Inspection snapshot lock poisoned: {}", e),
        }
    }

    /// Services all events up to and including `target`
    pub fn advance_to(&mut self, target: Ticks) {
        while let Some((slot, ev)) = self.agnus.sched.next_due(target) {
            self.dispatch(slot, ev);
        }
        self.agnus.sched.finish(target);
    }

    fn dispatch(&mut self, slot: EventSlot, ev: Slot) {
        match ev.id {
            EventId::Hsync => {
                if self.agnus.service_raster_event() {
                    self.copper.vsync_handler(&mut self.agnus);
                }
            }
            EventId::Dma(dma) => self.agnus.service_dma_event(dma, &mut self.mem),
            EventId::Copper(state) => self.service_copper_event(state, ev.data),
            EventId::Blitter(be) => self.service_blitter_event(be),
            EventId::CpuWakeup => {
                if self.agnus.allocate_bus(BusOwner::Cpu) {
                    self.cpu_granted = true;
                    self.agnus.sched.cancel(EventSlot::CpuSync);
                } else {
                    self.agnus
                        .sched
                        .reschedule_rel(EventSlot::CpuSync, dma_cycles(1));
                }
            }
            EventId::RegWrite => {
                for w in self.agnus.take_due_writes() {
                    self.apply_delayed_write(w.reg, w.value);
                }
            }
            EventId::Inspect => {
                self.inspect();
                self.agnus.sched.schedule_rel(
                    EventSlot::Inspection,
                    self.inspection_interval.max(1),
                    EventId::Inspect,
                );
            }
            EventId::None | EventId::SecTrigger => {
                warn!("Stray event {} in slot {}", ev.id, slot);
                self.agnus.sched.cancel(slot);
            }
        }
    }

    fn apply_delayed_write(&mut self, reg: Word, value: Word) {
        if reg == BLTSIZE {
            return self.start_blit(value);
        }
        if let Some(old) = self.agnus.apply_write(reg, value) {
            self.dmacon_changed(old);
        }
    }

    fn dmacon_changed(&mut self, old: Dmacon) {
        let sched = &mut self.agnus.sched;
        if !old.bltdma()
            && self.agnus.dmacon.bltdma()
            && sched.id(EventSlot::Blitter) == EventId::Blitter(BlitterEvent::Start)
        {
            sched.reschedule_rel(EventSlot::Blitter, 0);
        }
    }

    //
    // Blitter
    //

    fn start_blit(&mut self, bltsize: Word) {
        self.blitter.start(bltsize);
        self.agnus
            .sched
            .schedule_rel(EventSlot::Blitter, 0, BlitterEvent::Start.into());
    }

    fn service_blitter_event(&mut self, ev: BlitterEvent) {
        match ev {
            BlitterEvent::Start => {
                let (trigger, next) = if self.agnus.dmacon.bltdma() {
                    (self.clock() + dma_cycles(1), BlitterEvent::Execute)
                } else {
                    // Parked until blitter DMA is enabled
                    (NEVER, BlitterEvent::Start)
                };
                self.agnus
                    .sched
                    .schedule_abs(EventSlot::Blitter, trigger, next.into());
            }
            BlitterEvent::Execute => {
                if !self.agnus.allocate_bus(BusOwner::Blitter) {
                    self.agnus
                        .sched
                        .reschedule_rel(EventSlot::Blitter, dma_cycles(1));
                    return;
                }
                if self.blitter.word_done() {
                    trace!("Blit done at {:?}", self.agnus.pos());
                    self.agnus.sched.cancel(EventSlot::Blitter);
                    self.copper.blitter_did_terminate(&mut self.agnus);
                } else {
                    self.agnus
                        .sched
                        .reschedule_rel(EventSlot::Blitter, dma_cycles(1));
                }
            }
        }
    }

    //
    // Custom registers
    //

    /// Writes a custom register
    pub fn poke_custom(&mut self, reg: Word, value: Word, accessor: Accessor) {
        let reg = reg & 0x1FE;
        match reg {
            COPCON => self.copper.poke_copcon(value),
            COP1LCH => self.copper.poke_cop1lch(value),
            COP1LCL => self.copper.poke_cop1lcl(value),
            COP2LCH => self.copper.poke_cop2lch(value),
            COP2LCL => self.copper.poke_cop2lcl(value),
            COPJMP1 | COPJMP2 => {
                // Copper jumps go through its own state machine
                if accessor != Accessor::Copper {
                    let nr = if reg == COPJMP1 { 1 } else { 2 };
                    self.copper.switch_to_copper_list(nr, &mut self.agnus);
                }
            }
            COPINS => self.copper.poke_copins(value),
            BLTSIZE => self.agnus.record_write(dma_cycles(1), reg, value),
            _ => {
                if !self.agnus.poke(reg, value) {
                    self.mem
                        .write_word(accessor, CUSTOM_BASE + Address::from(reg), value);
                }
            }
        }
    }

    /// Reads a custom register
    pub fn peek_custom(&mut self, reg: Word, accessor: Accessor) -> Word {
        let reg = reg & 0x1FE;
        match self.agnus.peek(reg) {
            Some(v) if reg == DMACONR => v | if self.blitter.is_active() { 0x4000 } else { 0 },
            Some(v) => v,
            None => self
                .mem
                .read_word(accessor, CUSTOM_BASE + Address::from(reg)),
        }
    }

    /// Lets the clock run until the CPU owns the current bus cycle
    fn sync_cpu(&mut self) {
        self.cpu_granted = false;
        let now = self.agnus.clock();
        self.agnus
            .sched
            .schedule_abs(EventSlot::CpuSync, now, EventId::CpuWakeup);

        while !self.cpu_granted {
            let trigger = self.agnus.sched.trigger(EventSlot::CpuSync);
            if trigger == NEVER {
                break;
            }
            self.advance_to(trigger);
        }
        self.agnus.arbiter.cpu_waiting = false;
    }
}

fn is_custom(addr: Address) -> bool {
    addr & 0xFF_F000 == CUSTOM_BASE
}

impl<M: ChipMemory> CpuBus for Chipset<M> {
    fn read_word(&mut self, addr: Address) -> Word {
        self.sync_cpu();
        if is_custom(addr) {
            let v = self.peek_custom((addr & 0x1FE) as Word, Accessor::Cpu);
            self.agnus.record_bus_value(v);
            v
        } else {
            self.agnus.dma_read(&mut self.mem, Accessor::Cpu, addr)
        }
    }

    fn write_word(&mut self, addr: Address, val: Word) {
        self.sync_cpu();
        self.agnus.record_bus_value(val);
        if is_custom(addr) {
            self.poke_custom((addr & 0x1FE) as Word, val, Accessor::Cpu);
        } else {
            self.mem.write_word(Accessor::Cpu, addr & 0x1F_FFFE, val);
        }
    }

    fn clock(&self) -> Ticks {
        self.agnus.clock()
    }
}

impl<M: ChipMemory> Debuggable for Chipset<M> {
    fn get_debug_properties(&self) -> DebuggableProperties {
        vec![
            dbgprop_sdec!("Clock", self.agnus.clock()),
            dbgprop_nest!("Agnus", self.agnus),
            dbgprop_nest!("Copper", self.copper),
            dbgprop_nest!("Blitter", self.blitter),
            dbgprop_nest!("Scheduler", self.agnus.scheduler()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amiga::beam::Beam;
    use crate::amiga::cpu::CpuCore;
    use crate::amiga::cpu::testcpu::{Op, ScriptedCpu};
    use crate::bus::chipram::ChipRam;
    use crate::tickable::cpu_cycles;

    fn chipset() -> Chipset<ChipRam> {
        Chipset::new(ChipRam::new(0x8_0000), VideoFormat::Pal, AgnusRevision::Ocs)
    }

    fn run_to(c: &mut Chipset<ChipRam>, v: i64, h: i64) {
        let target = c.agnus.beam_to_clock(Beam::new(v, h));
        c.advance_to(target);
    }

    #[test]
    fn blit_occupies_bus() {
        let mut c = chipset();
        c.poke_custom(DMACON, 0x8000 | 0x0200 | 0x0040, Accessor::Cpu);
        c.poke_custom(BLTSIZE, (2 << 6) | 5, Accessor::Cpu);
        run_to(&mut c, 0, 0x08);
        assert!(c.blitter.is_active());
        assert_ne!(c.peek_custom(DMACONR, Accessor::Cpu) & 0x4000, 0);

        run_to(&mut c, 0, 0x20);
        assert!(!c.blitter.is_active());
        let blitter_cycles = c
            .agnus
            .arbiter
            .owners()
            .iter()
            .filter(|&&o| o == BusOwner::Blitter)
            .count();
        assert_eq!(blitter_cycles, 10);
        assert_eq!(c.peek_custom(DMACONR, Accessor::Cpu) & 0x4000, 0);
        assert_eq!(c.agnus.scheduler().id(EventSlot::Blitter), EventId::None);
    }

    #[test]
    fn blit_waits_for_dma() {
        let mut c = chipset();
        c.poke_custom(BLTSIZE, (1 << 6) | 1, Accessor::Cpu);
        run_to(&mut c, 1, 0);
        assert!(c.blitter.is_active());
        assert_eq!(c.agnus.scheduler().trigger(EventSlot::Blitter), NEVER);

        c.poke_custom(DMACON, 0x8000 | 0x0200 | 0x0040, Accessor::Cpu);
        run_to(&mut c, 1, 0x10);
        assert!(!c.blitter.is_active());
    }

    #[test]
    fn copper_waits_for_blitter() {
        let mut c = chipset();
        // WAIT (0, $10) with BFD clear, MOVE COLOR00, END
        c.mem
            .load_words(0x1000, &[0x0011, 0x7FFE, 0x0180, 0x0F00, 0xFFFF, 0xFFFE]);
        c.poke_custom(COP1LCL, 0x1000, Accessor::Cpu);
        c.poke_custom(DMACON, 0x8000 | 0x0200 | 0x0080 | 0x0040, Accessor::Cpu);
        c.poke_custom(BLTSIZE, (4 << 6) | 64, Accessor::Cpu);
        c.poke_custom(COPJMP1, 0, Accessor::Cpu);

        run_to(&mut c, 1, 0x10);
        assert!(c.blitter.is_active());
        assert!(c.copper.take_changes().is_empty());

        run_to(&mut c, 3, 0);
        assert!(!c.blitter.is_active());
        assert_eq!(c.copper.take_changes().len(), 1);
    }

    #[test]
    fn copper_and_blitter_share_line() {
        let mut c = chipset();
        let list: Vec<Word> = (0..40).flat_map(|i| [COLOR00, i]).collect();
        c.mem.load_words(0x1000, &list);
        c.poke_custom(COP1LCL, 0x1000, Accessor::Cpu);
        c.poke_custom(DMACON, 0x8000 | 0x0200 | 0x0080 | 0x0040, Accessor::Cpu);
        c.poke_custom(COPJMP1, 0, Accessor::Cpu);

        run_to(&mut c, 0, 0x20);
        c.poke_custom(BLTSIZE, (1 << 6) | 20, Accessor::Cpu);
        run_to(&mut c, 0, 0x60);
        assert!(!c.blitter.is_active());

        let changes = c.copper.take_changes();
        assert!(!changes.is_empty());
        for change in &changes {
            let h = (change.pixel / 4) as usize;
            assert_eq!(c.agnus.arbiter.owner(h), BusOwner::Copper, "cycle {:02X}", h);
        }

        let count = |owner: BusOwner| {
            c.agnus
                .arbiter
                .owners()
                .iter()
                .filter(|&&o| o == owner)
                .count()
        };
        assert_eq!(count(BusOwner::Blitter), 20);
        assert!(count(BusOwner::Copper) >= 2 * changes.len());
    }

    #[test]
    fn cpu_waits_for_bus() {
        let mut c = chipset();
        c.mem.load_words(0x100, &[0xBEEF]);
        // Move the clock to the refresh cycle at $03
        let mut cpu = ScriptedCpu::new(&[Op::Idle(dma_cycles(3)), Op::Read(0x100)]);
        for _ in 0..2 {
            let start = c.clock();
            let ticks = cpu.execute_next_instruction(&mut c).unwrap();
            let target = (start + ticks).max(c.clock());
            c.advance_to(target);
        }
        assert_eq!(cpu.reads.len(), 1);
        let (value, at) = cpu.reads[0];
        assert_eq!(value, 0xBEEF);
        assert_eq!(at, dma_cycles(4));
        assert_eq!(c.agnus.arbiter.owner(4), BusOwner::Cpu);
    }

    #[test]
    fn cpu_register_access() {
        let mut c = chipset();
        let mut cpu = ScriptedCpu::new(&[
            Op::Write(CUSTOM_BASE + Address::from(DMACON), 0x8000 | 0x0200 | 0x0100),
            Op::Idle(cpu_cycles(8)),
            Op::Read(CUSTOM_BASE + Address::from(DMACONR)),
        ]);
        while !cpu.done() {
            let start = c.clock();
            let ticks = cpu.execute_next_instruction(&mut c).unwrap();
            let target = (start + ticks).max(c.clock());
            c.advance_to(target);
        }
        assert_eq!(cpu.reads[0].0, 0x0300);
    }

    #[test]
    fn unknown_registers_reach_memory() {
        let mut c = chipset();
        c.poke_custom(BPLCON0, 0x1200, Accessor::Copper);
        c.poke_custom(0x040, 0x09F0, Accessor::Cpu);
        assert_eq!(
            c.mem.take_custom_writes(),
            vec![(CUSTOM_BASE + 0x100, 0x1200), (CUSTOM_BASE + 0x040, 0x09F0)]
        );
    }

    #[test]
    fn periodic_inspection() {
        let mut c = chipset();
        c.set_inspection_interval(dma_cycles(100));
        run_to(&mut c, 0, 150);
        let snap = c.inspection().lock().unwrap().clone();
        assert_eq!(snap.clock, dma_cycles(100));
        assert_eq!(snap.beam, Beam::new(0, 100));
        assert!(snap.slots.iter().any(|s| s.slot == EventSlot::Raster));
        assert_eq!(snap.bus_owners[1], BusOwner::Refresh);
    }
}
