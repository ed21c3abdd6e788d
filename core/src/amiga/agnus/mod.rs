pub mod arbiter;
pub mod dmatable;
pub mod regs;

use arrayvec::ArrayVec;
use log::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::amiga::beam::{Beam, Frame, LINE_TICKS, VideoFormat};
use crate::amiga::custom::*;
use crate::bus::{Accessor, ChipMemory};
use crate::debuggable::{Debuggable, DebuggableProperties, DebuggableProperty, DebuggablePropertyValue};
use crate::scheduler::{EventId, EventSlot, Scheduler};
use crate::tickable::{Ticks, dma_cycles};
use crate::types::{Field16, LatchingEvent, Long, Word, set_hi_word, set_lo_word};
use crate::{
    dbgprop_bool, dbgprop_enum, dbgprop_group, dbgprop_long, dbgprop_sdec, dbgprop_udec,
    dbgprop_word, dbgprop_word_bin,
};

pub use arbiter::{BusArbiter, BusOwner};
pub use dmatable::{DmaEvent, DmaTable, DmaTableConfig};
use regs::{Bplcon0, Dmacon};

/// Chip RAM pointer mask (2MB, word aligned)
const PTR_MASK: Long = 0x1F_FFFE;

/// Maximum amount of register writes in flight
const MAX_PENDING: usize = 32;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum AgnusRevision {
    /// Original chipset (8367/8371)
    #[default]
    #[strum(to_string = "OCS")]
    Ocs,
    /// Enhanced chipset (8372A)
    #[strum(to_string = "ECS")]
    Ecs,
}

/// A custom register write that takes effect after a delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub trigger: Ticks,
    pub reg: Word,
    pub value: Word,
}

/// DMA controller. Owns the master clock, the event slots and the bus.
#[derive(Serialize, Deserialize)]
pub struct Agnus {
    pub(crate) sched: Scheduler,

    /// Tick at which the current frame started
    frame_start: Ticks,
    pub(crate) frame: Frame,
    /// Line in progress
    line: i64,
    revision: AgnusRevision,

    pub(crate) dmacon: Dmacon,
    bplcon0: Bplcon0,
    ddfstrt: Word,
    ddfstop: Word,
    diwstrt: Field16,
    diwstop: Field16,

    bplpt: [Long; 6],
    bpl1mod: i16,
    bpl2mod: i16,
    sprpt: [Long; 8],
    dskpt: Long,
    audlc: [Long; 4],
    audpt: [Long; 4],
    audlen: [Word; 4],
    audcnt: [Word; 4],

    /// Last words fetched by the DMA channels
    bpldat: [Word; 6],
    sprdat: [[Word; 2]; 8],
    auddat: [Word; 4],
    dskdat: Word,

    /// Bitplanes fetched in the line in progress (bit n = plane n + 1)
    fetched_planes: u8,

    pub(crate) arbiter: BusArbiter,
    table: DmaTable,
    table_cfg: Option<DmaTableConfig>,

    pending: ArrayVec<PendingWrite, MAX_PENDING>,

    frame_done: LatchingEvent,
}

impl Agnus {
    pub fn new(format: VideoFormat, revision: AgnusRevision) -> Self {
        let mut agnus = Self {
            sched: Scheduler::new(),
            frame_start: 0,
            frame: Frame::new(format),
            line: 0,
            revision,
            dmacon: Dmacon(0),
            bplcon0: Bplcon0(0),
            ddfstrt: 0,
            ddfstop: 0,
            diwstrt: Field16(0),
            diwstop: Field16(0),
            bplpt: [0; 6],
            bpl1mod: 0,
            bpl2mod: 0,
            sprpt: [0; 8],
            dskpt: 0,
            audlc: [0; 4],
            audpt: [0; 4],
            audlen: [0; 4],
            audcnt: [0; 4],
            bpldat: [0; 6],
            sprdat: [[0; 2]; 8],
            auddat: [0; 4],
            dskdat: 0,
            fetched_planes: 0,
            arbiter: BusArbiter::new(),
            table: DmaTable::empty(),
            table_cfg: None,
            pending: ArrayVec::new(),
            frame_done: LatchingEvent::default(),
        };
        agnus
            .sched
            .schedule_abs(EventSlot::Raster, LINE_TICKS, EventId::Hsync);
        agnus.update_dma_table(0);
        agnus
    }

    /// Hard reset. Clears the clock and all events.
    pub fn reset(&mut self) {
        let debugger = self.arbiter.debugger_enabled();
        *self = Self::new(self.frame.format, self.revision);
        self.arbiter.set_debugger(debugger);
    }

    pub fn clock(&self) -> Ticks {
        self.sched.clock()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn revision(&self) -> AgnusRevision {
        self.revision
    }

    pub fn set_revision(&mut self, revision: AgnusRevision) {
        info!("Agnus revision: {}", revision);
        self.revision = revision;
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn set_video_format(&mut self, format: VideoFormat) {
        info!("Video format: {}", format);
        self.frame.format = format;
    }

    pub fn dmacon(&self) -> Dmacon {
        self.dmacon
    }

    /// Current beam position
    pub fn pos(&self) -> Beam {
        self.clock_to_beam(self.sched.clock())
    }

    /// Converts a beam position in the current frame to a tick
    pub fn beam_to_clock(&self, beam: Beam) -> Ticks {
        self.frame_start + beam.to_ticks()
    }

    /// Converts a tick in the current frame to a beam position
    pub fn clock_to_beam(&self, tick: Ticks) -> Beam {
        Beam::from_ticks(tick - self.frame_start)
    }

    /// Returns and clears the frame completion latch
    pub fn frame_completed(&mut self) -> bool {
        self.frame_done.get_clear()
    }

    //
    // Bus arbitration
    //

    pub fn bus_is_free(&self, owner: BusOwner) -> bool {
        let h = self.pos().h as usize;
        self.arbiter
            .is_free(h, owner, self.table.is_reserved(h), self.dmacon)
    }

    pub fn allocate_bus(&mut self, owner: BusOwner) -> bool {
        let h = self.pos().h as usize;
        let reserved = self.table.is_reserved(h);
        self.arbiter.allocate(h, owner, reserved, self.dmacon)
    }

    /// Bus owner of the current cycle
    pub fn bus_owner(&self) -> BusOwner {
        self.arbiter.owner(self.pos().h as usize)
    }

    /// Records the word moved in the current cycle
    pub fn record_bus_value(&mut self, value: Word) {
        let h = self.pos().h as usize;
        self.arbiter.record_value(h, value);
    }

    /// Reads a word over the bus after the cycle was allocated
    pub fn dma_read<M: ChipMemory>(&mut self, mem: &mut M, accessor: Accessor, addr: Long) -> Word {
        let value = mem.read_word(accessor, addr & PTR_MASK);
        self.record_bus_value(value);
        value
    }

    //
    // DMA allocation table
    //

    fn table_config(&self) -> DmaTableConfig {
        let vstart = i64::from(self.diwstrt.msb());
        let vstop_lo = self.diwstop.msb();
        // VSTOP bit 8 is the complement of bit 7
        let vstop = i64::from(vstop_lo) | if vstop_lo & 0x80 == 0 { 0x100 } else { 0 };

        DmaTableConfig {
            dmacon: self.dmacon,
            bplcon0: self.bplcon0,
            ddfstrt: self.ddfstrt,
            ddfstop: self.ddfstop,
            bpl_line: self.line >= vstart && self.line < vstop,
        }
        .normalized()
    }

    /// Rebuilds the allocation table if its inputs changed and
    /// reschedules the DMA channels from position `from_h` on.
    fn update_dma_table(&mut self, from_h: i64) {
        let cfg = self.table_config();
        if self.table_cfg == Some(cfg) && from_h != 0 {
            return;
        }
        if self.table_cfg != Some(cfg) {
            trace!(
                "Rebuilding DMA table at ({}, {}): {:?}",
                self.line, from_h, cfg
            );
            self.table = DmaTable::build(&cfg);
            self.table_cfg = Some(cfg);
        }
        self.schedule_dma_from(from_h);
    }

    fn schedule_dma_from(&mut self, from_h: i64) {
        for slot in EventSlot::dma_slots() {
            self.sched.cancel(slot);
        }
        for (h, ev) in self.table.iter_from(from_h as usize) {
            let slot = ev.slot();
            if !self.sched.has_event(slot) {
                let tick = self.beam_to_clock(Beam::new(self.line, h as i64));
                self.sched.schedule_abs(slot, tick, EventId::Dma(ev));
            }
        }
    }

    pub fn dma_table(&self) -> &DmaTable {
        &self.table
    }

    //
    // Event handlers
    //

    /// Start of a new line. Returns true if a new frame started.
    pub fn service_raster_event(&mut self) -> bool {
        let mut new_frame = false;

        self.arbiter.end_line();
        for plane in 0..6 {
            if self.fetched_planes & (1 << plane) != 0 {
                let modulo = if plane % 2 == 0 {
                    self.bpl1mod
                } else {
                    self.bpl2mod
                };
                self.bplpt[plane] =
                    (self.bplpt[plane] as i64 + i64::from(modulo)) as Long & PTR_MASK;
            }
        }
        self.fetched_planes = 0;

        self.line += 1;
        if self.line >= self.frame.num_lines() {
            self.frame_start = self.sched.clock();
            self.line = 0;
            self.frame.interlaced = self.bplcon0.lace();
            self.frame.advance();
            self.arbiter.end_frame();
            self.frame_done.set();
            new_frame = true;
        }
        debug_assert_eq!(self.pos(), Beam::new(self.line, 0));

        self.arbiter.begin_line();
        self.update_dma_table(0);
        self.sched.schedule_abs(
            EventSlot::Raster,
            self.beam_to_clock(Beam::new(self.line + 1, 0)),
            EventId::Hsync,
        );
        new_frame
    }

    /// Performs a table-driven DMA transfer and schedules the next
    /// transfer of the same channel.
    pub fn service_dma_event<M: ChipMemory>(&mut self, ev: DmaEvent, mem: &mut M) {
        let h = self.pos().h as usize;

        if self.allocate_bus(ev.owner()) {
            match ev {
                DmaEvent::Disk(_) => {
                    self.dskdat = self.dma_read(mem, Accessor::Agnus, self.dskpt);
                    self.dskpt = (self.dskpt + 2) & PTR_MASK;
                }
                DmaEvent::Audio(ch) => {
                    let ch = usize::from(ch);
                    self.auddat[ch] = self.dma_read(mem, Accessor::Agnus, self.audpt[ch]);
                    if self.audcnt[ch] <= 1 {
                        // Sample finished, restart from the location register
                        self.audpt[ch] = self.audlc[ch];
                        self.audcnt[ch] = self.audlen[ch];
                    } else {
                        self.audpt[ch] = (self.audpt[ch] + 2) & PTR_MASK;
                        self.audcnt[ch] -= 1;
                    }
                }
                DmaEvent::Bitplane(plane) => {
                    let idx = usize::from(plane) - 1;
                    self.bpldat[idx] = self.dma_read(mem, Accessor::Agnus, self.bplpt[idx]);
                    self.bplpt[idx] = (self.bplpt[idx] + 2) & PTR_MASK;
                    self.fetched_planes |= 1 << idx;
                }
                DmaEvent::Sprite { nr, second } => {
                    let nr = usize::from(nr);
                    self.sprdat[nr][usize::from(second)] =
                        self.dma_read(mem, Accessor::Agnus, self.sprpt[nr]);
                    self.sprpt[nr] = (self.sprpt[nr] + 2) & PTR_MASK;
                }
            }
        }

        let slot = ev.slot();
        match self.table.next_for_slot(slot, h) {
            Some((next_h, next_ev)) => {
                let tick = self.beam_to_clock(Beam::new(self.line, next_h as i64));
                self.sched.schedule_abs(slot, tick, EventId::Dma(next_ev));
            }
            None => self.sched.cancel(slot),
        }
    }

    //
    // Register writes
    //

    /// Queues a register write that takes effect after `delay` ticks
    pub fn record_write(&mut self, delay: Ticks, reg: Word, value: Word) {
        let trigger = self.sched.clock() + delay;
        let pw = PendingWrite {
            trigger,
            reg,
            value,
        };
        let idx = self.pending.partition_point(|p| p.trigger <= trigger);
        if self.pending.try_insert(idx, pw).is_err() {
            warn!(
                "Register write queue full, dropping write to {} ({:04X})",
                reg_name(reg),
                value
            );
            return;
        }
        self.sched
            .schedule_abs(EventSlot::RegWrite, self.pending[0].trigger, EventId::RegWrite);
    }

    /// Takes all writes that are due and reschedules the write slot
    pub fn take_due_writes(&mut self) -> ArrayVec<PendingWrite, MAX_PENDING> {
        let clock = self.sched.clock();
        let n = self.pending.partition_point(|p| p.trigger <= clock);
        let due = self.pending.drain(..n).collect();

        match self.pending.first() {
            Some(p) => self
                .sched
                .schedule_abs(EventSlot::RegWrite, p.trigger, EventId::RegWrite),
            None => self.sched.cancel(EventSlot::RegWrite),
        }
        due
    }

    pub fn pending_writes(&self) -> &[PendingWrite] {
        &self.pending
    }

    /// Handles a write to an Agnus register. Returns false if the
    /// register needs to be passed on to the other custom chips as well.
    pub fn poke(&mut self, reg: Word, value: Word) -> bool {
        match reg {
            DMACON | DIWSTRT | DIWSTOP | DDFSTRT | DDFSTOP => {
                self.record_write(dma_cycles(2), reg, value);
                true
            }
            BPLCON0 => {
                // Denise has its own copy
                self.record_write(dma_cycles(4), reg, value);
                false
            }
            DSKPTH => {
                self.dskpt = set_hi_word(self.dskpt, value) & PTR_MASK;
                true
            }
            DSKPTL => {
                self.dskpt = set_lo_word(self.dskpt, value) & PTR_MASK;
                true
            }
            AUD0LCH..=AUD3LEN if (reg - AUD0LCH) % 0x10 <= 4 => {
                let ch = usize::from((reg - AUD0LCH) / 0x10);
                match (reg - AUD0LCH) % 0x10 {
                    0 => self.audlc[ch] = set_hi_word(self.audlc[ch], value) & PTR_MASK,
                    2 => self.audlc[ch] = set_lo_word(self.audlc[ch], value) & PTR_MASK,
                    _ => self.audlen[ch] = value,
                }
                true
            }
            BPL1PTH..=BPL6PTL => {
                let idx = usize::from((reg - BPL1PTH) / 4);
                self.bplpt[idx] = if reg & 2 == 0 {
                    set_hi_word(self.bplpt[idx], value)
                } else {
                    set_lo_word(self.bplpt[idx], value)
                } & PTR_MASK;
                true
            }
            BPL1MOD => {
                self.bpl1mod = value as i16 & !1;
                true
            }
            BPL2MOD => {
                self.bpl2mod = value as i16 & !1;
                true
            }
            SPR0PTH..=SPR7PTL => {
                let idx = usize::from((reg - SPR0PTH) / 4);
                self.sprpt[idx] = if reg & 2 == 0 {
                    set_hi_word(self.sprpt[idx], value)
                } else {
                    set_lo_word(self.sprpt[idx], value)
                } & PTR_MASK;
                true
            }
            _ => false,
        }
    }

    /// Applies a delayed register write. Returns the previous DMACON
    /// value if DMACON was written.
    pub fn apply_write(&mut self, reg: Word, value: Word) -> Option<Dmacon> {
        let mut old_dmacon = None;
        match reg {
            DMACON => {
                old_dmacon = Some(self.dmacon);
                let new = self.dmacon.write(value);
                debug!("DMACON {:04X} -> {:04X}", old_dmacon.map_or(0, |d| d.0), new.0);
            }
            DIWSTRT => self.diwstrt = Field16(value),
            DIWSTOP => self.diwstop = Field16(value),
            DDFSTRT => self.ddfstrt = value & 0xFC,
            DDFSTOP => self.ddfstop = value & 0xFC,
            BPLCON0 => self.bplcon0 = Bplcon0(value),
            _ => {
                warn!("Unexpected delayed write to {}", reg_name(reg));
                return None;
            }
        }
        let from_h = self.pos().h + 1;
        self.update_dma_table(from_h);
        old_dmacon
    }

    /// Reads the Agnus registers readable by the CPU
    pub fn peek(&self, reg: Word) -> Option<Word> {
        let pos = self.pos();
        match reg {
            DMACONR => Some(self.dmacon.0 & 0x07FF),
            VPOSR => {
                let lof = if self.frame.lof { 0x8000 } else { 0 };
                let id = match (self.revision, self.frame.format) {
                    (AgnusRevision::Ocs, VideoFormat::Pal) => 0x0000,
                    (AgnusRevision::Ocs, VideoFormat::Ntsc) => 0x1000,
                    (AgnusRevision::Ecs, VideoFormat::Pal) => 0x2000,
                    (AgnusRevision::Ecs, VideoFormat::Ntsc) => 0x3000,
                };
                Some(lof | id | ((pos.v >> 8) & 1) as Word)
            }
            VHPOSR => Some((((pos.v & 0xFF) << 8) | (pos.h & 0xFF)) as Word),
            _ => None,
        }
    }

    pub fn bplpt(&self, plane: usize) -> Long {
        self.bplpt[plane]
    }

    pub fn sprpt(&self, nr: usize) -> Long {
        self.sprpt[nr]
    }

    pub fn dskpt(&self) -> Long {
        self.dskpt
    }

    pub fn audpt(&self, ch: usize) -> Long {
        self.audpt[ch]
    }

    pub fn bpldat(&self) -> &[Word; 6] {
        &self.bpldat
    }

    pub fn sprdat(&self, nr: usize) -> [Word; 2] {
        self.sprdat[nr]
    }

    pub fn auddat(&self, ch: usize) -> Word {
        self.auddat[ch]
    }

    pub fn dskdat(&self) -> Word {
        self.dskdat
    }
}

impl Debuggable for Agnus {
    fn get_debug_properties(&self) -> DebuggableProperties {
        let pos = self.pos();
        let stats = &self.arbiter.stats;

        vec![
            dbgprop_enum!("Revision", self.revision),
            dbgprop_enum!("Video format", self.frame.format),
            dbgprop_sdec!("Frame", self.frame.nr),
            dbgprop_bool!("Long frame", self.frame.lof),
            dbgprop_sdec!("V", pos.v),
            dbgprop_sdec!("H", pos.h),
            dbgprop_word_bin!("DMACON", self.dmacon.0),
            dbgprop_word!("BPLCON0", self.bplcon0.0),
            dbgprop_udec!("Bitplanes", self.bplcon0.bpu()),
            dbgprop_word!("DDFSTRT", self.ddfstrt),
            dbgprop_word!("DDFSTOP", self.ddfstop),
            dbgprop_word!("DIWSTRT", self.diwstrt.0),
            dbgprop_word!("DIWSTOP", self.diwstop.0),
            dbgprop_group!(
                "Pointers",
                (0..6)
                    .map(|i| dbgprop_long!(format!("BPL{}PT", i + 1), self.bplpt[i]))
                    .chain((0..8).map(|i| dbgprop_long!(format!("SPR{}PT", i), self.sprpt[i])))
                    .chain((0..4).map(|i| dbgprop_long!(format!("AUD{}PT", i), self.audpt[i])))
                    .chain(std::iter::once(dbgprop_long!("DSKPT", self.dskpt)))
                    .collect()
            ),
            dbgprop_group!(
                "Bus usage (last frame)",
                (0..BusOwner::STAT_KINDS)
                    .map(|i| dbgprop_sdec!(BusOwner::stat_name(i), stats.last_frame[i]))
                    .collect()
            ),
            dbgprop_udec!("Pending writes", self.pending.len()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amiga::beam::HPOS_CNT;
    use crate::bus::chipram::ChipRam;
    use crate::tickable::NEVER;

    /// Runs the DMA and raster events of an Agnus without the rest of the chipset
    fn run(agnus: &mut Agnus, mem: &mut ChipRam, target: Ticks) {
        while let Some((slot, ev)) = agnus.sched.next_due(target) {
            match ev.id {
                EventId::Hsync => {
                    agnus.service_raster_event();
                }
                EventId::Dma(dma) => agnus.service_dma_event(dma, mem),
                EventId::RegWrite => {
                    for w in agnus.take_due_writes() {
                        agnus.apply_write(w.reg, w.value);
                    }
                }
                _ => agnus.sched.cancel(slot),
            }
        }
        agnus.sched.finish(target);
    }

    fn agnus() -> (Agnus, ChipRam) {
        (
            Agnus::new(VideoFormat::Pal, AgnusRevision::Ocs),
            ChipRam::new(0x8_0000),
        )
    }

    #[test]
    fn beam_clock_inverse() {
        let (mut a, mut m) = agnus();
        // Move into the second frame so frame_start is nonzero
        let t = a.frame.ticks() + 5 * LINE_TICKS;
        run(&mut a, &mut m, t);
        assert_eq!(a.frame.nr, 1);
        assert_eq!(a.pos(), Beam::new(5, 0));

        for tick in (a.frame_start..a.frame_start + a.frame.ticks()).step_by(8 * 101) {
            assert_eq!(a.beam_to_clock(a.clock_to_beam(tick)), tick);
        }
    }

    #[test]
    fn frame_sequencing() {
        let (mut a, mut m) = agnus();
        let t = a.frame.ticks();
        run(&mut a, &mut m, t - 1);
        assert!(!a.frame_completed());
        assert_eq!(a.pos(), Beam::new(312, HPOS_CNT - 1));
        run(&mut a, &mut m, t);
        assert!(a.frame_completed());
        assert!(!a.frame_completed());
        assert_eq!(a.pos(), Beam::new(0, 0));
        assert_eq!(a.frame.nr, 1);
    }

    #[test]
    fn interlace_alternates_frame_length() {
        let (mut a, mut m) = agnus();
        a.poke(BPLCON0, 0x0004);
        let first = a.frame.ticks();
        run(&mut a, &mut m, first);
        assert!(!a.frame.lof);
        assert_eq!(a.frame.num_lines(), 312);
        let target = first + a.frame.ticks();
        run(&mut a, &mut m, target);
        assert!(a.frame.lof);
        assert_eq!(a.frame.nr, 2);
    }

    #[test]
    fn refresh_every_line() {
        let (mut a, mut m) = agnus();
        run(&mut a, &mut m, 10 * LINE_TICKS);
        for h in BusArbiter::REFRESH_CYCLES {
            assert_eq!(a.arbiter.owner(h), BusOwner::Refresh);
        }
    }

    #[test]
    fn delayed_dmacon() {
        let (mut a, mut m) = agnus();
        run(&mut a, &mut m, dma_cycles(0x10));
        assert!(!a.poke(BPLCON0, 0x1000));
        assert!(a.poke(DMACON, 0x8000 | 0x0200 | 0x0100));
        assert_eq!(a.pending_writes().len(), 2);

        // DMACON lands after two cycles, BPLCON0 after four
        run(&mut a, &mut m, dma_cycles(0x11));
        assert!(!a.dmacon().bpldma());
        run(&mut a, &mut m, dma_cycles(0x12));
        assert!(a.dmacon().bpldma());
        assert_eq!(a.bplcon0.bpu(), 0);
        run(&mut a, &mut m, dma_cycles(0x14));
        assert_eq!(a.bplcon0.bpu(), 1);
        assert!(a.pending_writes().is_empty());
        assert_eq!(a.scheduler().trigger(EventSlot::RegWrite), NEVER);
    }

    #[test]
    fn bitplane_fetch() {
        let (mut a, mut m) = agnus();
        m.load_words(0x1000, &(0..40).collect::<Vec<_>>());
        a.poke(DIWSTRT, 0x2C81);
        a.poke(DIWSTOP, 0x2CC1);
        a.poke(DDFSTRT, 0x38);
        a.poke(DDFSTOP, 0xD0);
        a.poke(BPLCON0, 0x1200);
        a.poke(BPL1MOD, 8);
        a.poke(DMACON, 0x8000 | 0x0200 | 0x0100);
        a.poke(BPL1PTH, 0);
        a.poke(BPL1PTL, 0x1000);

        // Nothing fetched above the display window
        run(&mut a, &mut m, 0x2C * LINE_TICKS);
        assert_eq!(a.bplpt(0), 0x1000);

        // Line $2C fetches 20 words
        let target = a.beam_to_clock(Beam::new(0x2C, 0x40));
        run(&mut a, &mut m, target);
        assert_eq!(a.arbiter.owner(0x3F), BusOwner::Bitplane(1));
        assert_eq!(a.arbiter.value(0x3F), 0);
        assert_eq!(a.bpldat()[0], 0);
        let target = a.beam_to_clock(Beam::new(0x2C, 0xE0));
        run(&mut a, &mut m, target);
        assert_eq!(a.bplpt(0), 0x1000 + 40);
        assert_eq!(a.bpldat()[0], 19);

        // Modulo added at the end of the line
        let target = a.beam_to_clock(Beam::new(0x2D, 0));
        run(&mut a, &mut m, target);
        assert_eq!(a.bplpt(0), 0x1000 + 48);
    }

    #[test]
    fn audio_restarts() {
        let (mut a, mut m) = agnus();
        a.poke(AUD0LCH, 0);
        a.poke(AUD0LCH + 2, 0x2000);
        a.poke(AUD0LCH + 4, 2);
        a.poke(DMACON, 0x8000 | 0x0200 | 0x0001);

        let target = a.beam_to_clock(Beam::new(3, 0x20));
        run(&mut a, &mut m, target);
        assert_eq!(a.arbiter.owner(0x0D), BusOwner::Audio(0));
        assert_eq!(a.arbiter.owner(0x0F), BusOwner::None);

        // Pointer cycles through the two words of the sample
        let p = a.audpt(0);
        let target = a.beam_to_clock(Beam::new(4, 0x20));
        run(&mut a, &mut m, target);
        assert_ne!(a.audpt(0), p);
        let target = a.beam_to_clock(Beam::new(5, 0x20));
        run(&mut a, &mut m, target);
        assert_eq!(a.audpt(0), p);
    }

    #[test]
    fn cpu_blocked_by_dma() {
        let (mut a, mut m) = agnus();
        a.poke(DMACON, 0x8000 | 0x0200 | 0x0010);
        run(&mut a, &mut m, LINE_TICKS + dma_cycles(0x07));
        assert_eq!(a.bus_owner(), BusOwner::Disk);
        assert!(!a.bus_is_free(BusOwner::Cpu));
        run(&mut a, &mut m, LINE_TICKS + dma_cycles(0x08));
        assert!(a.bus_is_free(BusOwner::Cpu));
        assert!(a.allocate_bus(BusOwner::Cpu));
        assert!(!a.bus_is_free(BusOwner::Cpu));
    }

    #[test]
    fn registers_readable() {
        let (mut a, mut m) = agnus();
        let target = a.beam_to_clock(Beam::new(0x105, 0x33));
        run(&mut a, &mut m, target);
        assert_eq!(a.peek(VHPOSR), Some(0x0533));
        assert_eq!(a.peek(VPOSR), Some(0x8001));
        assert_eq!(a.peek(0x180), None);
    }

    #[test]
    fn reset_clears_clock() {
        let (mut a, mut m) = agnus();
        run(&mut a, &mut m, 12345);
        a.reset();
        assert_eq!(a.clock(), 0);
        assert_eq!(a.scheduler().trigger(EventSlot::Raster), LINE_TICKS);
    }
}
