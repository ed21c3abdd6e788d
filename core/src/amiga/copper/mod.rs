//! Copper coprocessor
//!
//! The Copper executes a list of two-word instructions from chip memory:
//!
//! * MOVE: write a value into a custom register
//! * WAIT: halt until the beam reaches a position
//! * SKIP: skip the next instruction if the beam is at or past a position
//!
//! Every instruction word is fetched in its own bus cycle. The state machine
//! lives in [`events`], this module holds the registers and the beam
//! comparator.

pub mod changelog;
pub mod events;

use log::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::amiga::agnus::regs::Copcon;
use crate::amiga::agnus::{Agnus, AgnusRevision};
use crate::amiga::beam::{Beam, HPOS_CNT};
use crate::bus::Address;
use crate::debuggable::{Debuggable, DebuggableProperties, DebuggableProperty, DebuggablePropertyValue};
use crate::scheduler::{EventId, EventSlot};
use crate::tickable::{align_dma_cycle, dma_cycles};
use crate::types::{Long, Word, set_hi_word, set_lo_word};
use crate::{dbgprop_bool, dbgprop_long, dbgprop_udec, dbgprop_word};

use changelog::RegChangeLog;

/// Copper pointer mask (2MB, word aligned)
const PC_MASK: Long = 0x1F_FFFE;

/// Last horizontal position a WAIT can be satisfied in. The last two
/// cycles of a line are not available to the Copper.
const HPOS_WAIT_MAX: i64 = HPOS_CNT - 3;

/// Events of the Copper slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CopperState {
    /// Waiting for a free bus cycle to resume fetching
    RequestDma,
    /// Fetch the first instruction word
    Fetch,
    /// Fetch the second word of a MOVE and execute it
    Move,
    /// Fetch the second word of a WAIT or SKIP
    WaitOrSkip,
    Wait1,
    Wait2,
    /// WAIT is pending on the blitter
    WaitBlit,
    Skip1,
    Skip2,
    Jmp1,
    Jmp2,
    /// Restart at the beginning of a frame
    Vblank,
    /// WAIT satisfied
    Wakeup,
    /// WAIT satisfied, blitter needs to finish first
    WakeupBlit,
}

impl From<CopperState> for EventId {
    fn from(s: CopperState) -> Self {
        Self::Copper(s)
    }
}

/// Debugger hit raised by the Copper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopperHit {
    /// Instruction fetched from a breakpoint address
    Breakpoint(Address),
    /// MOVE into a watched register
    Watchpoint(Word),
}

#[derive(Serialize, Deserialize)]
pub struct Copper {
    /// Copper list location registers
    cop1lc: Long,
    cop2lc: Long,

    /// Program counter
    coppc: Long,
    /// Address of the instruction being executed
    coppc0: Long,

    cop1ins: Word,
    cop2ins: Word,

    copcon: Copcon,

    /// Set by a satisfied SKIP, suppresses the next MOVE
    skip: bool,

    /// Active list (1 or 2)
    cop_list: u8,

    /// Copper DMA was enabled at the start of the frame
    active_in_this_frame: bool,

    /// Lowest and highest instruction address per list in this frame
    list_range: [Option<(Long, Long)>; 2],

    /// Instructions executed since reset
    instructions: u64,

    pub(crate) change_log: RegChangeLog,

    breakpoints: Vec<Address>,
    watchpoints: Vec<Word>,

    #[serde(skip)]
    hit: Option<CopperHit>,
}

impl Copper {
    pub fn new() -> Self {
        Self {
            cop1lc: 0,
            cop2lc: 0,
            coppc: 0,
            coppc0: 0,
            cop1ins: 0,
            cop2ins: 0,
            copcon: Copcon(0),
            skip: false,
            cop_list: 1,
            active_in_this_frame: false,
            list_range: [None; 2],
            instructions: 0,
            change_log: RegChangeLog::default(),
            breakpoints: vec![],
            watchpoints: vec![],
            hit: None,
        }
    }

    /// Resets the registers. Debugger state survives.
    pub fn reset(&mut self) {
        let breakpoints = std::mem::take(&mut self.breakpoints);
        let watchpoints = std::mem::take(&mut self.watchpoints);
        *self = Self::new();
        self.breakpoints = breakpoints;
        self.watchpoints = watchpoints;
    }

    pub fn pc(&self) -> Long {
        self.coppc
    }

    pub fn pc0(&self) -> Long {
        self.coppc0
    }

    pub fn cop1lc(&self) -> Long {
        self.cop1lc
    }

    pub fn cop2lc(&self) -> Long {
        self.cop2lc
    }

    pub fn cop_list(&self) -> u8 {
        self.cop_list
    }

    /// Danger bit (COPCON)
    pub fn cdang(&self) -> bool {
        self.copcon.cdang()
    }

    pub fn skip(&self) -> bool {
        self.skip
    }

    pub fn active_in_this_frame(&self) -> bool {
        self.active_in_this_frame
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn list_range(&self, list: u8) -> Option<(Long, Long)> {
        self.list_range[usize::from(list.clamp(1, 2) - 1)]
    }

    pub fn change_log(&self) -> &RegChangeLog {
        &self.change_log
    }

    /// Drains the color register changes recorded so far
    pub fn take_changes(&mut self) -> Vec<changelog::RegChange> {
        self.change_log.take()
    }

    //
    // Register interface
    //

    pub fn poke_copcon(&mut self, value: Word) {
        self.copcon = Copcon(value);
    }

    pub fn poke_cop1lch(&mut self, value: Word) {
        self.cop1lc = set_hi_word(self.cop1lc, value) & PC_MASK;
    }

    pub fn poke_cop1lcl(&mut self, value: Word) {
        self.cop1lc = set_lo_word(self.cop1lc, value & 0xFFFE) & PC_MASK;
    }

    pub fn poke_cop2lch(&mut self, value: Word) {
        self.cop2lc = set_hi_word(self.cop2lc, value) & PC_MASK;
    }

    pub fn poke_cop2lcl(&mut self, value: Word) {
        self.cop2lc = set_lo_word(self.cop2lc, value & 0xFFFE) & PC_MASK;
    }

    pub fn poke_copins(&mut self, value: Word) {
        self.cop1ins = value;
    }

    fn jump_to_list(&mut self, nr: u8) {
        debug_assert!(nr == 1 || nr == 2);
        self.coppc = if nr == 1 { self.cop1lc } else { self.cop2lc };
        self.cop_list = nr;
        trace!("Copper list {} at {:06X}", nr, self.coppc);
    }

    /// Continues execution at the start of list `nr`
    pub fn switch_to_copper_list(&mut self, nr: u8, agnus: &mut Agnus) {
        self.jump_to_list(nr);
        let trigger = align_dma_cycle(agnus.clock());
        agnus
            .sched
            .schedule_abs(EventSlot::Copper, trigger, CopperState::RequestDma.into());
    }

    /// Called at the start of each frame
    pub fn vsync_handler(&mut self, agnus: &mut Agnus) {
        self.list_range = [None; 2];
        agnus
            .sched
            .schedule_rel(EventSlot::Copper, 0, CopperState::Vblank.into());
    }

    /// Wakes up a Copper that is waiting for the blitter
    pub fn blitter_did_terminate(&mut self, agnus: &mut Agnus) {
        if agnus.sched.id(EventSlot::Copper) == EventId::Copper(CopperState::WaitBlit) {
            // The Copper only runs on even cycles
            let delay = if agnus.pos().h % 2 == 1 { dma_cycles(1) } else { 0 };
            agnus.sched.reschedule_rel(EventSlot::Copper, delay);
        }
    }

    fn advance_pc(&mut self) {
        let pc = self.coppc;
        let range = &mut self.list_range[usize::from(self.cop_list - 1)];
        *range = Some(range.map_or((pc, pc), |(lo, hi)| (lo.min(pc), hi.max(pc))));
        self.coppc = (self.coppc + 2) & PC_MASK;
    }

    //
    // Instruction decoding
    //

    pub fn is_move(&self) -> bool {
        self.cop1ins & 1 == 0
    }

    pub fn is_wait(&self) -> bool {
        self.cop1ins & 1 == 1 && self.cop2ins & 1 == 0
    }

    pub fn is_skip(&self) -> bool {
        self.cop1ins & 1 == 1 && self.cop2ins & 1 == 1
    }

    /// Destination register of a MOVE
    pub fn move_reg(&self) -> Word {
        self.cop1ins & 0x1FE
    }

    /// Beam position of a WAIT or SKIP
    pub fn vphp(&self) -> Word {
        self.cop1ins & 0xFFFE
    }

    /// Beam comparison mask of a WAIT or SKIP
    pub fn vmhm(&self) -> Word {
        (self.cop2ins & 0x7FFE) | 0x8001
    }

    /// Blitter finish disable bit
    pub fn bfd(&self) -> bool {
        self.cop2ins & 0x8000 != 0
    }

    /// Returns true if a MOVE to `reg` is not allowed
    pub fn is_illegal_address(&self, reg: Word, revision: AgnusRevision) -> bool {
        let reg = reg & 0x1FE;
        if self.cdang() {
            match revision {
                AgnusRevision::Ocs => reg < 0x40,
                AgnusRevision::Ecs => false,
            }
        } else {
            reg < 0x80
        }
    }

    //
    // Beam comparator
    //

    /// Compares a beam position against a WAIT/SKIP position and mask
    pub fn compare(beam: Beam, waitpos: Word, mask: Word) -> bool {
        let v_beam = (beam.v & 0xFF) as u8;
        let v_wait = (waitpos >> 8) as u8;
        let v_mask = (mask >> 8) as u8 | 0x80;

        if (v_beam & v_mask) < (v_wait & v_mask) {
            return false;
        }
        if (v_beam & v_mask) > (v_wait & v_mask) {
            return true;
        }

        let h_beam = (beam.h & 0xFE) as u8;
        let h_wait = (waitpos & 0xFE) as u8;
        let h_mask = (mask & 0xFE) as u8;
        (h_beam & h_mask) >= (h_wait & h_mask)
    }

    /// Compares a beam position against the current instruction
    pub fn comparator(&self, beam: Beam) -> bool {
        Self::compare(beam, self.vphp(), self.vmhm())
    }

    /// Finds the first position at or after `start` where the current
    /// instruction's comparator triggers, within a frame of `num_lines`.
    pub fn find_match(&self, start: Beam, num_lines: i64) -> Option<Beam> {
        let (waitpos, mask) = (self.vphp(), self.vmhm());
        let v_mask = (mask >> 8) as u8 | 0x80;
        let v_wait = (waitpos >> 8) as u8 & v_mask;

        let mut h_start = start.h;
        for v in start.v..num_lines {
            let v_beam = (v & 0xFF) as u8 & v_mask;
            if v_beam > v_wait {
                return Some(Beam::new(v, h_start));
            }
            if v_beam == v_wait {
                if let Some(h) =
                    (h_start..=HPOS_WAIT_MAX).find(|&h| Self::compare(Beam::new(v, h), waitpos, mask))
                {
                    return Some(Beam::new(v, h));
                }
            }
            h_start = 0;
        }
        None
    }

    //
    // Debugger
    //

    pub fn breakpoints(&self) -> &[Address] {
        &self.breakpoints
    }

    pub fn set_breakpoint(&mut self, addr: Address) {
        if !self.breakpoints.contains(&addr) {
            self.breakpoints.push(addr);
        }
    }

    pub fn clear_breakpoint(&mut self, addr: Address) {
        self.breakpoints.retain(|&a| a != addr);
    }

    pub fn watchpoints(&self) -> &[Word] {
        &self.watchpoints
    }

    pub fn set_watchpoint(&mut self, reg: Word) {
        if !self.watchpoints.contains(&reg) {
            self.watchpoints.push(reg);
        }
    }

    pub fn clear_watchpoint(&mut self, reg: Word) {
        self.watchpoints.retain(|&r| r != reg);
    }

    /// Returns and clears the last debugger hit
    pub fn take_hit(&mut self) -> Option<CopperHit> {
        self.hit.take()
    }
}

impl Debuggable for Copper {
    fn get_debug_properties(&self) -> DebuggableProperties {
        vec![
            dbgprop_long!("COP1LC", self.cop1lc),
            dbgprop_long!("COP2LC", self.cop2lc),
            dbgprop_long!("COPPC", self.coppc0),
            dbgprop_word!("COP1INS", self.cop1ins),
            dbgprop_word!("COP2INS", self.cop2ins),
            dbgprop_udec!("List", self.cop_list),
            dbgprop_bool!("Danger", self.cdang()),
            dbgprop_bool!("Skip", self.skip),
            dbgprop_bool!("Active this frame", self.active_in_this_frame),
            dbgprop_udec!("Instructions", self.instructions),
        ]
    }
}
