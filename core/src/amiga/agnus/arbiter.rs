use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use super::regs::Dmacon;
use crate::amiga::beam::HPOS_CNT;
use crate::types::Word;

const LINE: usize = HPOS_CNT as usize;

/// Owner of a bus cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BusOwner {
    #[default]
    None,
    Cpu,
    Refresh,
    Disk,
    Audio(u8),
    /// Bitplane fetch (1-based plane number)
    Bitplane(u8),
    Sprite(u8),
    Copper,
    Blitter,
    /// Cycle unusable for anyone
    Blocked,
}

impl BusOwner {
    pub const STAT_KINDS: usize = 10;

    /// Index into the usage statistics
    pub const fn stat_index(self) -> usize {
        match self {
            Self::None => 0,
            Self::Cpu => 1,
            Self::Refresh => 2,
            Self::Disk => 3,
            Self::Audio(_) => 4,
            Self::Bitplane(_) => 5,
            Self::Sprite(_) => 6,
            Self::Copper => 7,
            Self::Blitter => 8,
            Self::Blocked => 9,
        }
    }

    pub const fn stat_name(idx: usize) -> &'static str {
        match idx {
            0 => "Free",
            1 => "CPU",
            2 => "Refresh",
            3 => "Disk",
            4 => "Audio",
            5 => "Bitplane",
            6 => "Sprite",
            7 => "Copper",
            8 => "Blitter",
            _ => "Blocked",
        }
    }

    /// Owners whose cycles are dictated by the DMA allocation table
    pub const fn is_table_dma(self) -> bool {
        matches!(
            self,
            Self::Disk | Self::Audio(_) | Self::Bitplane(_) | Self::Sprite(_)
        )
    }
}

/// Bus cycle usage counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusStats {
    /// Cycles per owner kind in the frame in progress
    pub frame: [i64; BusOwner::STAT_KINDS],
    /// Cycles per owner kind in the last completed frame
    pub last_frame: [i64; BusOwner::STAT_KINDS],
    /// Cycles per owner kind since reset
    pub total: [i64; BusOwner::STAT_KINDS],
}

impl BusStats {
    fn count(&mut self, owner: BusOwner) {
        self.frame[owner.stat_index()] += 1;
        self.total[owner.stat_index()] += 1;
    }
}

/// Bus ownership of the current line
#[derive(Clone, Serialize, Deserialize)]
pub struct BusArbiter {
    #[serde(with = "BigArray")]
    owner: [BusOwner; LINE],

    /// Data transferred per cycle
    #[serde(with = "BigArray")]
    value: [Word; LINE],

    pub stats: BusStats,

    /// CPU has been denied the bus and is waiting (BLS)
    pub cpu_waiting: bool,

    /// Records the bus owners of every line of a frame when enabled
    #[serde(skip)]
    debugger: Option<DmaDebugger>,
}

/// Per-frame bus owner history for DMA visualisation
#[derive(Clone, Default)]
pub struct DmaDebugger {
    current: Vec<Vec<BusOwner>>,
    completed: Vec<Vec<BusOwner>>,
}

impl BusArbiter {
    /// DMA cycles used by memory refresh
    pub const REFRESH_CYCLES: [usize; 4] = [0x01, 0x03, 0x05, 0xE2];

    pub fn new() -> Self {
        let mut arb = Self {
            owner: [BusOwner::None; LINE],
            value: [0; LINE],
            stats: BusStats::default(),
            cpu_waiting: false,
            debugger: None,
        };
        arb.begin_line();
        arb
    }

    pub fn owner(&self, h: usize) -> BusOwner {
        self.owner[h]
    }

    pub fn value(&self, h: usize) -> Word {
        self.value[h]
    }

    pub fn owners(&self) -> &[BusOwner] {
        &self.owner
    }

    /// Tests whether `owner` would get cycle `h`.
    ///
    /// `reserved` tells whether the DMA allocation table reserves the cycle
    /// for a DMA channel. A claimed cycle stays with its first owner.
    pub fn is_free(&self, h: usize, owner: BusOwner, reserved: bool, dmacon: Dmacon) -> bool {
        if self.owner[h] != BusOwner::None {
            return false;
        }
        match owner {
            BusOwner::Cpu => !reserved,
            BusOwner::Copper => !reserved && dmacon.copdma(),
            BusOwner::Blitter => {
                !reserved && dmacon.bltdma() && !(self.cpu_waiting && !dmacon.bltpri())
            }
            _ => true,
        }
    }

    /// Claims cycle `h` for `owner` if possible.
    pub fn allocate(&mut self, h: usize, owner: BusOwner, reserved: bool, dmacon: Dmacon) -> bool {
        let free = self.is_free(h, owner, reserved, dmacon);
        if free {
            self.claim(h, owner);
        }
        if owner == BusOwner::Cpu {
            self.cpu_waiting = !free;
        }
        free
    }

    fn claim(&mut self, h: usize, owner: BusOwner) {
        debug_assert_eq!(self.owner[h], BusOwner::None);
        self.owner[h] = owner;
        self.stats.count(owner);
    }

    /// Records the word transferred in a claimed cycle
    pub fn record_value(&mut self, h: usize, value: Word) {
        self.value[h] = value;
    }

    /// Clears the line and claims the refresh cycles
    pub fn begin_line(&mut self) {
        self.owner.fill(BusOwner::None);
        self.value.fill(0);
        for h in Self::REFRESH_CYCLES {
            self.claim(h, BusOwner::Refresh);
        }
    }

    /// Archives the finished line, if the DMA debugger is enabled
    pub fn end_line(&mut self) {
        if let Some(dbg) = self.debugger.as_mut() {
            dbg.current.push(self.owner.to_vec());
        }
    }

    pub fn end_frame(&mut self) {
        self.stats.last_frame = self.stats.frame;
        self.stats.frame = [0; BusOwner::STAT_KINDS];
        if let Some(dbg) = self.debugger.as_mut() {
            dbg.completed = std::mem::take(&mut dbg.current);
        }
    }

    pub fn set_debugger(&mut self, enabled: bool) {
        if enabled != self.debugger.is_some() {
            self.debugger = enabled.then(DmaDebugger::default);
        }
    }

    pub fn debugger_enabled(&self) -> bool {
        self.debugger.is_some()
    }

    /// Bus owners of every line of the last completed frame
    pub fn debug_frame(&self) -> Option<&[Vec<BusOwner>]> {
        self.debugger.as_ref().map(|d| d.completed.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DMA_ON: Dmacon = Dmacon(0x0200 | 0x0080 | 0x0040);

    #[test]
    fn refresh_claimed() {
        let arb = BusArbiter::new();
        for h in BusArbiter::REFRESH_CYCLES {
            assert_eq!(arb.owner(h), BusOwner::Refresh);
            assert!(!arb.is_free(h, BusOwner::Copper, false, DMA_ON));
            assert!(!arb.is_free(h, BusOwner::Disk, false, DMA_ON));
        }
        assert_eq!(arb.stats.frame[BusOwner::Refresh.stat_index()], 4);
    }

    #[test]
    fn exclusive_claims() {
        let mut arb = BusArbiter::new();
        assert!(arb.allocate(0x40, BusOwner::Copper, false, DMA_ON));
        assert!(!arb.allocate(0x40, BusOwner::Copper, false, DMA_ON));
        assert!(!arb.allocate(0x40, BusOwner::Cpu, false, DMA_ON));
        assert!(arb.cpu_waiting);
    }

    #[test]
    fn first_claim_wins() {
        let mut arb = BusArbiter::new();
        assert!(arb.allocate(0x40, BusOwner::Copper, false, DMA_ON));
        for owner in [
            BusOwner::Blitter,
            BusOwner::Bitplane(1),
            BusOwner::Sprite(0),
            BusOwner::Audio(0),
            BusOwner::Disk,
        ] {
            assert!(!arb.is_free(0x40, owner, false, DMA_ON));
            assert!(!arb.allocate(0x40, owner, true, DMA_ON));
        }
        assert_eq!(arb.owner(0x40), BusOwner::Copper);
        assert_eq!(arb.stats.frame[BusOwner::Copper.stat_index()], 1);
        assert_eq!(arb.stats.frame[BusOwner::Blitter.stat_index()], 0);
    }

    #[test]
    fn copper_needs_dma() {
        let arb = BusArbiter::new();
        assert!(!arb.is_free(0x40, BusOwner::Copper, false, Dmacon(0x0200)));
        assert!(!arb.is_free(0x40, BusOwner::Copper, false, Dmacon(0x0080)));
        assert!(arb.is_free(0x40, BusOwner::Copper, false, DMA_ON));
    }

    #[test]
    fn reserved_cycles() {
        let arb = BusArbiter::new();
        assert!(!arb.is_free(0x41, BusOwner::Copper, true, DMA_ON));
        assert!(!arb.is_free(0x41, BusOwner::Cpu, true, DMA_ON));
        assert!(!arb.is_free(0x41, BusOwner::Blitter, true, DMA_ON));
        assert!(arb.is_free(0x41, BusOwner::Sprite(0), true, DMA_ON));
    }

    #[test]
    fn blitter_needs_dma() {
        let mut arb = BusArbiter::new();
        assert!(!arb.is_free(0x50, BusOwner::Blitter, false, Dmacon(0x0200)));
        assert!(!arb.is_free(0x50, BusOwner::Blitter, false, Dmacon(0x0040)));
        assert!(arb.is_free(0x50, BusOwner::Blitter, false, DMA_ON));

        // Waiting CPU gets precedence unless blitter nasty is set
        arb.cpu_waiting = true;
        assert!(!arb.is_free(0x50, BusOwner::Blitter, false, DMA_ON));
        assert!(arb.is_free(0x50, BusOwner::Blitter, false, Dmacon(DMA_ON.0 | 0x0400)));
    }

    #[test]
    fn line_reset() {
        let mut arb = BusArbiter::new();
        arb.set_debugger(true);
        assert!(arb.allocate(0x20, BusOwner::Copper, false, DMA_ON));
        arb.record_value(0x20, 0x1234);
        arb.end_line();
        arb.begin_line();
        assert_eq!(arb.owner(0x20), BusOwner::None);
        assert_eq!(arb.value(0x20), 0);
        arb.end_frame();
        let frame = arb.debug_frame().unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0][0x20], BusOwner::Copper);
        assert_eq!(arb.stats.last_frame[BusOwner::Copper.stat_index()], 1);
        assert_eq!(arb.stats.frame[BusOwner::Copper.stat_index()], 0);
    }
}
