use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use super::arbiter::BusOwner;
use super::regs::{Bplcon0, Dmacon};
use crate::amiga::beam::HPOS_CNT;
use crate::scheduler::EventSlot;
use crate::types::Word;

const LINE: usize = HPOS_CNT as usize;

/// Marks the absence of a following entry in the jump table
const NO_NEXT: u8 = u8::MAX;

/// Bitplane fetched at each position of a lores fetch unit
const LORES_UNIT: [u8; 8] = [0, 4, 6, 2, 0, 3, 5, 1];

/// Bitplane fetched at each position of a hires fetch unit
const HIRES_UNIT: [u8; 8] = [4, 2, 3, 1, 4, 2, 3, 1];

/// First and last fetch unit start positions the hardware allows
const DDF_MIN: Word = 0x18;
const DDF_MAX: Word = 0xD8;

/// A DMA transfer scheduled by the allocation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DmaEvent {
    /// Disk DMA, transfer 0..3 of the line
    Disk(u8),
    Audio(u8),
    /// Bitplane fetch, 1-based plane number
    Bitplane(u8),
    /// Sprite fetch, first or second word of the line
    Sprite { nr: u8, second: bool },
}

impl DmaEvent {
    /// Slot that services this event
    pub fn slot(self) -> EventSlot {
        match self {
            Self::Disk(_) => EventSlot::Disk,
            Self::Audio(ch) => EventSlot::audio(ch.into()),
            Self::Bitplane(p) => EventSlot::bitplane(p.into()),
            Self::Sprite { nr, .. } => EventSlot::sprite(nr.into()),
        }
    }

    pub fn owner(self) -> BusOwner {
        match self {
            Self::Disk(_) => BusOwner::Disk,
            Self::Audio(ch) => BusOwner::Audio(ch),
            Self::Bitplane(p) => BusOwner::Bitplane(p),
            Self::Sprite { nr, .. } => BusOwner::Sprite(nr),
        }
    }
}

/// Everything the allocation table depends on. The table is rebuilt
/// whenever this changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaTableConfig {
    pub dmacon: Dmacon,
    pub bplcon0: Bplcon0,
    pub ddfstrt: Word,
    pub ddfstop: Word,
    /// Line lies inside the vertical display window
    pub bpl_line: bool,
}

impl DmaTableConfig {
    /// Only the bits of DMACON that change the table
    pub fn normalized(mut self) -> Self {
        self.dmacon = Dmacon(self.dmacon.0 & 0x033F);
        self
    }
}

/// Per-line DMA cycle allocation with skip-ahead jump table
#[derive(Clone, Serialize, Deserialize)]
pub struct DmaTable {
    #[serde(with = "BigArray")]
    events: [Option<DmaEvent>; LINE],

    /// Next position after h holding an event, or NO_NEXT
    #[serde(with = "BigArray")]
    next: [u8; LINE],

    /// Position of the first event, or NO_NEXT
    first: u8,
}

impl DmaTable {
    pub fn empty() -> Self {
        Self {
            events: [None; LINE],
            next: [NO_NEXT; LINE],
            first: NO_NEXT,
        }
    }

    pub fn build(cfg: &DmaTableConfig) -> Self {
        let mut t = Self::empty();
        let dmacon = cfg.dmacon;

        if dmacon.dskdma() {
            for (i, h) in [0x07, 0x09, 0x0B].into_iter().enumerate() {
                t.events[h] = Some(DmaEvent::Disk(i as u8));
            }
        }
        for ch in 0..4 {
            if dmacon.auddma(ch) {
                t.events[0x0D + 2 * ch] = Some(DmaEvent::Audio(ch as u8));
            }
        }
        if dmacon.sprdma() {
            for nr in 0..8 {
                t.events[0x15 + 4 * nr] = Some(DmaEvent::Sprite {
                    nr: nr as u8,
                    second: false,
                });
                t.events[0x17 + 4 * nr] = Some(DmaEvent::Sprite {
                    nr: nr as u8,
                    second: true,
                });
            }
        }

        let bpu = cfg.bplcon0.bpu();
        if dmacon.bpldma() && cfg.bpl_line && bpu > 0 {
            let strt = (cfg.ddfstrt & 0xF8).max(DDF_MIN);
            let stop = (cfg.ddfstop & 0xF8).min(DDF_MAX);
            let unit = if cfg.bplcon0.hires() {
                &HIRES_UNIT
            } else {
                &LORES_UNIT
            };
            for start in (strt..=stop).step_by(8) {
                for (i, &plane) in unit.iter().enumerate() {
                    if plane != 0 && plane <= bpu {
                        // Bitplanes take precedence over sprites
                        t.events[usize::from(start) + i] = Some(DmaEvent::Bitplane(plane));
                    }
                }
            }
        }

        t.update_jump_table();
        t
    }

    fn update_jump_table(&mut self) {
        let mut next = NO_NEXT;
        for h in (0..LINE).rev() {
            self.next[h] = next;
            if self.events[h].is_some() {
                next = h as u8;
            }
        }
        self.first = next;
    }

    pub fn event(&self, h: usize) -> Option<DmaEvent> {
        self.events[h]
    }

    /// Returns true if a DMA channel owns cycle h
    pub fn is_reserved(&self, h: usize) -> bool {
        self.events[h].is_some()
    }

    /// Positions holding an event at or after `h`, in order
    pub fn iter_from(&self, h: usize) -> impl Iterator<Item = (usize, DmaEvent)> + '_ {
        let start = if h == 0 {
            self.first
        } else if h >= LINE {
            NO_NEXT
        } else if self.events[h].is_some() {
            h as u8
        } else {
            self.next[h]
        };
        std::iter::successors((start != NO_NEXT).then_some(start as usize), |&p| {
            let n = self.next[p];
            (n != NO_NEXT).then_some(n as usize)
        })
        .filter_map(|p| self.events[p].map(|e| (p, e)))
    }

    /// Next position after `h` serviced by `slot`
    pub fn next_for_slot(&self, slot: EventSlot, h: usize) -> Option<(usize, DmaEvent)> {
        self.iter_from(h + 1).find(|(_, e)| e.slot() == slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn cfg(dmacon: u16, bplcon0: u16) -> DmaTableConfig {
        DmaTableConfig {
            dmacon: Dmacon(dmacon | 0x0200),
            bplcon0: Bplcon0(bplcon0),
            ddfstrt: 0x38,
            ddfstop: 0xD0,
            bpl_line: true,
        }
    }

    #[test]
    fn empty_when_disabled() {
        let t = DmaTable::build(&cfg(0x013F, 0x6000).with_master(false));
        assert_eq!(t.iter_from(0).count(), 0);
        assert_eq!(t.first, NO_NEXT);
    }

    impl DmaTableConfig {
        fn with_master(mut self, on: bool) -> Self {
            self.dmacon.set_dmaen(on);
            self
        }
    }

    #[test]
    fn fixed_positions() {
        let t = DmaTable::build(&cfg(0x003F, 0));
        assert_eq!(t.event(0x07), Some(DmaEvent::Disk(0)));
        assert_eq!(t.event(0x0B), Some(DmaEvent::Disk(2)));
        assert_eq!(t.event(0x0D), Some(DmaEvent::Audio(0)));
        assert_eq!(t.event(0x13), Some(DmaEvent::Audio(3)));
        assert_eq!(
            t.event(0x15),
            Some(DmaEvent::Sprite {
                nr: 0,
                second: false
            })
        );
        assert_eq!(
            t.event(0x33),
            Some(DmaEvent::Sprite {
                nr: 7,
                second: true
            })
        );
        // Everything on odd cycles
        assert!(t.iter_from(0).all(|(h, _)| h % 2 == 1));
        assert_eq!(t.iter_from(0).count(), 3 + 4 + 16);
    }

    #[test]
    fn audio_channels_individually() {
        let t = DmaTable::build(&cfg(0x0004, 0));
        assert_eq!(t.iter_from(0).collect_vec(), vec![(0x11, DmaEvent::Audio(2))]);
    }

    #[test]
    fn lores_fetch_units() {
        let t = DmaTable::build(&cfg(0x0100, 0x6000));
        // One fetch unit per 8 cycles from $38 to $D7
        let unit = (0x38..0x40).map(|h| t.event(h)).collect_vec();
        assert_eq!(
            unit,
            vec![
                None,
                Some(DmaEvent::Bitplane(4)),
                Some(DmaEvent::Bitplane(6)),
                Some(DmaEvent::Bitplane(2)),
                None,
                Some(DmaEvent::Bitplane(3)),
                Some(DmaEvent::Bitplane(5)),
                Some(DmaEvent::Bitplane(1)),
            ]
        );
        assert_eq!(t.event(0x37), None);
        assert_eq!(t.event(0xD7), Some(DmaEvent::Bitplane(1)));
        assert_eq!(t.event(0xD8), None);
        assert_eq!(t.iter_from(0).count(), 20 * 6);
    }

    #[test]
    fn hires_two_planes() {
        let t = DmaTable::build(&cfg(0x0100, 0x8000 | 0x2000));
        let planes = (0x38..0x40).map(|h| t.event(h)).collect_vec();
        assert_eq!(
            planes,
            vec![
                None,
                Some(DmaEvent::Bitplane(2)),
                None,
                Some(DmaEvent::Bitplane(1)),
                None,
                Some(DmaEvent::Bitplane(2)),
                None,
                Some(DmaEvent::Bitplane(1)),
            ]
        );
    }

    #[test]
    fn bitplanes_outside_window() {
        let mut c = cfg(0x0100, 0x1000);
        c.bpl_line = false;
        assert_eq!(DmaTable::build(&c).iter_from(0).count(), 0);
    }

    #[test]
    fn ddf_clamped() {
        let mut c = cfg(0x0100, 0x1000);
        c.ddfstrt = 0x00;
        c.ddfstop = 0xFF;
        let t = DmaTable::build(&c);
        let positions = t.iter_from(0).map(|(h, _)| h).collect_vec();
        assert_eq!(positions.first(), Some(&0x1F));
        assert_eq!(positions.last(), Some(&0xDF));
    }

    #[test]
    fn bitplanes_beat_sprites() {
        let mut c = cfg(0x0120, 0x6000);
        c.ddfstrt = 0x18;
        let t = DmaTable::build(&c);
        // $1D is the first word of sprite 2, but also L3 of the first fetch unit
        assert_eq!(t.event(0x1E), Some(DmaEvent::Bitplane(5)));
        assert_eq!(t.event(0x1D), Some(DmaEvent::Bitplane(3)));
        assert_eq!(t.event(0x15), Some(DmaEvent::Sprite { nr: 0, second: false }));
    }

    #[test]
    fn jump_table() {
        let t = DmaTable::build(&cfg(0x0010, 0));
        assert_eq!(t.iter_from(0).map(|(h, _)| h).collect_vec(), vec![7, 9, 11]);
        assert_eq!(t.iter_from(8).map(|(h, _)| h).collect_vec(), vec![9, 11]);
        assert_eq!(t.iter_from(9).map(|(h, _)| h).collect_vec(), vec![9, 11]);
        assert_eq!(t.iter_from(12).count(), 0);
        assert_eq!(t.next_for_slot(EventSlot::Disk, 7), Some((9, DmaEvent::Disk(1))));
        assert_eq!(t.next_for_slot(EventSlot::Disk, 11), None);
    }

    #[test]
    fn next_for_slot_skips_other_channels() {
        let t = DmaTable::build(&cfg(0x0120, 0x1000));
        assert_eq!(
            t.next_for_slot(EventSlot::Bitplane1, 0x3F),
            Some((0x47, DmaEvent::Bitplane(1)))
        );
        assert_eq!(
            t.next_for_slot(EventSlot::Sprite0, 0x15),
            Some((0x17, DmaEvent::Sprite { nr: 0, second: true }))
        );
    }
}
