//! Read-only views of the chipset for other threads

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::amiga::agnus::arbiter::BusOwner;
use crate::amiga::beam::Beam;
use crate::amiga::chipset::Chipset;
use crate::bus::ChipMemory;
use crate::scheduler::EventSlot;
use crate::tickable::{NEVER, Ticks};
use crate::types::{Long, Word};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub slot: EventSlot,
    pub event: String,
    pub trigger: Ticks,
    /// Beam position of the trigger, if it falls in the current frame
    pub beam: Option<Beam>,
}

/// Copy of the chipset state, refreshed periodically and on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionSnapshot {
    pub clock: Ticks,
    pub frame: i64,
    pub beam: Beam,
    pub slots: Vec<SlotInfo>,
    /// Bus owners of the line in progress
    pub bus_owners: Vec<BusOwner>,
    pub bus_values: Vec<Word>,
    pub copper_pc: Long,
    pub copper_list: u8,
    pub copper_active: bool,
    pub blitter_active: bool,
    pub pending_writes: usize,
}

impl InspectionSnapshot {
    pub fn capture<M: ChipMemory>(chipset: &Chipset<M>) -> Self {
        let agnus = &chipset.agnus;
        let sched = agnus.scheduler();
        let frame_end = agnus.beam_to_clock(Beam::new(agnus.frame().num_lines(), 0));

        let slots = EventSlot::iter()
            .filter(|&s| sched.has_event(s))
            .map(|s| {
                let trigger = sched.trigger(s);
                SlotInfo {
                    slot: s,
                    event: sched.id(s).to_string(),
                    trigger,
                    beam: (trigger != NEVER && trigger < frame_end)
                        .then(|| agnus.clock_to_beam(trigger)),
                }
            })
            .collect();

        let owners = agnus.arbiter.owners();
        Self {
            clock: agnus.clock(),
            frame: agnus.frame().nr,
            beam: agnus.pos(),
            slots,
            bus_owners: owners.to_vec(),
            bus_values: (0..owners.len()).map(|h| agnus.arbiter.value(h)).collect(),
            copper_pc: chipset.copper.pc0(),
            copper_list: chipset.copper.cop_list(),
            copper_active: chipset.copper.active_in_this_frame(),
            blitter_active: chipset.blitter.is_active(),
            pending_writes: agnus.pending_writes().len(),
        }
    }
}
