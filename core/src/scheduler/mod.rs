//! Time-slot based event scheduler
//!
//! Every hardware actor owns one slot which holds the tick at which its next
//! event fires, which event that is and a small payload. Slots are serviced
//! in ascending trigger order and, for equal triggers, in ascending slot
//! order. The slot order is part of the hardware model: actors that compete
//! for the same bus cycle are resolved by who gets serviced first.

use std::fmt;

use itertools::Itertools;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::amiga::agnus::DmaEvent;
use crate::amiga::blitter::BlitterEvent;
use crate::amiga::copper::CopperState;
use crate::debuggable::{Debuggable, DebuggableProperties, DebuggableProperty, DebuggablePropertyValue};
use crate::tickable::{NEVER, Ticks};
use crate::{dbgprop_group, dbgprop_sdec, dbgprop_string};

/// Event slots, in order of priority
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    FromPrimitive,
    EnumIter,
    EnumCount,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum EventSlot {
    /// Line and frame sequencing
    Raster,
    Disk,
    Audio0,
    Audio1,
    Audio2,
    Audio3,
    Bitplane1,
    Bitplane2,
    Bitplane3,
    Bitplane4,
    Bitplane5,
    Bitplane6,
    Sprite0,
    Sprite1,
    Sprite2,
    Sprite3,
    Sprite4,
    Sprite5,
    Sprite6,
    Sprite7,
    Copper,
    Blitter,
    CpuSync,
    /// Wakeup slot for all secondary slots below
    Secondary,

    // Secondary slots
    RegWrite,
    Inspection,
}

pub const SLOT_COUNT: usize = EventSlot::COUNT;

impl EventSlot {
    pub fn audio(channel: usize) -> Self {
        debug_assert!(channel < 4);
        Self::from_index(Self::Audio0 as usize + channel)
    }

    /// Bitplane slot for (1-based) bitplane `plane`
    pub fn bitplane(plane: usize) -> Self {
        debug_assert!((1..=6).contains(&plane));
        Self::from_index(Self::Bitplane1 as usize + plane - 1)
    }

    pub fn sprite(nr: usize) -> Self {
        debug_assert!(nr < 8);
        Self::from_index(Self::Sprite0 as usize + nr)
    }

    fn from_index(idx: usize) -> Self {
        num_traits::FromPrimitive::from_usize(idx).unwrap_or(Self::Secondary)
    }

    /// Secondary slots are only looked at after the `Secondary` slot fired.
    pub fn is_secondary(self) -> bool {
        self > Self::Secondary
    }

    /// All DMA channel slots that are driven by the DMA allocation table
    pub fn dma_slots() -> impl Iterator<Item = Self> {
        Self::iter().filter(|s| (Self::Disk..=Self::Sprite7).contains(s))
    }
}

impl fmt::Display for EventSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &'static str = self.into();
        write!(f, "{}", s)
    }
}

/// Identifies the event that fires in a slot. Each actor has its own
/// family of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventId {
    #[default]
    None,
    /// Start of a new line
    Hsync,
    /// Table-driven DMA transfer
    Dma(DmaEvent),
    Copper(CopperState),
    Blitter(BlitterEvent),
    /// CPU waiting for the bus
    CpuWakeup,
    /// Wakeup for the secondary slots
    SecTrigger,
    /// Apply pending register writes
    RegWrite,
    /// Refresh the inspection snapshot
    Inspect,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "-"),
            Self::Dma(e) => write!(f, "{:?}", e),
            Self::Copper(s) => write!(f, "COP_{}", s),
            Self::Blitter(b) => write!(f, "BLT_{:?}", b),
            _ => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Tick at which the event fires
    pub trigger: Ticks,
    pub id: EventId,
    /// Event payload
    pub data: i64,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            trigger: NEVER,
            id: EventId::None,
            data: 0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Scheduler {
    /// Master clock
    clock: Ticks,

    slots: [Slot; SLOT_COUNT],

    /// Lower bound of all primary triggers
    next_trigger: Ticks,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            clock: 0,
            slots: [Slot::default(); SLOT_COUNT],
            next_trigger: NEVER,
        }
    }

    /// Clears all slots and the clock
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn clock(&self) -> Ticks {
        self.clock
    }

    pub fn slot(&self, slot: EventSlot) -> &Slot {
        &self.slots[slot as usize]
    }

    pub fn trigger(&self, slot: EventSlot) -> Ticks {
        self.slots[slot as usize].trigger
    }

    pub fn id(&self, slot: EventSlot) -> EventId {
        self.slots[slot as usize].id
    }

    pub fn data(&self, slot: EventSlot) -> i64 {
        self.slots[slot as usize].data
    }

    /// Returns true if the slot holds an event, scheduled or parked.
    pub fn has_event(&self, slot: EventSlot) -> bool {
        self.id(slot) != EventId::None
    }

    /// Returns true if the slot holds an event that will eventually fire.
    pub fn is_pending(&self, slot: EventSlot) -> bool {
        self.trigger(slot) != NEVER
    }

    pub fn schedule_abs(&mut self, slot: EventSlot, tick: Ticks, id: EventId) {
        self.set_trigger(slot, tick);
        self.slots[slot as usize].id = id;
    }

    pub fn schedule_abs_with(&mut self, slot: EventSlot, tick: Ticks, id: EventId, data: i64) {
        self.schedule_abs(slot, tick, id);
        self.slots[slot as usize].data = data;
    }

    pub fn schedule_rel(&mut self, slot: EventSlot, delta: Ticks, id: EventId) {
        self.schedule_abs(slot, self.clock + delta, id);
    }

    pub fn schedule_rel_with(&mut self, slot: EventSlot, delta: Ticks, id: EventId, data: i64) {
        self.schedule_abs_with(slot, self.clock + delta, id, data);
    }

    /// Schedules relative to the current trigger of the slot
    pub fn schedule_inc(&mut self, slot: EventSlot, delta: Ticks, id: EventId) {
        let base = self.trigger(slot);
        debug_assert_ne!(base, NEVER);
        self.schedule_abs(slot, base.saturating_add(delta), id);
    }

    /// Moves the trigger, keeping event and payload
    pub fn reschedule_abs(&mut self, slot: EventSlot, tick: Ticks) {
        self.set_trigger(slot, tick);
    }

    pub fn reschedule_rel(&mut self, slot: EventSlot, delta: Ticks) {
        self.set_trigger(slot, self.clock + delta);
    }

    pub fn cancel(&mut self, slot: EventSlot) {
        self.slots[slot as usize] = Slot::default();
    }

    fn set_trigger(&mut self, slot: EventSlot, tick: Ticks) {
        debug_assert!(
            tick >= self.clock,
            "{} scheduled at {} which is before {}",
            slot,
            tick,
            self.clock
        );
        let tick = tick.max(self.clock);

        self.slots[slot as usize].trigger = tick;
        self.next_trigger = self.next_trigger.min(tick);

        if slot.is_secondary() {
            let sec = &mut self.slots[EventSlot::Secondary as usize];
            if tick < sec.trigger {
                sec.trigger = tick;
                sec.id = EventId::SecTrigger;
            }
        }
    }

    /// Finds the primary slot with the lowest trigger, lowest slot number first.
    fn primary_min(&self) -> (EventSlot, Ticks) {
        let primaries = &self.slots[..=EventSlot::Secondary as usize];
        let idx = primaries
            .iter()
            .position_min_by_key(|s| s.trigger)
            .unwrap_or_default();
        (EventSlot::from_index(idx), primaries[idx].trigger)
    }

    fn update_secondary_trigger(&mut self) {
        let next = self.slots[EventSlot::Secondary as usize + 1..]
            .iter()
            .map(|s| s.trigger)
            .min()
            .unwrap_or(NEVER);
        let sec = &mut self.slots[EventSlot::Secondary as usize];
        sec.trigger = next;
        sec.id = if next == NEVER {
            EventId::None
        } else {
            EventId::SecTrigger
        };
    }

    /// Moves the clock to the next event due at or before `target` and
    /// returns it, or returns None if nothing is due. The caller dispatches
    /// the returned event; servicing is complete once the handler has
    /// rescheduled or cancelled the slot.
    pub fn next_due(&mut self, target: Ticks) -> Option<(EventSlot, Slot)> {
        loop {
            if self.next_trigger > target {
                return None;
            }

            let (slot, trigger) = self.primary_min();
            self.next_trigger = trigger;
            if trigger > target {
                return None;
            }
            self.clock = self.clock.max(trigger);

            if slot != EventSlot::Secondary {
                return Some((slot, self.slots[slot as usize]));
            }

            let clock = self.clock;
            let due = self.slots[EventSlot::Secondary as usize + 1..]
                .iter()
                .position_min_by_key(|s| s.trigger)
                .filter(|&i| self.slots[EventSlot::Secondary as usize + 1 + i].trigger <= clock);
            match due {
                Some(i) => {
                    let slot = EventSlot::from_index(EventSlot::Secondary as usize + 1 + i);
                    return Some((slot, self.slots[slot as usize]));
                }
                None => self.update_secondary_trigger(),
            }
        }
    }

    /// Moves the clock to `target` once all events up to it were serviced.
    pub fn finish(&mut self, target: Ticks) {
        debug_assert!(target >= self.clock, "clock moved backwards");
        self.clock = self.clock.max(target);
    }

    /// Services all events up to and including `target` through `handler`,
    /// then moves the clock to `target`.
    pub fn advance_to<F>(&mut self, target: Ticks, mut handler: F)
    where
        F: FnMut(&mut Self, EventSlot, Slot),
    {
        while let Some((slot, ev)) = self.next_due(target) {
            handler(self, slot, ev);
        }
        self.finish(target);
    }
}

impl Debuggable for Scheduler {
    fn get_debug_properties(&self) -> DebuggableProperties {
        let mut result = vec![dbgprop_sdec!("Clock", self.clock)];
        result.extend(EventSlot::iter().filter(|&s| self.has_event(s)).map(|s| {
            let slot = self.slot(s);
            dbgprop_group!(
                s.to_string(),
                vec![
                    dbgprop_string!("Event", slot.id.to_string()),
                    dbgprop_sdec!(
                        "Trigger",
                        if slot.trigger == NEVER {
                            -1
                        } else {
                            slot.trigger
                        }
                    ),
                    dbgprop_sdec!("Data", slot.data),
                ]
            )
        }));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(n: i64) -> (EventId, i64) {
        (EventId::Inspect, n)
    }

    #[test]
    fn tie_break_by_slot() {
        let mut s = Scheduler::new();
        s.schedule_abs(EventSlot::Audio3, 100, EventId::Hsync);
        s.schedule_abs(EventSlot::Audio0, 100, EventId::Hsync);

        let mut order = vec![];
        s.advance_to(200, |s, slot, _| {
            order.push((slot, s.clock()));
            s.cancel(slot);
        });
        assert_eq!(order, vec![(EventSlot::Audio0, 100), (EventSlot::Audio3, 100)]);
        assert_eq!(s.clock(), 200);
    }

    #[test]
    fn tie_break_any_order() {
        // Slot order decides regardless of the order events were scheduled in
        let pairs = [
            (EventSlot::Disk, EventSlot::Copper),
            (EventSlot::Copper, EventSlot::Blitter),
            (EventSlot::Raster, EventSlot::Sprite7),
            (EventSlot::CpuSync, EventSlot::RegWrite),
        ];
        for (a, b) in pairs {
            for swap in [false, true] {
                let mut s = Scheduler::new();
                let (first, second) = if swap { (b, a) } else { (a, b) };
                s.schedule_abs(first, 50, EventId::Hsync);
                s.schedule_abs(second, 50, EventId::Hsync);

                let mut order = vec![];
                s.advance_to(50, |s, slot, _| {
                    order.push(slot);
                    s.cancel(slot);
                });
                assert_eq!(order, vec![a, b]);
            }
        }
    }

    #[test]
    fn monotonic() {
        let mut s = Scheduler::new();
        s.schedule_abs(EventSlot::Raster, 10, EventId::Hsync);
        let mut last = 0;
        for target in [0, 5, 5, 17, 100, 1000] {
            s.advance_to(target, |s, slot, _| {
                assert!(s.clock() >= last);
                last = s.clock();
                s.schedule_rel(slot, 7, EventId::Hsync);
            });
            assert!(s.clock() >= last);
            assert_eq!(s.clock(), target);
            last = target;
        }
    }

    #[test]
    fn handler_chain() {
        let mut s = Scheduler::new();
        s.schedule_abs_with(EventSlot::Copper, 0, EventId::Inspect, 0);

        let mut fired = vec![];
        s.advance_to(35, |s, slot, e| {
            fired.push(s.clock());
            s.schedule_rel_with(slot, 10, e.id, e.data + 1);
        });
        assert_eq!(fired, vec![0, 10, 20, 30]);
        assert_eq!(s.data(EventSlot::Copper), 4);
        assert_eq!(s.trigger(EventSlot::Copper), 40);
    }

    #[test]
    fn no_auto_reschedule() {
        let mut s = Scheduler::new();
        s.schedule_abs(EventSlot::Disk, 10, EventId::Hsync);

        let mut count = 0;
        s.advance_to(100, |s, slot, _| {
            count += 1;
            s.reschedule_abs(slot, NEVER);
        });
        assert_eq!(count, 1);
        assert!(s.has_event(EventSlot::Disk));
        assert!(!s.is_pending(EventSlot::Disk));
    }

    #[test]
    fn secondary_wakeup() {
        let mut s = Scheduler::new();
        s.schedule_abs(EventSlot::Inspection, 500, EventId::Inspect);
        assert_eq!(s.trigger(EventSlot::Secondary), 500);
        s.schedule_abs(EventSlot::RegWrite, 300, EventId::RegWrite);
        assert_eq!(s.trigger(EventSlot::Secondary), 300);
        // Later secondary does not raise it
        s.schedule_abs(EventSlot::Inspection, 400, EventId::Inspect);
        assert_eq!(s.trigger(EventSlot::Secondary), 300);

        let mut order = vec![];
        s.advance_to(1000, |s, slot, _| {
            assert_ne!(slot, EventSlot::Secondary);
            order.push((slot, s.clock()));
            s.cancel(slot);
        });
        assert_eq!(
            order,
            vec![(EventSlot::RegWrite, 300), (EventSlot::Inspection, 400)]
        );
        assert!(!s.has_event(EventSlot::Secondary));
    }

    #[test]
    fn secondary_after_primary_on_tie() {
        let mut s = Scheduler::new();
        s.schedule_abs(EventSlot::Inspection, 20, EventId::Inspect);
        s.schedule_abs(EventSlot::CpuSync, 20, EventId::CpuWakeup);

        let mut order = vec![];
        s.advance_to(20, |s, slot, _| {
            order.push(slot);
            s.cancel(slot);
        });
        assert_eq!(order, vec![EventSlot::CpuSync, EventSlot::Inspection]);
    }

    #[test]
    fn cancel_and_reschedule() {
        let mut s = Scheduler::new();
        let (id, data) = ev(5);
        s.schedule_abs_with(EventSlot::Blitter, 40, id, data);
        s.reschedule_rel(EventSlot::Blitter, 60);
        assert_eq!(s.trigger(EventSlot::Blitter), 60);
        assert_eq!(s.data(EventSlot::Blitter), 5);
        s.schedule_inc(EventSlot::Blitter, 8, EventId::Hsync);
        assert_eq!(s.trigger(EventSlot::Blitter), 68);
        assert_eq!(s.data(EventSlot::Blitter), 5);

        s.cancel(EventSlot::Blitter);
        assert_eq!(*s.slot(EventSlot::Blitter), Slot::default());

        let mut fired = false;
        s.advance_to(1000, |_, _, _| fired = true);
        assert!(!fired);
    }

    #[test]
    fn slot_helpers() {
        assert_eq!(EventSlot::audio(2), EventSlot::Audio2);
        assert_eq!(EventSlot::bitplane(1), EventSlot::Bitplane1);
        assert_eq!(EventSlot::bitplane(6), EventSlot::Bitplane6);
        assert_eq!(EventSlot::sprite(7), EventSlot::Sprite7);
        assert!(EventSlot::Inspection.is_secondary());
        assert!(!EventSlot::Secondary.is_secondary());
        assert_eq!(EventSlot::dma_slots().count(), 19);
    }
}
