//! Blitter bus occupancy
//!
//! Only the timing side of the blitter is modelled: a blit started through
//! BLTSIZE occupies one bus cycle per word until it is done.

use log::*;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::debuggable::{Debuggable, DebuggableProperties, DebuggableProperty, DebuggablePropertyValue};
use crate::scheduler::EventId;
use crate::types::Word;
use crate::{dbgprop_bool, dbgprop_udec, dbgprop_word};

/// Events of the blitter slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BlitterEvent {
    /// Blit was started, waiting for blitter DMA
    Start,
    /// Transfer one word
    Execute,
}

impl From<BlitterEvent> for EventId {
    fn from(e: BlitterEvent) -> Self {
        Self::Blitter(e)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Blitter {
    bltsize: Word,
    /// Words left in the running blit
    remaining: u32,
    active: bool,
    blits: u64,
}

impl Blitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn blits(&self) -> u64 {
        self.blits
    }

    /// Words moved by a blit of the given BLTSIZE
    pub fn words(bltsize: Word) -> u32 {
        let w = match u32::from(bltsize & 0x3F) {
            0 => 64,
            w => w,
        };
        let h = match u32::from(bltsize >> 6) {
            0 => 1024,
            h => h,
        };
        w * h
    }

    /// Starts a blit. A blit in progress is restarted.
    pub fn start(&mut self, bltsize: Word) {
        if self.active {
            warn!("BLTSIZE written while blitter busy");
        }
        self.bltsize = bltsize;
        self.remaining = Self::words(bltsize);
        self.active = true;
        self.blits += 1;
        trace!("Blit {:04X}: {} words", bltsize, self.remaining);
    }

    /// Accounts for one transferred word. Returns true if the blit finished.
    pub fn word_done(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.active = false;
            return true;
        }
        false
    }
}

impl Debuggable for Blitter {
    fn get_debug_properties(&self) -> DebuggableProperties {
        vec![
            dbgprop_bool!("Busy", self.active),
            dbgprop_word!("BLTSIZE", self.bltsize),
            dbgprop_udec!("Remaining", self.remaining),
            dbgprop_udec!("Blits", self.blits),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_decoding() {
        assert_eq!(Blitter::words((4 << 6) | 10), 40);
        assert_eq!(Blitter::words(0x0001), 1024);
        assert_eq!(Blitter::words(1 << 6), 64);
        assert_eq!(Blitter::words(0), 64 * 1024);
    }

    #[test]
    fn runs_to_completion() {
        let mut b = Blitter::new();
        b.start((1 << 6) | 2);
        assert!(b.is_active());
        assert!(!b.word_done());
        assert!(b.word_done());
        assert!(!b.is_active());
        assert_eq!(b.blits(), 1);
    }
}
