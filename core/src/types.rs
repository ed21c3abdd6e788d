use proc_bitfield::bitfield;
use serde::{Deserialize, Serialize};

pub type Byte = u8;
pub type Word = u16;
pub type Long = u32;

bitfield! {
    /// General purpose 16-bit field
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Field16(pub u16): Debug, FromStorage, IntoStorage, DerefStorage {
        pub msb: u8 @ 8..16,
        pub lsb: u8 @ 0..8,
    }
}

/// Replaces the upper word of a 32-bit register (xxxH registers)
pub const fn set_hi_word(reg: Long, val: Word) -> Long {
    (reg & 0x0000_FFFF) | ((val as Long) << 16)
}

/// Replaces the lower word of a 32-bit register (xxxL registers)
pub const fn set_lo_word(reg: Long, val: Word) -> Long {
    (reg & 0xFFFF_0000) | val as Long
}

/// A self-clearing latch for events etc.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LatchingEvent {
    val: bool,
}

impl LatchingEvent {
    /// Returns the current value and clears the event.
    pub fn get_clear(&mut self) -> bool {
        let v = self.val;
        self.val = false;
        v
    }

    /// Sets the event.
    pub fn set(&mut self) {
        self.val = true;
    }

    /// Peeks at the event without clearing it
    pub fn peek(&self) -> bool {
        self.val
    }
}
