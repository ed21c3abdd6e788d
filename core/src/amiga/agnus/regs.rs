use proc_bitfield::bitfield;
use serde::{Deserialize, Serialize};

use crate::types::Word;

bitfield! {
    /// DMA control register (DMACON)
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Dmacon(pub u16): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Audio channel enables
        pub auden: u8 @ 0..4,
        pub dsken: bool @ 4,
        pub spren: bool @ 5,
        pub blten: bool @ 6,
        pub copen: bool @ 7,
        pub bplen: bool @ 8,
        /// Master enable
        pub dmaen: bool @ 9,
        /// Blitter has full priority over the CPU ("blitter nasty")
        pub bltpri: bool @ 10,
        pub bzero: bool @ 13,
        pub bbusy: bool @ 14,
        /// Set/clear control bit (writes only)
        pub setclr: bool @ 15,
    }
}

impl Dmacon {
    /// Applies a SET/CLR style write. Returns the new value.
    pub fn write(&mut self, val: Word) -> Self {
        if val & 0x8000 != 0 {
            self.0 |= val & 0x07FF;
        } else {
            self.0 &= !(val & 0x07FF);
        }
        *self
    }

    pub fn bpldma(&self) -> bool {
        self.dmaen() && self.bplen()
    }

    pub fn copdma(&self) -> bool {
        self.dmaen() && self.copen()
    }

    pub fn bltdma(&self) -> bool {
        self.dmaen() && self.blten()
    }

    pub fn sprdma(&self) -> bool {
        self.dmaen() && self.spren()
    }

    pub fn dskdma(&self) -> bool {
        self.dmaen() && self.dsken()
    }

    pub fn auddma(&self, channel: usize) -> bool {
        self.dmaen() && self.auden() & (1 << channel) != 0
    }
}

bitfield! {
    /// Bitplane control register 0 (BPLCON0), Agnus' view
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Bplcon0(pub u16): Debug, FromStorage, IntoStorage, DerefStorage {
        pub lace: bool @ 2,
        pub bpu_raw: u8 @ 12..15,
        pub hires: bool @ 15,
    }
}

impl Bplcon0 {
    /// Number of bitplanes Agnus fetches. Invalid values enable four
    /// channels in lores and disable all channels in hires.
    pub fn bpu(&self) -> u8 {
        let bpu = self.bpu_raw();
        if self.hires() {
            if bpu < 5 { bpu } else { 0 }
        } else if bpu < 7 {
            bpu
        } else {
            4
        }
    }
}

bitfield! {
    /// Copper control register (COPCON)
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Copcon(pub u16): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Copper danger bit
        pub cdang: bool @ 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dmacon_setclr() {
        let mut d = Dmacon(0);
        d.write(0x8000 | 0x0200 | 0x0080);
        assert!(d.copdma());
        assert!(!d.bpldma());
        d.write(0x0080);
        assert!(!d.copdma());
        assert!(d.dmaen());
        // Read-only bits are not writable
        d.write(0xFFFF);
        assert!(!d.bbusy());
        assert!(!d.bzero());
        assert!(d.auddma(3));
    }

    #[test]
    fn bpu() {
        assert_eq!(Bplcon0(0x6000).bpu(), 6);
        assert_eq!(Bplcon0(0x7000).bpu(), 4);
        assert_eq!(Bplcon0(0x8000 | 0x4000).bpu(), 4);
        assert_eq!(Bplcon0(0x8000 | 0x5000).bpu(), 0);
    }
}
