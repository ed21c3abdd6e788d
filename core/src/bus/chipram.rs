use serde::{Deserialize, Serialize};

use super::{Accessor, Address, ChipMemory, CUSTOM_BASE};
use crate::types::Word;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Copy, Clone, Debug)]
pub struct TraceEntry {
    pub addr: Address,
    pub accessor: Accessor,
    pub access: Access,
    pub val: Word,
}

/// Plain chip RAM, mirrored across the 2MB chip RAM window.
///
/// Writes into the custom register block are recorded (for inspection) but
/// have no further effect; the units owning those registers are not part of
/// this crate.
#[derive(Serialize, Deserialize)]
pub struct ChipRam {
    mem: Vec<u8>,
    mask: Address,
    #[serde(skip)]
    trace: Option<Vec<TraceEntry>>,
    #[serde(skip)]
    custom_writes: Vec<(Address, Word)>,
}

impl ChipRam {
    /// Creates chip RAM of the given size, which must be a power of two.
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        Self {
            mem: vec![0; size],
            mask: (size - 1) as Address & !1,
            trace: None,
            custom_writes: vec![],
        }
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Loads a block of words at the given address
    pub fn load_words(&mut self, addr: Address, words: &[Word]) {
        for (i, &w) in words.iter().enumerate() {
            self.poke_word(addr + (i as Address) * 2, w);
        }
    }

    /// Writes a word without tracing
    pub fn poke_word(&mut self, addr: Address, val: Word) {
        let a = (addr & self.mask) as usize;
        self.mem[a..a + 2].copy_from_slice(&val.to_be_bytes());
    }

    /// Starts recording all accesses, clearing the previous trace
    pub fn reset_trace(&mut self) {
        self.trace = Some(vec![]);
    }

    pub fn get_trace(&self) -> &[TraceEntry] {
        self.trace.as_deref().unwrap_or_default()
    }

    /// Returns and clears all writes that targeted the custom register block
    pub fn take_custom_writes(&mut self) -> Vec<(Address, Word)> {
        std::mem::take(&mut self.custom_writes)
    }

    fn record(&mut self, addr: Address, accessor: Accessor, access: Access, val: Word) {
        if let Some(t) = self.trace.as_mut() {
            t.push(TraceEntry {
                addr,
                accessor,
                access,
                val,
            });
        }
    }
}

impl ChipMemory for ChipRam {
    fn read_word(&mut self, accessor: Accessor, addr: Address) -> Word {
        let val = self.peek_word(addr);
        self.record(addr, accessor, Access::Read, val);
        val
    }

    fn write_word(&mut self, accessor: Accessor, addr: Address, val: Word) {
        self.record(addr, accessor, Access::Write, val);
        if addr & !0x1FF == CUSTOM_BASE {
            self.custom_writes.push((addr, val));
            return;
        }
        self.poke_word(addr, val);
    }

    fn peek_word(&self, addr: Address) -> Word {
        let a = (addr & self.mask) as usize;
        Word::from_be_bytes([self.mem[a], self.mem[a + 1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write() {
        let mut r = ChipRam::new(0x1000);
        for a in (0..0x1000).step_by(2) {
            assert_eq!(r.read_word(Accessor::Cpu, a), 0);
        }
        for a in (0..0x1000).step_by(2) {
            r.write_word(Accessor::Cpu, a, a as Word);
        }
        for a in (0..0x1000).step_by(2) {
            assert_eq!(r.read_word(Accessor::Agnus, a), a as Word);
        }
    }

    #[test]
    fn mirrored() {
        let mut r = ChipRam::new(0x1000);
        r.write_word(Accessor::Cpu, 0x1002, 0xBEEF);
        assert_eq!(r.peek_word(0x0002), 0xBEEF);
        // Odd addresses are word aligned
        assert_eq!(r.peek_word(0x0003), 0xBEEF);
    }

    #[test]
    fn custom_writes() {
        let mut r = ChipRam::new(0x1000);
        r.write_word(Accessor::Copper, CUSTOM_BASE + 0x180, 0x0F00);
        assert_eq!(r.take_custom_writes(), vec![(CUSTOM_BASE + 0x180, 0x0F00)]);
        assert!(r.take_custom_writes().is_empty());
        assert_eq!(r.peek_word(0x180), 0);
    }

    #[test]
    fn trace() {
        let mut r = ChipRam::new(0x1000);
        r.load_words(0x100, &[1, 2]);
        r.reset_trace();
        assert_eq!(r.read_word(Accessor::Copper, 0x100), 1);
        r.write_word(Accessor::Blitter, 0x102, 3);
        let t = r.get_trace();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].accessor, Accessor::Copper);
        assert_eq!(t[0].access, Access::Read);
        assert_eq!(t[1].access, Access::Write);
        assert_eq!(t[1].val, 3);
    }
}
