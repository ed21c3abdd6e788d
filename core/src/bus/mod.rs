pub mod chipram;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::Word;

/// Chip bus address (24-bit, word accesses only)
pub type Address = u32;

/// Base address of the custom chip register block
pub const CUSTOM_BASE: Address = 0xDF_F000;

/// The unit that performs a memory access. Access latency and side effects
/// of the memory unit may differ per accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum Accessor {
    /// 68000 through the CPU bus
    Cpu,
    /// Copper instruction fetches and MOVE writes
    Copper,
    /// Agnus DMA channels (disk, audio, bitplanes, sprites)
    Agnus,
    /// Blitter channels
    Blitter,
}

/// Chip memory as seen by the chipset core.
///
/// The memory unit itself (chip RAM, slow RAM, custom register side effects
/// of the excluded units) lives outside of the core.
pub trait ChipMemory {
    fn read_word(&mut self, accessor: Accessor, addr: Address) -> Word;
    fn write_word(&mut self, accessor: Accessor, addr: Address, val: Word);

    /// Reads a word without any side effects, for debugging views.
    fn peek_word(&self, addr: Address) -> Word;
}
