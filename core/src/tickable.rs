use anyhow::Result;

/// Representation of X amount of ticks of the 28 MHz master clock.
///
/// Signed so that deltas between two points in time can be expressed
/// without casting.
pub type Ticks = i64;

/// Trigger value of an event that never fires
pub const NEVER: Ticks = Ticks::MAX;

/// Master clock ticks per DMA (color clock) cycle
pub const TICKS_PER_DMA_CYCLE: Ticks = 8;

/// Master clock ticks per CPU cycle
pub const TICKS_PER_CPU_CYCLE: Ticks = 4;

/// Converts an amount of DMA cycles to master clock ticks
pub const fn dma_cycles(cycles: i64) -> Ticks {
    cycles * TICKS_PER_DMA_CYCLE
}

/// Rounds up to the start of the next DMA cycle
pub const fn align_dma_cycle(ticks: Ticks) -> Ticks {
    let rem = ticks.rem_euclid(TICKS_PER_DMA_CYCLE);
    if rem == 0 {
        ticks
    } else {
        ticks + TICKS_PER_DMA_CYCLE - rem
    }
}

/// Converts an amount of CPU cycles to master clock ticks
pub const fn cpu_cycles(cycles: i64) -> Ticks {
    cycles * TICKS_PER_CPU_CYCLE
}

pub trait Tickable {
    fn tick(&mut self, ticks: Ticks) -> Result<Ticks>;
}
