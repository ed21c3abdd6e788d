use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::tickable::{Ticks, dma_cycles, TICKS_PER_DMA_CYCLE};

/// DMA cycles per line
pub const HPOS_CNT: i64 = 227;

/// Last DMA cycle of a line
pub const HPOS_MAX: i64 = HPOS_CNT - 1;

/// Master clock ticks per line
pub const LINE_TICKS: Ticks = dma_cycles(HPOS_CNT);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum VideoFormat {
    #[default]
    #[strum(to_string = "PAL")]
    Pal,
    #[strum(to_string = "NTSC")]
    Ntsc,
}

impl VideoFormat {
    /// Lines in a long frame
    pub const fn long_frame_lines(self) -> i64 {
        match self {
            Self::Pal => 313,
            Self::Ntsc => 263,
        }
    }

    /// Frames per second
    pub const fn refresh_rate(self) -> f64 {
        match self {
            Self::Pal => 50.0,
            Self::Ntsc => 60.0,
        }
    }

    /// Master clock frequency in Hz
    pub const fn master_clock(self) -> i64 {
        match self {
            Self::Pal => 28_375_160,
            Self::Ntsc => 28_636_360,
        }
    }
}

/// Raster beam position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Beam {
    pub v: i64,
    pub h: i64,
}

impl Beam {
    pub const fn new(v: i64, h: i64) -> Self {
        Self { v, h }
    }

    /// Offset in ticks from the start of the frame
    pub const fn to_ticks(self) -> Ticks {
        dma_cycles(self.v * HPOS_CNT + self.h)
    }

    /// Position at the given tick offset from the start of the frame.
    /// Ticks in between two DMA cycles round down.
    pub const fn from_ticks(ticks: Ticks) -> Self {
        let cycle = ticks / TICKS_PER_DMA_CYCLE;
        Self {
            v: cycle / HPOS_CNT,
            h: cycle % HPOS_CNT,
        }
    }

    /// Advances the position by a number of DMA cycles, wrapping into
    /// following lines. Frame boundaries are not taken into account.
    pub const fn add_cycles(self, cycles: i64) -> Self {
        let total = self.v * HPOS_CNT + self.h + cycles;
        Self {
            v: total / HPOS_CNT,
            h: total % HPOS_CNT,
        }
    }
}

/// Frame sequencing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame counter
    pub nr: i64,
    /// Long frame flag
    pub lof: bool,
    /// Long frame flag of the previous frame
    pub prev_lof: bool,
    pub interlaced: bool,
    pub format: VideoFormat,
}

impl Frame {
    pub fn new(format: VideoFormat) -> Self {
        Self {
            nr: 0,
            lof: true,
            prev_lof: true,
            interlaced: false,
            format,
        }
    }

    /// Lines in this frame
    pub fn num_lines(&self) -> i64 {
        if self.lof {
            self.format.long_frame_lines()
        } else {
            self.format.long_frame_lines() - 1
        }
    }

    pub fn last_line(&self) -> i64 {
        self.num_lines() - 1
    }

    /// Length of this frame in master clock ticks
    pub fn ticks(&self) -> Ticks {
        self.num_lines() * LINE_TICKS
    }

    /// Moves on to the next frame. Long and short frames only alternate
    /// in interlace mode.
    pub fn advance(&mut self) {
        self.nr += 1;
        self.prev_lof = self.lof;
        self.lof = if self.interlaced { !self.lof } else { true };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beam_ticks_inverse() {
        let frame = Frame::new(VideoFormat::Pal);
        for t in (0..frame.ticks()).step_by(8 * 13) {
            assert_eq!(Beam::from_ticks(t).to_ticks(), t);
        }
        assert_eq!(Beam::from_ticks(frame.ticks() - 8), Beam::new(312, HPOS_MAX));
    }

    #[test]
    fn beam_ticks_every_cycle_of_line() {
        for h in 0..HPOS_CNT {
            let b = Beam::new(10, h);
            assert_eq!(Beam::from_ticks(b.to_ticks()), b);
            // Mid-cycle ticks round down
            assert_eq!(Beam::from_ticks(b.to_ticks() + 7), b);
        }
    }

    #[test]
    fn add_cycles_wraps() {
        assert_eq!(Beam::new(5, 0xE1).add_cycles(2), Beam::new(6, 0));
        assert_eq!(Beam::new(5, 0xE2).add_cycles(1), Beam::new(6, 0));
        assert_eq!(Beam::new(5, 10).add_cycles(2), Beam::new(5, 12));
    }

    #[test]
    fn frame_lengths() {
        let mut f = Frame::new(VideoFormat::Pal);
        assert_eq!(f.num_lines(), 313);
        f.advance();
        assert!(f.lof);

        f.interlaced = true;
        f.advance();
        assert!(!f.lof);
        assert_eq!(f.num_lines(), 312);
        f.advance();
        assert!(f.lof);
        assert_eq!(f.nr, 3);

        let f = Frame::new(VideoFormat::Ntsc);
        assert_eq!(f.num_lines(), 263);
        assert_eq!(f.ticks(), 263 * 227 * 8);
    }
}
