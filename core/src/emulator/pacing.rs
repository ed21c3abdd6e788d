//! Wall-clock pacing of emulated frames

use std::time::{Duration, Instant};

use log::*;

/// Drift after which the baseline is reset instead of catching up
pub const RESYNC_THRESHOLD: Duration = Duration::from_millis(200);

/// Decides how many frames are due and how long to sleep.
///
/// Frame `n` (counted from the baseline) is due at `base + n * frame_time`.
pub struct Pacer {
    base: Instant,
    frames: u64,
    frame_time: Duration,
    warp: bool,
    resyncs: u64,
}

impl Pacer {
    pub fn new(now: Instant, refresh_rate: f64, speed: u16) -> Self {
        Self {
            base: now,
            frames: 0,
            frame_time: Self::frame_time(refresh_rate, speed),
            warp: false,
            resyncs: 0,
        }
    }

    fn frame_time(refresh_rate: f64, speed: u16) -> Duration {
        let rate = refresh_rate * f64::from(speed.max(1)) / 100.0;
        Duration::from_secs_f64(1.0 / rate)
    }

    /// Changes the frame rate, starting from a new baseline
    pub fn set_rate(&mut self, now: Instant, refresh_rate: f64, speed: u16) {
        self.frame_time = Self::frame_time(refresh_rate, speed);
        self.reset(now);
    }

    pub fn set_warp(&mut self, now: Instant, warp: bool) {
        self.warp = warp;
        self.reset(now);
    }

    pub fn warp(&self) -> bool {
        self.warp
    }

    /// Starts pacing from `now`, e.g. after the emulator was paused
    pub fn reset(&mut self, now: Instant) {
        self.base = now;
        self.frames = 0;
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    fn emulated(&self) -> Duration {
        self.frame_time.mul_f64(self.frames as f64)
    }

    /// Number of frames to run now to catch up with the wall clock
    pub fn frames_due(&mut self, now: Instant) -> u64 {
        if self.warp {
            return 1;
        }

        let wall = now.saturating_duration_since(self.base);
        let emulated = self.emulated();
        let drift = if wall > emulated {
            wall - emulated
        } else {
            emulated - wall
        };
        if drift > RESYNC_THRESHOLD {
            warn!(
                "Emulation {} by {} ms, resyncing",
                if wall > emulated { "behind" } else { "ahead" },
                drift.as_millis()
            );
            self.resyncs += 1;
            self.reset(now);
            return 1;
        }

        let started = (wall.as_secs_f64() / self.frame_time.as_secs_f64()) as u64 + 1;
        started.saturating_sub(self.frames)
    }

    /// Accounts for a completed frame
    pub fn frame_done(&mut self) {
        self.frames += 1;
    }

    /// Time until the next frame is due
    pub fn sleep_time(&self, now: Instant) -> Duration {
        if self.warp {
            return Duration::ZERO;
        }
        (self.base + self.emulated()).saturating_duration_since(now)
    }
}
