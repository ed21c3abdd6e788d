use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use proc_bitfield::bitfield;
use serde::{Deserialize, Serialize};

bitfield! {
    /// Requests for the run loop, raised from handlers or other threads
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RunLoopFlags(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Leave the run loop
        pub stop: bool @ 0,
        /// Copper breakpoint hit
        pub breakpoint: bool @ 1,
        /// Copper watchpoint hit
        pub watchpoint: bool @ 2,
        /// Savestate requested
        pub snapshot: bool @ 3,
        /// Refresh the inspection snapshot
        pub inspect: bool @ 4,
    }
}

impl RunLoopFlags {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn any(self) -> bool {
        self.0 != 0
    }
}

/// Flag word shared between the emulator thread and everybody else
#[derive(Clone, Default)]
pub struct RunLoopControl(Arc<AtomicU32>);

impl RunLoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, flags: RunLoopFlags) {
        self.0.fetch_or(flags.0, Ordering::AcqRel);
    }

    pub fn clear(&self, flags: RunLoopFlags) {
        self.0.fetch_and(!flags.0, Ordering::AcqRel);
    }

    pub fn get(&self) -> RunLoopFlags {
        RunLoopFlags(self.0.load(Ordering::Acquire))
    }

    /// Returns all raised flags and clears them
    pub fn take(&self) -> RunLoopFlags {
        RunLoopFlags(self.0.swap(0, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_between_clones() {
        let a = RunLoopControl::new();
        let b = a.clone();
        b.raise(RunLoopFlags::none().with_breakpoint(true));
        b.raise(RunLoopFlags::none().with_inspect(true));
        assert!(a.get().breakpoint());

        a.clear(RunLoopFlags::none().with_inspect(true));
        let f = b.take();
        assert!(f.breakpoint());
        assert!(!f.inspect());
        assert!(!a.get().any());
    }
}
