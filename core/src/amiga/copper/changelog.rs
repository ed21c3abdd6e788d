use log::*;
use serde::{Deserialize, Serialize};

use crate::types::Word;

/// Entries kept before the oldest half is discarded
const MAX_ENTRIES: usize = 0x1_0000;

/// A register write timed to a pixel position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegChange {
    pub frame: i64,
    pub v: i64,
    pub pixel: i64,
    pub addr: Word,
    pub value: Word,
}

/// Color register writes staged for the display logic, in beam order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegChangeLog {
    entries: Vec<RegChange>,
    dropped: u64,
}

impl RegChangeLog {
    pub fn push(&mut self, change: RegChange) {
        if self.entries.len() >= MAX_ENTRIES {
            let n = MAX_ENTRIES / 2;
            debug!("Register change log full, dropping {} entries", n);
            self.entries.drain(..n);
            self.dropped += n as u64;
        }
        self.entries.push(change);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegChange> {
        self.entries.iter()
    }

    /// Hands all recorded changes to the consumer
    pub fn take(&mut self) -> Vec<RegChange> {
        std::mem::take(&mut self.entries)
    }

    /// Number of entries lost because nobody consumed them
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(v: i64) -> RegChange {
        RegChange {
            frame: 0,
            v,
            pixel: 0,
            addr: 0x180,
            value: 0,
        }
    }

    #[test]
    fn take_empties() {
        let mut log = RegChangeLog::default();
        log.push(change(1));
        log.push(change(2));
        let taken = log.take();
        assert_eq!(taken.iter().map(|c| c.v).collect::<Vec<_>>(), [1, 2]);
        assert!(log.is_empty());
    }

    #[test]
    fn overflow_keeps_newest() {
        let mut log = RegChangeLog::default();
        for v in 0..(MAX_ENTRIES as i64 + 1) {
            log.push(change(v));
        }
        assert_eq!(log.len(), MAX_ENTRIES / 2 + 1);
        assert_eq!(log.dropped(), (MAX_ENTRIES / 2) as u64);
        assert_eq!(log.iter().last().map(|c| c.v), Some(MAX_ENTRIES as i64));
    }
}
