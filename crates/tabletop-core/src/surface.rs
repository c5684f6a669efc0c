use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Smoothed table depth.
///
/// Raw per-frame estimates go into a bounded FIFO; the published depth is the
/// median of that history. `depth_mm() == 0` means no estimate yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSurface {
    depth_mm: u16,
    locked: bool,
    history: VecDeque<u16>,
    capacity: usize,
}

impl TableSurface {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            depth_mm: 0,
            locked: false,
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn depth_mm(&self) -> u16 {
        self.depth_mm
    }

    /// `true` once at least one estimate has been accepted.
    #[inline]
    pub fn is_seeded(&self) -> bool {
        self.depth_mm != 0
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn history(&self) -> impl Iterator<Item = u16> + '_ {
        self.history.iter().copied()
    }

    /// Push a raw estimate and return the smoothed depth.
    ///
    /// Ignored while locked.
    pub fn push(&mut self, raw_mm: u16) -> u16 {
        if self.locked || raw_mm == 0 {
            return self.depth_mm;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(raw_mm);
        self.depth_mm = median(&self.history);
        self.depth_mm
    }

    /// Replace the whole history with an externally calibrated depth.
    pub fn set_depth(&mut self, depth_mm: u16) {
        self.history.clear();
        if depth_mm != 0 {
            self.history.push_back(depth_mm);
        }
        self.depth_mm = depth_mm;
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.depth_mm = 0;
        self.locked = false;
    }
}

impl Default for TableSurface {
    fn default() -> Self {
        Self::new(15)
    }
}

fn median(values: &VecDeque<u16>) -> u16 {
    let mut sorted: Vec<u16> = values.iter().copied().collect();
    sorted.sort_unstable();
    sorted.get(sorted.len() / 2).copied().unwrap_or(0)
}
