use std::collections::HashMap;

use nalgebra::Point2;

/// Consecutive-frame counters per coarse spatial bucket.
///
/// Every call to [`observe`](Self::observe) replaces the counter map, so a
/// bucket without an observation in the latest frame starts from zero.
#[derive(Clone, Debug)]
pub struct StabilityGate {
    bucket_size: f32,
    counts: HashMap<(i32, i32), u32>,
}

impl StabilityGate {
    pub fn new(bucket_size_px: f32) -> Self {
        Self {
            bucket_size: bucket_size_px.max(1.0),
            counts: HashMap::new(),
        }
    }

    #[inline]
    pub fn bucket(&self, p: Point2<f32>) -> (i32, i32) {
        (
            (p.x / self.bucket_size).floor() as i32,
            (p.y / self.bucket_size).floor() as i32,
        )
    }

    /// Record one frame of positions and return the count for each.
    ///
    /// Several positions in one bucket share a single increment.
    pub fn observe<I>(&mut self, positions: I) -> Vec<u32>
    where
        I: IntoIterator<Item = Point2<f32>>,
    {
        let mut next = HashMap::with_capacity(self.counts.len());
        let mut out = Vec::new();
        for p in positions {
            let b = self.bucket(p);
            let count = *next
                .entry(b)
                .or_insert_with(|| self.counts.get(&b).copied().unwrap_or(0) + 1);
            out.push(count);
        }
        self.counts = next;
        out
    }

    /// Current count of the bucket containing `p`.
    pub fn count(&self, p: Point2<f32>) -> u32 {
        self.counts.get(&self.bucket(p)).copied().unwrap_or(0)
    }

    /// Buckets observed in the latest frame.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
