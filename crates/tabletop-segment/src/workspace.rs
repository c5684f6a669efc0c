use tabletop_core::{DepthFrameView, PlaneModel, RegionOfInterest};

/// Height of a pixel with no valid depth.
pub(crate) const NO_HEIGHT: i32 = i32::MIN;

const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Reusable buffers for segmentation, sized to the ROI.
///
/// Holding one across frames keeps the flood fill free of per-frame
/// allocations once the ROI size settles.
#[derive(Clone, Debug, Default)]
pub struct SegmentWorkspace {
    pub(crate) width: usize,
    pub(crate) height: usize,
    /// Rounded height above the plane per ROI pixel.
    pub(crate) heights: Vec<i32>,
    /// Component label per ROI pixel, `0` = unlabeled.
    pub(crate) labels: Vec<u32>,
    /// BFS queue of ROI-local indices; holds the last component afterwards.
    pub(crate) queue: Vec<u32>,
}

impl SegmentWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for `roi` and fill heights against `plane`.
    pub(crate) fn prepare(
        &mut self,
        frame: &DepthFrameView<'_>,
        roi: &RegionOfInterest,
        plane: &PlaneModel,
    ) {
        self.width = roi.width;
        self.height = roi.height;
        self.heights.clear();
        self.heights.reserve(roi.area());
        for y in roi.y..roi.bottom() {
            for x in roi.x..roi.right() {
                let h = match frame.sample(x, y) {
                    Some(d) => (plane.expected_depth(x as f64, y as f64) - d as f64).round() as i32,
                    None => NO_HEIGHT,
                };
                self.heights.push(h);
            }
        }
        self.labels.clear();
        self.labels.resize(roi.area(), 0);
        self.queue.clear();
    }

    /// Label the component grown from `seed` and leave its members in `queue`.
    ///
    /// A neighbor joins when `inside(neighbor_height)` holds and
    /// `link(current_height, neighbor_height)` accepts the step.
    pub(crate) fn flood<I, L>(&mut self, seed: usize, label: u32, inside: I, link: L)
    where
        I: Fn(i32) -> bool,
        L: Fn(i32, i32) -> bool,
    {
        let Self {
            width,
            height,
            heights,
            labels,
            queue,
        } = self;
        let (w, h) = (*width, *height);
        queue.clear();
        queue.push(seed as u32);
        labels[seed] = label;
        let mut head = 0;
        while head < queue.len() {
            let idx = queue[head] as usize;
            head += 1;
            let (x, y) = (idx % w, idx / w);
            let current = heights[idx];
            for (dx, dy) in NEIGHBORS {
                let (Some(nx), Some(ny)) = (x.checked_add_signed(dx), y.checked_add_signed(dy))
                else {
                    continue;
                };
                if nx >= w || ny >= h {
                    continue;
                }
                let n = ny * w + nx;
                if labels[n] != 0 {
                    continue;
                }
                let nh = heights[n];
                if nh == NO_HEIGHT || !inside(nh) || !link(current, nh) {
                    continue;
                }
                labels[n] = label;
                queue.push(n as u32);
            }
        }
    }

    /// Frame-space index of an ROI-local index.
    #[inline]
    pub(crate) fn to_frame(&self, local: u32, roi: &RegionOfInterest, frame_width: usize) -> u32 {
        let local = local as usize;
        let (lx, ly) = (local % self.width, local / self.width);
        ((roi.y + ly) * frame_width + roi.x + lx) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletop_core::DepthFrame;

    #[test]
    fn flood_is_eight_connected_and_bounded() {
        let mut frame = DepthFrame::filled(10, 10, 1000).unwrap();
        // diagonal chain plus an isolated pixel
        frame.set(1, 1, 950);
        frame.set(2, 2, 950);
        frame.set(3, 3, 950);
        frame.set(8, 1, 950);
        let view = frame.view();
        let roi = view.full_roi();
        let mut ws = SegmentWorkspace::new();
        ws.prepare(&view, &roi, &PlaneModel::flat(1000));
        ws.flood(view.index(1, 1), 1, |h| h >= 5, |_, _| true);
        assert_eq!(ws.queue.len(), 3);
        assert_eq!(ws.labels[view.index(8, 1)], 0);
    }

    #[test]
    fn invalid_pixels_have_no_height() {
        let mut frame = DepthFrame::filled(4, 4, 1000).unwrap();
        frame.set(2, 2, 0);
        let view = frame.view();
        let mut ws = SegmentWorkspace::new();
        ws.prepare(&view, &RegionOfInterest::new(1, 1, 3, 3), &PlaneModel::flat(1000));
        assert_eq!(ws.heights.len(), 9);
        assert_eq!(ws.heights[4], NO_HEIGHT);
        assert_eq!(ws.to_frame(4, &RegionOfInterest::new(1, 1, 3, 3), 4), 10);
    }
}
