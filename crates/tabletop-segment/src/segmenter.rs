use log::debug;
use nalgebra::Point2;
use tabletop_core::{DepthFrameView, PlaneModel, RegionOfInterest, TokenType};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::workspace::NO_HEIGHT;
use crate::{merge_candidates, ObjectCandidate, SegmentParams, SegmentStrategy, SegmentWorkspace};

/// Finds and classifies objects standing on the table.
#[derive(Clone, Debug, Default)]
pub struct BlobSegmenter {
    params: SegmentParams,
}

/// Accepted base in ROI-local indices.
struct Base {
    label: u32,
    points: Vec<u32>,
}

impl BlobSegmenter {
    pub fn new(params: SegmentParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SegmentParams {
        &self.params
    }

    /// Segment `roi` with the configured strategy and merge overlaps.
    ///
    /// Output order follows the row-major position of each object's first
    /// pixel, so identical inputs give identical lists.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame, plane, ws), fields(roi_w = roi.width, roi_h = roi.height))
    )]
    pub fn segment(
        &self,
        frame: &DepthFrameView<'_>,
        roi: &RegionOfInterest,
        plane: &PlaneModel,
        ws: &mut SegmentWorkspace,
    ) -> Vec<ObjectCandidate> {
        let Some(roi) = roi.clamped(frame.width, frame.height) else {
            return Vec::new();
        };
        let mut candidates = match self.params.strategy {
            SegmentStrategy::BaseAndCap => self.base_and_cap(frame, &roi, plane, ws),
            SegmentStrategy::SinglePass => self.single_pass(frame, &roi, plane, ws),
        };
        merge_candidates(
            &mut candidates,
            frame,
            plane,
            self.params.merge_depth_tolerance_mm,
        );
        debug!(
            "segment: {} candidates ({:?})",
            candidates.len(),
            self.params.strategy
        );
        candidates
    }

    /// 8-connected components over every pixel in `[min, 2 * max]` height.
    pub fn single_pass(
        &self,
        frame: &DepthFrameView<'_>,
        roi: &RegionOfInterest,
        plane: &PlaneModel,
        ws: &mut SegmentWorkspace,
    ) -> Vec<ObjectCandidate> {
        let p = &self.params;
        let lo = p.min_token_height_mm as i32;
        let hi = 2 * p.max_token_height_mm as i32;
        let foreground = |h: i32| h >= lo && h <= hi;

        ws.prepare(frame, roi, plane);
        let mut out = Vec::new();
        let mut label = 0u32;
        for seed in 0..ws.heights.len() {
            if ws.labels[seed] != 0 || !foreground(ws.heights[seed]) {
                continue;
            }
            label += 1;
            ws.flood(seed, label, foreground, |_, _| true);

            let size = ws.queue.len();
            if size > p.max_blob_size {
                continue;
            }
            let max_height = ws.queue.iter().map(|&i| ws.heights[i as usize]).max().unwrap_or(0);
            if size < SegmentParams::relaxed_threshold(p.detection_threshold, max_height as u16) {
                continue;
            }
            let points: Vec<u32> = ws
                .queue
                .iter()
                .map(|&i| ws.to_frame(i, roi, frame.width))
                .collect();
            if let Some(c) = ObjectCandidate::from_points(frame, plane, points, Vec::new()) {
                out.push(c);
            }
        }
        out
    }

    /// Smooth low bases first, then taller cap pixels above each base.
    pub fn base_and_cap(
        &self,
        frame: &DepthFrameView<'_>,
        roi: &RegionOfInterest,
        plane: &PlaneModel,
        ws: &mut SegmentWorkspace,
    ) -> Vec<ObjectCandidate> {
        let p = &self.params;
        let lo = p.min_token_height_mm as i32;
        let hi = p.max_token_height_mm as i32;
        let step = p.base_height_step_mm as i32;
        let in_base = |h: i32| h >= lo && h <= hi;

        ws.prepare(frame, roi, plane);
        let mut bases = Vec::new();
        // accepted[label] for every label handed out; index 0 is "unlabeled"
        let mut accepted = vec![false];
        for seed in 0..ws.heights.len() {
            if ws.labels[seed] != 0 || !in_base(ws.heights[seed]) {
                continue;
            }
            let label = accepted.len() as u32;
            ws.flood(seed, label, in_base, |a, b| (a - b).abs() <= step);
            let ok = ws.queue.len() >= p.min_base_size;
            accepted.push(ok);
            if ok {
                bases.push(Base {
                    label,
                    points: ws.queue.clone(),
                });
            }
        }

        let mut out = Vec::with_capacity(bases.len());
        for base in &bases {
            let cap = self.collect_cap(ws, base, &accepted);
            let to_frame = |pts: &[u32]| -> Vec<u32> {
                pts.iter().map(|&i| ws.to_frame(i, roi, frame.width)).collect()
            };
            let Some(c) =
                ObjectCandidate::from_points(frame, plane, to_frame(&base.points), to_frame(&cap))
            else {
                continue;
            };
            let size = c.all_points.len();
            let required = SegmentParams::relaxed_threshold(
                p.diameter_scaled_threshold(c.base_diameter_px),
                c.max_height_mm,
            );
            if size >= required && size <= p.max_blob_size {
                out.push(c);
            }
        }
        out
    }

    /// Pixels taller than the base mean inside a disk around the base.
    ///
    /// Pixels of other accepted bases are left to their own candidate.
    fn collect_cap(&self, ws: &SegmentWorkspace, base: &Base, accepted: &[bool]) -> Vec<u32> {
        let p = &self.params;
        let w = ws.width;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
        let (mut sx, mut sy, mut sh) = (0.0f64, 0.0f64, 0.0f64);
        for &i in &base.points {
            let (x, y) = (i as usize % w, i as usize / w);
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
            sx += x as f64;
            sy += y as f64;
            sh += ws.heights[i as usize] as f64;
        }
        let n = base.points.len() as f64;
        let center = Point2::new((sx / n) as f32, (sy / n) as f32);
        let mean_height = sh / n;
        let diameter = (max_x - min_x + 1).max(max_y - min_y + 1) as f32;
        let radius = 0.5 * diameter + p.cap_margin_px.max(0.0);
        let cap_max = 2 * p.max_token_height_mm as i32;

        let x0 = (center.x - radius).floor().max(0.0) as usize;
        let y0 = (center.y - radius).floor().max(0.0) as usize;
        let x1 = ((center.x + radius).ceil() as usize).min(ws.width.saturating_sub(1));
        let y1 = ((center.y + radius).ceil() as usize).min(ws.height.saturating_sub(1));
        let r2 = radius * radius;

        let mut cap = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (dx, dy) = (x as f32 - center.x, y as f32 - center.y);
                if dx * dx + dy * dy > r2 {
                    continue;
                }
                let i = y * w + x;
                let h = ws.heights[i];
                if h == NO_HEIGHT || (h as f64) <= mean_height || h > cap_max {
                    continue;
                }
                let owner = ws.labels[i] as usize;
                if owner != 0 && (owner == base.label as usize || accepted[owner]) {
                    continue;
                }
                cap.push(i as u32);
            }
        }
        cap
    }

    /// Miniature when tall and slender, otherwise a flat token by diameter.
    pub fn classify(&self, candidate: &ObjectCandidate) -> TokenType {
        let p = &self.params;
        let height = candidate.max_height_mm as f32;
        let diameter = candidate.base_diameter_px.max(f32::EPSILON);
        if candidate.max_height_mm > p.miniature_min_height_mm && height / diameter > p.miniature_ratio {
            TokenType::Miniature
        } else if candidate.base_diameter_px < p.small_max_diameter_px {
            TokenType::SmallToken
        } else if candidate.base_diameter_px < p.medium_max_diameter_px {
            TokenType::MediumToken
        } else {
            TokenType::LargeToken
        }
    }
}
