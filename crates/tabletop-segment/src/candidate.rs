use log::debug;
use nalgebra::Point2;
use tabletop_core::{DepthFrameView, PlaneModel, Token, TokenType};

/// One object hypothesis for the current frame.
///
/// Point sets are sorted frame-space pixel indices (`y * width + x`).
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectCandidate {
    /// Footprint on the table.
    pub base_points: Vec<u32>,
    /// Footprint plus any taller cap pixels; a superset of `base_points`.
    pub all_points: Vec<u32>,
    pub base_center: Point2<f32>,
    /// Larger side of the base bounding box.
    pub base_diameter_px: f32,
    pub max_height_mm: u16,
    /// Mean depth of the base.
    pub depth_mm: u16,
}

impl ObjectCandidate {
    /// Build a candidate and derive its geometry from the frame.
    ///
    /// Both point sets are sorted and deduplicated; `base` pixels are added to
    /// `all`. Returns `None` for an empty base.
    pub fn from_points(
        frame: &DepthFrameView<'_>,
        plane: &PlaneModel,
        mut base: Vec<u32>,
        mut all: Vec<u32>,
    ) -> Option<Self> {
        if base.is_empty() {
            return None;
        }
        base.sort_unstable();
        base.dedup();
        all.extend_from_slice(&base);
        all.sort_unstable();
        all.dedup();

        let w = frame.width;
        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        let (mut sum_x, mut sum_y, mut sum_d) = (0.0f64, 0.0f64, 0.0f64);
        for &i in &base {
            let (x, y) = (i as usize % w, i as usize / w);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            sum_x += x as f64;
            sum_y += y as f64;
            sum_d += frame.data[i as usize] as f64;
        }
        let n = base.len() as f64;
        let diameter = (max_x - min_x + 1).max(max_y - min_y + 1) as f32;

        let mut max_height = 0.0f64;
        for &i in &all {
            let (x, y) = (i as usize % w, i as usize / w);
            let d = frame.data[i as usize];
            if d == 0 {
                continue;
            }
            max_height = max_height.max(plane.height_above(x, y, d));
        }

        Some(Self {
            base_points: base,
            all_points: all,
            base_center: Point2::new((sum_x / n) as f32, (sum_y / n) as f32),
            base_diameter_px: diameter,
            max_height_mm: max_height.round().clamp(0.0, u16::MAX as f64) as u16,
            depth_mm: (sum_d / n).round() as u16,
        })
    }

    /// Union of two candidates with geometry recomputed.
    pub fn merged(
        &self,
        other: &ObjectCandidate,
        frame: &DepthFrameView<'_>,
        plane: &PlaneModel,
    ) -> Option<Self> {
        let mut base = self.base_points.clone();
        base.extend_from_slice(&other.base_points);
        let mut all = self.all_points.clone();
        all.extend_from_slice(&other.all_points);
        Self::from_points(frame, plane, base, all)
    }

    /// `true` if the two should be treated as one object.
    pub fn overlaps(&self, other: &ObjectCandidate, depth_tolerance_mm: u16) -> bool {
        let dist = (self.base_center - other.base_center).norm();
        let reach = 0.5 * self.base_diameter_px.max(other.base_diameter_px);
        dist < reach && self.depth_mm.abs_diff(other.depth_mm) < depth_tolerance_mm
    }

    /// Pixel coordinates of the full silhouette.
    pub fn pixels(&self, frame_width: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.all_points
            .iter()
            .map(move |&i| (i as usize % frame_width, i as usize / frame_width))
    }

    pub fn to_token(&self, kind: TokenType) -> Token {
        Token::observed(
            kind,
            self.base_center,
            self.depth_mm,
            self.max_height_mm,
            self.base_diameter_px,
            self.all_points.len(),
        )
    }
}

/// Merge overlapping candidates until no pair overlaps.
///
/// Each merge replaces a pair with its union, so the list shrinks by one per
/// merge and the loop ends. Returns the number of merges.
pub fn merge_candidates(
    candidates: &mut Vec<ObjectCandidate>,
    frame: &DepthFrameView<'_>,
    plane: &PlaneModel,
    depth_tolerance_mm: u16,
) -> usize {
    let mut merges = 0;
    while let Some((i, j)) = first_overlap(candidates, depth_tolerance_mm) {
        let b = candidates.remove(j);
        if let Some(m) = candidates[i].merged(&b, frame, plane) {
            candidates[i] = m;
        }
        merges += 1;
    }
    if merges > 0 {
        debug!("segment: {} merges, {} candidates left", merges, candidates.len());
    }
    merges
}

fn first_overlap(candidates: &[ObjectCandidate], tol: u16) -> Option<(usize, usize)> {
    for i in 0..candidates.len() {
        for j in i + 1..candidates.len() {
            if candidates[i].overlaps(&candidates[j], tol) {
                return Some((i, j));
            }
        }
    }
    None
}
