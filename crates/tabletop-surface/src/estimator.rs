use log::debug;
use serde::{Deserialize, Serialize};
use tabletop_core::{DepthFrameView, Stage, StageError, TableSurface};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{SurfaceParams, ViewingMode};

/// Which search produced a [`SurfaceEstimate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMethod {
    /// Depth bins ranked by count, flatness and spatial contiguity.
    Scored,
    /// Most frequent depth inside a central window.
    CentralMode,
}

/// Raw (unsmoothed) table depth found in one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceEstimate {
    pub depth_mm: u16,
    pub method: SurfaceMethod,
    /// Samples backing the estimate.
    pub support: usize,
    pub score: f64,
}

#[derive(Clone, Copy)]
struct Sample {
    x: u32,
    y: u32,
    depth: u16,
}

/// Finds the dominant planar depth of a frame.
#[derive(Clone, Debug, Default)]
pub struct SurfaceEstimator {
    params: SurfaceParams,
}

impl SurfaceEstimator {
    pub fn new(params: SurfaceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SurfaceParams {
        &self.params
    }

    /// Estimate the table depth with the search selected by `mode`.
    pub fn estimate(
        &self,
        frame: &DepthFrameView<'_>,
        mode: ViewingMode,
    ) -> Result<SurfaceEstimate, StageError> {
        if mode == ViewingMode::Overhead && self.params.overhead_fast_path {
            self.estimate_central_mode(frame)
        } else {
            self.estimate_scored(frame)
        }
    }

    /// Estimate and fold the result into `surface`, returning the smoothed depth.
    ///
    /// A locked surface is returned untouched without scanning the frame.
    pub fn update(
        &self,
        surface: &mut TableSurface,
        frame: &DepthFrameView<'_>,
        mode: ViewingMode,
    ) -> Result<u16, StageError> {
        if surface.is_locked() {
            return Ok(surface.depth_mm());
        }
        let estimate = self.estimate(frame, mode)?;
        Ok(surface.push(estimate.depth_mm))
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn estimate_scored(&self, frame: &DepthFrameView<'_>) -> Result<SurfaceEstimate, StageError> {
        let p = &self.params;
        let stride = p.sample_stride.max(1);
        let bin_size = p.bin_size_mm.max(1);
        let (lo, hi) = (p.min_depth_mm, p.max_depth_mm.max(p.min_depth_mm));
        let n_bins = ((hi - lo) / bin_size) as usize + 1;

        let mut bins: Vec<Vec<Sample>> = vec![Vec::new(); n_bins];
        for y in (0..frame.height).step_by(stride) {
            let row = &frame.data[y * frame.width..(y + 1) * frame.width];
            for x in (0..frame.width).step_by(stride) {
                let d = row[x];
                if d < lo || d > hi {
                    continue;
                }
                bins[((d - lo) / bin_size) as usize].push(Sample {
                    x: x as u32,
                    y: y as u32,
                    depth: d,
                });
            }
        }

        let mut best: Option<(usize, f64)> = None;
        let mut largest = 0usize;
        for (i, bin) in bins.iter().enumerate() {
            largest = largest.max(bin.len());
            if bin.len() < p.min_bin_points {
                continue;
            }
            let score = self.score_bin(bin);
            // strict comparison: ties keep the nearer bin
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let Some((best_bin, score)) = best else {
            return Err(StageError::InsufficientSamples {
                stage: Stage::Surface,
                found: largest,
                required: p.min_bin_points,
            });
        };

        let bin = &bins[best_bin];
        let mut depths: Vec<u16> = bin.iter().map(|s| s.depth).collect();
        let mid = depths.len() / 2;
        let (_, median, _) = depths.select_nth_unstable(mid);
        let estimate = SurfaceEstimate {
            depth_mm: *median,
            method: SurfaceMethod::Scored,
            support: bin.len(),
            score,
        };
        debug!(
            "surface: bin {} of {} -> {}mm (support={}, score={:.1})",
            best_bin, n_bins, estimate.depth_mm, estimate.support, estimate.score
        );
        Ok(estimate)
    }

    /// `count * contiguity / (std + 1)`.
    fn score_bin(&self, bin: &[Sample]) -> f64 {
        let count = bin.len() as f64;
        flatness_weighted(count, self.depth_std(bin), contiguity(bin, self.params.spatial_bin_px))
    }

    fn depth_std(&self, bin: &[Sample]) -> f64 {
        let step = bin.len().div_ceil(self.params.flatness_samples.max(1)).max(1);
        let mut n = 0.0;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for s in bin.iter().step_by(step) {
            let d = s.depth as f64;
            n += 1.0;
            sum += d;
            sum_sq += d * d;
        }
        if n == 0.0 {
            return 0.0;
        }
        let mean = sum / n;
        (sum_sq / n - mean * mean).max(0.0).sqrt()
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn estimate_central_mode(
        &self,
        frame: &DepthFrameView<'_>,
    ) -> Result<SurfaceEstimate, StageError> {
        let p = &self.params;
        let stride = p.sample_stride.max(1);
        let (lo, hi) = (p.min_depth_mm, p.max_depth_mm.max(p.min_depth_mm));
        let frac = p.central_window_fraction.clamp(0.0, 1.0);
        let win_w = ((frame.width as f32 * frac) as usize).max(1);
        let win_h = ((frame.height as f32 * frac) as usize).max(1);
        let x0 = (frame.width - win_w.min(frame.width)) / 2;
        let y0 = (frame.height - win_h.min(frame.height)) / 2;

        let mut histogram = vec![0u32; (hi - lo) as usize + 1];
        let mut valid = 0usize;
        for y in (y0..(y0 + win_h).min(frame.height)).step_by(stride) {
            for x in (x0..(x0 + win_w).min(frame.width)).step_by(stride) {
                let d = frame.get(x, y);
                if d < lo || d > hi {
                    continue;
                }
                histogram[(d - lo) as usize] += 1;
                valid += 1;
            }
        }
        if valid < p.min_bin_points {
            return Err(StageError::InsufficientSamples {
                stage: Stage::Surface,
                found: valid,
                required: p.min_bin_points,
            });
        }

        let mut mode_idx = 0usize;
        let mut mode_count = 0u32;
        for (i, &c) in histogram.iter().enumerate() {
            if c > mode_count {
                mode_idx = i;
                mode_count = c;
            }
        }
        let depth_mm = lo + mode_idx as u16;
        debug!(
            "surface: central mode {}mm ({} of {} samples)",
            depth_mm, mode_count, valid
        );
        Ok(SurfaceEstimate {
            depth_mm,
            method: SurfaceMethod::CentralMode,
            support: mode_count as usize,
            score: mode_count as f64,
        })
    }
}

#[inline]
fn flatness_weighted(count: f64, std: f64, contiguity: f64) -> f64 {
    count * contiguity / (std + 1.0)
}

/// Occupied spatial cells over the bounding area of those cells.
fn contiguity(bin: &[Sample], cell_px: usize) -> f64 {
    let cell = cell_px.max(1) as u32;
    let mut cells: Vec<(u32, u32)> = bin.iter().map(|s| (s.x / cell, s.y / cell)).collect();
    cells.sort_unstable();
    cells.dedup();
    let Some(&(first_x, first_y)) = cells.first() else {
        return 0.0;
    };
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first_x, first_x, first_y, first_y);
    for &(cx, cy) in &cells {
        min_x = min_x.min(cx);
        max_x = max_x.max(cx);
        min_y = min_y.min(cy);
        max_y = max_y.max(cy);
    }
    let area = ((max_x - min_x + 1) as f64) * ((max_y - min_y + 1) as f64);
    cells.len() as f64 / area
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletop_core::DepthFrame;

    #[test]
    fn uniform_table_is_found() {
        let frame = DepthFrame::filled(320, 240, 1000).unwrap();
        let est = SurfaceEstimator::default()
            .estimate_scored(&frame.view())
            .unwrap();
        assert_eq!(est.depth_mm, 1000);
        assert_eq!(est.support, 80 * 60);
        assert_eq!(est.method, SurfaceMethod::Scored);
    }

    #[test]
    fn empty_frame_reports_insufficient_samples() {
        let frame = DepthFrame::filled(320, 240, 0).unwrap();
        let err = SurfaceEstimator::default()
            .estimate(&frame.view(), ViewingMode::Angled)
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::InsufficientSamples {
                stage: Stage::Surface,
                found: 0,
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_depths_are_ignored() {
        let frame = DepthFrame::filled(320, 240, 4000).unwrap();
        assert!(SurfaceEstimator::default()
            .estimate_scored(&frame.view())
            .is_err());
    }

    #[test]
    fn contiguous_bin_beats_scattered_bin() {
        // Two far-apart blocks at 800mm outnumber one compact block at 1200mm,
        // but cover a small fraction of their bounding area.
        let mut frame = DepthFrame::filled(320, 240, 0).unwrap();
        frame.fill_rect(0, 0, 40, 40, 800);
        frame.fill_rect(280, 200, 40, 40, 800);
        frame.fill_rect(100, 80, 48, 48, 1200);
        let est = SurfaceEstimator::default()
            .estimate_scored(&frame.view())
            .unwrap();
        assert_eq!(est.depth_mm, 1200);
        assert_eq!(est.support, 144);
    }

    #[test]
    fn noisy_bin_uses_median_true_depth() {
        let mut frame = DepthFrame::filled(320, 240, 1003).unwrap();
        for y in 0..240 {
            for x in 0..320 {
                if (x / 4 + y / 4) % 3 == 0 {
                    frame.set(x, y, 1009);
                }
            }
        }
        let est = SurfaceEstimator::default()
            .estimate_scored(&frame.view())
            .unwrap();
        assert_eq!(est.depth_mm, 1003);
    }

    #[test]
    fn central_mode_fast_path_in_overhead_view() {
        let mut frame = DepthFrame::filled(320, 240, 1500).unwrap();
        frame.fill_rect(60, 40, 200, 160, 1000);
        let estimator = SurfaceEstimator::new(SurfaceParams {
            overhead_fast_path: true,
            ..SurfaceParams::default()
        });
        let est = estimator
            .estimate(&frame.view(), ViewingMode::Overhead)
            .unwrap();
        assert_eq!(est.method, SurfaceMethod::CentralMode);
        assert_eq!(est.depth_mm, 1000);

        let angled = estimator.estimate(&frame.view(), ViewingMode::Angled).unwrap();
        assert_eq!(angled.method, SurfaceMethod::Scored);
    }

    #[test]
    fn update_smooths_and_respects_lock() {
        let estimator = SurfaceEstimator::default();
        let mut surface = TableSurface::new(5);
        let frame = DepthFrame::filled(320, 240, 1000).unwrap();
        assert_eq!(
            estimator
                .update(&mut surface, &frame.view(), ViewingMode::Angled)
                .unwrap(),
            1000
        );

        surface.lock();
        let moved = DepthFrame::filled(320, 240, 1200).unwrap();
        assert_eq!(
            estimator
                .update(&mut surface, &moved.view(), ViewingMode::Angled)
                .unwrap(),
            1000
        );
        assert_eq!(surface.history().count(), 1);
    }

    #[test]
    fn failed_estimate_keeps_surface() {
        let estimator = SurfaceEstimator::default();
        let mut surface = TableSurface::new(5);
        surface.set_depth(990);
        let frame = DepthFrame::filled(64, 48, 0).unwrap();
        assert!(estimator
            .update(&mut surface, &frame.view(), ViewingMode::Angled)
            .is_err());
        assert_eq!(surface.depth_mm(), 990);
    }
}
