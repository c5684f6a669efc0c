use log::{debug, info};
use tabletop_core::{DepthFrameView, RegionOfInterest, Stage, StageError};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{RoiParams, ViewingMode};

/// Bounds the pixels lying on the table depth.
#[derive(Clone, Debug, Default)]
pub struct RoiDetector {
    params: RoiParams,
}

impl RoiDetector {
    pub fn new(params: RoiParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RoiParams {
        &self.params
    }

    fn tolerance_mm(&self, x: usize, y: usize, w: usize, h: usize, mode: ViewingMode) -> f32 {
        let p = &self.params;
        let band_x = (w as f32 * p.edge_band_fraction) as usize;
        let band_y = (h as f32 * p.edge_band_fraction) as usize;
        let near_edge = x < band_x || y < band_y || x + band_x >= w || y + band_y >= h;
        let base = if near_edge {
            p.edge_tolerance_mm
        } else {
            p.center_tolerance_mm
        } as f32;
        match mode {
            ViewingMode::Overhead => base,
            ViewingMode::Angled => base * p.angled_tolerance_scale,
        }
    }

    /// Propose a validated ROI around the table pixels of `frame`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn propose(
        &self,
        frame: &DepthFrameView<'_>,
        table_depth_mm: u16,
        mode: ViewingMode,
    ) -> Result<RegionOfInterest, StageError> {
        let p = &self.params;
        let (w, h) = (frame.width, frame.height);
        let stride = p.sample_stride.max(1);
        let table = table_depth_mm as f32;

        let mut xs = Vec::new();
        let mut ys = Vec::new();
        if table_depth_mm != 0 {
            for y in (0..h).step_by(stride) {
                for x in (0..w).step_by(stride) {
                    let Some(d) = frame.sample(x, y) else {
                        continue;
                    };
                    if (d as f32 - table).abs() <= self.tolerance_mm(x, y, w, h, mode) {
                        xs.push(x);
                        ys.push(y);
                    }
                }
            }
        }
        if xs.len() < p.min_points.max(1) {
            return Err(StageError::InsufficientSamples {
                stage: Stage::Roi,
                found: xs.len(),
                required: p.min_points.max(1),
            });
        }

        let (x_lo, x_hi) = trimmed_range(&mut xs, p.trim_fraction);
        let (y_lo, y_hi) = trimmed_range(&mut ys, p.trim_fraction);
        let x0 = x_lo.saturating_sub(p.margin_px);
        let y0 = y_lo.saturating_sub(p.margin_px);
        let x1 = (x_hi + 1 + p.margin_px).min(w);
        let y1 = (y_hi + 1 + p.margin_px).min(h);
        let roi = RegionOfInterest::new(x0, y0, x1 - x0, y1 - y0);

        roi.validate(&p.limits, w, h)?;
        debug!("roi: proposed {:?} from {} table samples", roi, xs.len());
        Ok(roi)
    }

    /// Replace `slot` with `proposal` if it passes validation.
    ///
    /// On rejection the previous ROI is left in place and the reason returned.
    pub fn commit(
        &self,
        slot: &mut Option<RegionOfInterest>,
        proposal: RegionOfInterest,
        frame_w: usize,
        frame_h: usize,
    ) -> Result<(), StageError> {
        proposal.validate(&self.params.limits, frame_w, frame_h)?;
        if slot.as_ref() != Some(&proposal) {
            info!("roi: committed {:?}", proposal);
        }
        *slot = Some(proposal);
        Ok(())
    }
}

/// Min/max after dropping `fraction` of the values at each end.
fn trimmed_range(values: &mut [usize], fraction: f32) -> (usize, usize) {
    values.sort_unstable();
    let n = values.len();
    let k = ((n as f32 * fraction.clamp(0.0, 0.49)) as usize).min((n - 1) / 2);
    (values[k], values[n - 1 - k])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletop_core::{DepthFrame, RoiLimits, RoiRejection};

    fn table_frame() -> DepthFrame {
        let mut frame = DepthFrame::filled(320, 240, 0).unwrap();
        frame.fill_rect(40, 30, 240, 180, 1000);
        frame
    }

    #[test]
    fn proposes_box_around_table() {
        let frame = table_frame();
        let roi = RoiDetector::default()
            .propose(&frame.view(), 1000, ViewingMode::Overhead)
            .unwrap();
        assert!(roi.x <= 48 && roi.x >= 30, "{roi:?}");
        assert!(roi.y <= 40 && roi.y >= 20, "{roi:?}");
        assert!(roi.right() >= 270 && roi.right() <= 290, "{roi:?}");
        assert!(roi.bottom() >= 200 && roi.bottom() <= 220, "{roi:?}");
    }

    #[test]
    fn outlier_pixels_are_trimmed() {
        let mut frame = table_frame();
        // isolated speckles at table depth far from the table
        frame.set(0, 0, 1000);
        frame.set(316, 236, 1000);
        let roi = RoiDetector::default()
            .propose(&frame.view(), 1000, ViewingMode::Overhead)
            .unwrap();
        assert!(roi.x > 0 && roi.y > 0);
        assert!(roi.right() < 320 && roi.bottom() < 240);
    }

    #[test]
    fn edge_tolerance_is_stricter_than_center() {
        // Table at 1020 seen with table depth 1000: within center tolerance,
        // outside edge tolerance.
        let mut frame = DepthFrame::filled(320, 240, 0).unwrap();
        frame.fill_rect(0, 0, 320, 240, 1020);
        let roi = RoiDetector::default()
            .propose(&frame.view(), 1000, ViewingMode::Overhead)
            .unwrap();
        assert!(roi.x >= 48 - 10 && roi.right() <= 272 + 10, "{roi:?}");
    }

    #[test]
    fn angled_view_widens_tolerance() {
        let mut frame = DepthFrame::filled(320, 240, 0).unwrap();
        frame.fill_rect(60, 40, 200, 160, 1040);
        let detector = RoiDetector::default();
        assert!(detector
            .propose(&frame.view(), 1000, ViewingMode::Overhead)
            .is_err());
        assert!(detector
            .propose(&frame.view(), 1000, ViewingMode::Angled)
            .is_ok());
    }

    #[test]
    fn full_frame_table_is_rejected() {
        let frame = DepthFrame::filled(320, 240, 1000).unwrap();
        let err = RoiDetector::new(RoiParams {
            center_tolerance_mm: 25,
            edge_tolerance_mm: 25,
            ..RoiParams::default()
        })
        .propose(&frame.view(), 1000, ViewingMode::Overhead)
        .unwrap_err();
        assert!(matches!(
            err,
            StageError::InvalidRoiProposal(RoiRejection::TooLarge { .. })
        ));
    }

    #[test]
    fn rejected_commit_keeps_previous_roi() {
        let detector = RoiDetector::new(RoiParams {
            limits: RoiLimits {
                min_size: 20,
                ..RoiLimits::default()
            },
            ..RoiParams::default()
        });
        let previous = RegionOfInterest::new(100, 100, 400, 300);
        let mut slot = Some(previous);
        let err = detector
            .commit(&mut slot, RegionOfInterest::new(10, 10, 40, 500), 1000, 1000)
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::InvalidRoiProposal(RoiRejection::Aspect { .. })
        ));
        assert_eq!(slot, Some(previous));

        let next = RegionOfInterest::new(120, 100, 400, 320);
        detector.commit(&mut slot, next, 1000, 1000).unwrap();
        assert_eq!(slot, Some(next));
    }

    #[test]
    fn missing_table_depth_yields_no_proposal() {
        let frame = table_frame();
        let err = RoiDetector::default()
            .propose(&frame.view(), 0, ViewingMode::Overhead)
            .unwrap_err();
        assert!(matches!(err, StageError::InsufficientSamples { found: 0, .. }));
    }
}
