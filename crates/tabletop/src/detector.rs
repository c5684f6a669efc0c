use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use log::{debug, info, warn};
use tabletop_core::{
    ColorFrameView, DepthFrame, DepthFrameView, LatestFrameSlot, PlaneModel, RegionOfInterest,
    StageError, TableSurface, Token,
};
use tabletop_segment::{BlobSegmenter, SegmentWorkspace};
use tabletop_surface::{HeightGrid, HeightGridBuilder, PlaneFitter, RoiDetector, SurfaceEstimator};
use tabletop_track::{PinholeMapping, PixelToWorld, TokenTracker, WorldMapper};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    DetectionContext, DetectorConfig, FrameReport, FrameStatus, HeightGridSummary, StageNote,
    StageTimings,
};

/// Sensor data for one cycle. Either image may be missing.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameInput<'a> {
    pub depth: Option<DepthFrameView<'a>>,
    pub color: Option<ColorFrameView<'a>>,
}

impl<'a> FrameInput<'a> {
    pub fn depth(depth: DepthFrameView<'a>) -> Self {
        Self {
            depth: Some(depth),
            color: None,
        }
    }

    pub fn with_color(mut self, color: ColorFrameView<'a>) -> Self {
        self.color = Some(color);
        self
    }
}

#[derive(Clone, Debug)]
struct Stages {
    surface: SurfaceEstimator,
    roi: RoiDetector,
    plane: PlaneFitter,
    height_grid: HeightGridBuilder,
    segment: BlobSegmenter,
}

impl Stages {
    fn new(config: &DetectorConfig) -> Self {
        Self {
            surface: SurfaceEstimator::new(config.surface.clone()),
            roi: RoiDetector::new(config.roi.clone()),
            plane: PlaneFitter::new(config.plane.clone()),
            height_grid: HeightGridBuilder::new(config.height_grid.clone()),
            segment: BlobSegmenter::new(config.segment.clone()),
        }
    }
}

/// State produced by one frame, committed only if every stage returned.
struct FrameOutcome {
    frame_size: (usize, usize),
    surface: TableSurface,
    roi: Option<RegionOfInterest>,
    plane: PlaneModel,
    height_grid: Option<HeightGrid>,
    tracker: TokenTracker,
    tokens: Vec<Token>,
    notes: Vec<StageNote>,
    timings: StageTimings,
}

/// Frame-driven tabletop detector.
///
/// Each call to [`process_frame`](Self::process_frame) runs the full chain
/// surface, ROI, plane, height grid, segmentation, tracking and world mapping
/// against the [`DetectionContext`] left by the previous call. Stage failures
/// keep the previous state of that stage; a missing frame or an internal
/// fault skips the cycle without touching any state.
pub struct TabletopDetector<M = PinholeMapping> {
    config: DetectorConfig,
    stages: Stages,
    mapper: WorldMapper<M>,
    context: DetectionContext,
    workspace: SegmentWorkspace,
    frame_index: u64,
}

impl TabletopDetector<PinholeMapping> {
    /// Detector using the default 640x480 pinhole intrinsics.
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_mapping(config, PinholeMapping::default())
    }

    /// Detector with pinhole intrinsics rescaled to the depth resolution.
    pub fn for_resolution(config: DetectorConfig, width: usize, height: usize) -> Self {
        Self::with_mapping(config, PinholeMapping::scaled(width, height))
    }
}

impl<M: PixelToWorld> TabletopDetector<M> {
    pub fn with_mapping(config: DetectorConfig, mapping: M) -> Self {
        Self {
            stages: Stages::new(&config),
            context: DetectionContext::new(&config),
            mapper: WorldMapper::new(mapping),
            workspace: SegmentWorkspace::new(),
            frame_index: 0,
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn context(&self) -> &DetectionContext {
        &self.context
    }

    pub fn table_depth_mm(&self) -> u16 {
        self.context.table_depth_mm()
    }

    pub fn is_table_locked(&self) -> bool {
        self.context.is_table_locked()
    }

    pub fn roi(&self) -> Option<&RegionOfInterest> {
        self.context.roi()
    }

    pub fn tokens(&self) -> &[Token] {
        self.context.tokens()
    }

    /// Run one frame through the pipeline. Never fails and never panics.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, input), fields(frame = self.frame_index))
    )]
    pub fn process_frame(&mut self, input: FrameInput<'_>) -> FrameReport {
        let started = Instant::now();
        let index = self.frame_index;
        self.frame_index += 1;

        let Some(depth) = input.depth else {
            return self.skip(index, "no depth frame".to_string(), started);
        };
        if self.config.require_color && input.color.is_none() {
            return self.skip(index, "no color frame".to_string(), started);
        }

        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            run_stages(
                &self.config,
                &self.stages,
                &self.mapper,
                &self.context,
                &mut self.workspace,
                &depth,
                input.color.as_ref(),
            )
        }));
        match run {
            Ok(mut outcome) => {
                outcome.timings.total_us = micros(started);
                self.commit(index, outcome)
            }
            Err(payload) => {
                let reason = format!("internal fault: {}", panic_message(payload.as_ref()));
                warn!("frame {index}: {reason}");
                self.skip(index, reason, started)
            }
        }
    }

    /// Process the most recent frame in `slot`, if one is pending.
    pub fn process_latest(&mut self, slot: &LatestFrameSlot<DepthFrame>) -> Option<FrameReport> {
        let frame = slot.take()?;
        Some(self.process_frame(FrameInput::depth(frame.view())))
    }

    pub fn lock_table(&mut self) {
        self.context.surface.lock();
        info!("table depth locked at {} mm", self.context.table_depth_mm());
    }

    pub fn unlock_table(&mut self) {
        self.context.surface.unlock();
    }

    /// Replace the smoothed table depth with a calibrated value.
    pub fn set_table_depth(&mut self, depth_mm: u16) {
        self.context.surface.set_depth(depth_mm);
        info!("table depth set to {depth_mm} mm");
    }

    /// Freeze the current ROI (or the full frame, if none was found yet).
    pub fn lock_roi(&mut self) {
        self.context.roi_locked = true;
    }

    pub fn unlock_roi(&mut self) {
        self.context.roi_locked = false;
    }

    /// Install a manual ROI and lock it.
    ///
    /// The ROI is validated against the size of the last processed frame, so
    /// at least one frame must have been processed. A ROI failing validation
    /// is rejected and the previous one stays.
    pub fn set_roi(&mut self, roi: RegionOfInterest) -> Result<(), StageError> {
        let Some((frame_w, frame_h)) = self.context.frame_size else {
            return Err(StageError::SensorFrameMissing {
                reason: "no frame processed yet to validate the ROI against".to_string(),
            });
        };
        self.stages
            .roi
            .commit(&mut self.context.roi, roi, frame_w, frame_h)?;
        self.context.roi_locked = true;
        Ok(())
    }

    /// Forget table, ROI and tracks; ids keep counting up.
    pub fn reset(&mut self) {
        self.context.reset();
        info!("detector state reset");
    }

    /// Label a live token; `false` if no track has this id.
    pub fn set_label(&mut self, id: u64, label: Option<String>) -> bool {
        if !self.context.tracker.set_label(id, label.clone()) {
            return false;
        }
        if let Some(token) = self.context.tokens.iter_mut().find(|t| t.id == id) {
            token.label = label;
        }
        true
    }

    /// Categorize a live token; `false` if no track has this id.
    pub fn set_category(&mut self, id: u64, category: Option<String>) -> bool {
        if !self.context.tracker.set_category(id, category.clone()) {
            return false;
        }
        if let Some(token) = self.context.tokens.iter_mut().find(|t| t.id == id) {
            token.category = category;
        }
        true
    }

    fn commit(&mut self, index: u64, outcome: FrameOutcome) -> FrameReport {
        let ctx = &mut self.context;
        if outcome.surface.depth_mm() != ctx.surface.depth_mm() {
            info!(
                "table depth {} -> {} mm",
                ctx.surface.depth_mm(),
                outcome.surface.depth_mm()
            );
        }
        ctx.surface = outcome.surface;
        ctx.roi = outcome.roi;
        ctx.plane = outcome.plane;
        ctx.height_grid = outcome.height_grid;
        ctx.tracker = outcome.tracker;
        ctx.tokens = outcome.tokens;
        ctx.frame_size = Some(outcome.frame_size);
        ctx.frames_processed += 1;
        self.report(index, FrameStatus::Processed, outcome.notes, outcome.timings)
    }

    fn skip(&mut self, index: u64, reason: String, started: Instant) -> FrameReport {
        self.context.frames_skipped += 1;
        debug!("frame {index}: skipped ({reason})");
        let err = StageError::SensorFrameMissing {
            reason: reason.clone(),
        };
        let timings = StageTimings {
            total_us: micros(started),
            ..StageTimings::default()
        };
        self.report(
            index,
            FrameStatus::Skipped { reason },
            vec![StageNote::from(&err)],
            timings,
        )
    }

    fn report(
        &self,
        index: u64,
        status: FrameStatus,
        notes: Vec<StageNote>,
        timings: StageTimings,
    ) -> FrameReport {
        let ctx = &self.context;
        FrameReport {
            frame_index: index,
            status,
            notes,
            table_depth_mm: ctx.table_depth_mm(),
            table_locked: ctx.is_table_locked(),
            roi: ctx.roi,
            roi_locked: ctx.roi_locked,
            plane: ctx.plane,
            height_grid: ctx.height_grid.as_ref().map(HeightGridSummary::from),
            tokens: ctx.tokens.clone(),
            timings,
        }
    }
}

fn run_stages<M: PixelToWorld>(
    config: &DetectorConfig,
    stages: &Stages,
    mapper: &WorldMapper<M>,
    context: &DetectionContext,
    ws: &mut SegmentWorkspace,
    depth: &DepthFrameView<'_>,
    color: Option<&ColorFrameView<'_>>,
) -> FrameOutcome {
    let mode = config.viewing_mode;
    let mut notes = Vec::new();
    let mut timings = StageTimings::default();

    let t = Instant::now();
    let mut surface = context.surface.clone();
    if let Err(err) = stages.surface.update(&mut surface, depth, mode) {
        notes.push(StageNote::from(&err));
    }
    timings.surface_us = micros(t);
    let table = surface.depth_mm();

    let t = Instant::now();
    let mut roi = context.roi;
    if !context.roi_locked && surface.is_seeded() {
        let committed = stages
            .roi
            .propose(depth, table, mode)
            .and_then(|proposal| stages.roi.commit(&mut roi, proposal, depth.width, depth.height));
        if let Err(err) = committed {
            notes.push(StageNote::from(&err));
        }
    }
    timings.roi_us = micros(t);

    let mut tracker = context.tracker.clone();
    if !surface.is_seeded() {
        // no table to measure heights against; tracks still age
        let t = Instant::now();
        let tokens = tracker.update(Vec::new());
        timings.track_us = micros(t);
        return FrameOutcome {
            frame_size: (depth.width, depth.height),
            surface,
            roi,
            plane: context.plane,
            height_grid: None,
            tracker,
            tokens,
            notes,
            timings,
        };
    }
    let active = roi.unwrap_or_else(|| depth.full_roi());

    let t = Instant::now();
    let (plane, plane_err) = stages.plane.fit_or_flat(depth, &active, table, mode);
    if let Some(err) = plane_err {
        notes.push(StageNote::from(&err));
    }
    timings.plane_us = micros(t);

    let t = Instant::now();
    let height_grid = stages.height_grid.build(depth, &active, &plane);
    timings.height_grid_us = micros(t);

    let t = Instant::now();
    let candidates = stages.segment.segment(depth, &active, &plane, ws);
    let observed: Vec<Token> = candidates
        .iter()
        .map(|c| {
            let mut token = c.to_token(stages.segment.classify(c));
            if let Some(color) = color {
                token.color = color.mean_rgb(depth.width, depth.height, c.pixels(depth.width));
            }
            token
        })
        .collect();
    timings.segment_us = micros(t);

    let t = Instant::now();
    let mut tokens = tracker.update(observed);
    timings.track_us = micros(t);

    let t = Instant::now();
    mapper.apply(&mut tokens);
    timings.world_us = micros(t);

    debug!(
        "frame: table {} mm, {} candidates, {} tokens, tilt {:.1} deg",
        table,
        candidates.len(),
        tokens.len(),
        plane.tilt_deg()
    );

    FrameOutcome {
        frame_size: (depth.width, depth.height),
        surface,
        roi,
        plane,
        height_grid: Some(height_grid),
        tracker,
        tokens,
        notes,
        timings,
    }
}

fn micros(since: Instant) -> u64 {
    since.elapsed().as_micros().min(u64::MAX as u128) as u64
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletop_core::{ChannelOrder, Stage};

    fn scene() -> DepthFrame {
        let mut frame = DepthFrame::filled(320, 240, 0).unwrap();
        frame.fill_rect(40, 30, 240, 180, 1000);
        frame.fill_rect(150, 110, 5, 5, 950);
        frame
    }

    #[test]
    fn missing_depth_skips_without_touching_state() {
        let mut det = TabletopDetector::for_resolution(DetectorConfig::default(), 320, 240);
        let frame = scene();
        det.process_frame(FrameInput::depth(frame.view()));
        let depth = det.table_depth_mm();
        let roi = det.roi().copied();

        let report = det.process_frame(FrameInput::default());
        assert_eq!(
            report.status,
            FrameStatus::Skipped {
                reason: "no depth frame".into()
            }
        );
        assert_eq!(report.notes[0].stage, None);
        assert_eq!(report.frame_index, 1);
        assert_eq!(det.table_depth_mm(), depth);
        assert_eq!(det.roi().copied(), roi);
        assert_eq!(det.context().frames_processed(), 1);
        assert_eq!(det.context().frames_skipped(), 1);
    }

    #[test]
    fn required_color_is_enforced() {
        let config = DetectorConfig {
            require_color: true,
            ..DetectorConfig::default()
        };
        let mut det = TabletopDetector::for_resolution(config, 320, 240);
        let frame = scene();
        let report = det.process_frame(FrameInput::depth(frame.view()));
        assert!(!report.is_processed());
        assert_eq!(det.table_depth_mm(), 0);

        let rgb = vec![200u8; 320 * 240 * 3];
        let color = ColorFrameView::new(320, 240, ChannelOrder::Rgb, &rgb).unwrap();
        let report = det.process_frame(FrameInput::depth(frame.view()).with_color(color));
        assert!(report.is_processed());
        assert_eq!(det.table_depth_mm(), 1000);
    }

    #[test]
    fn internal_fault_is_contained() {
        let mapping = |_: f64, _: f64, _: u16| -> [f64; 3] { panic!("mapper exploded") };
        let mut det = TabletopDetector::with_mapping(DetectorConfig::default(), mapping);
        let frame = scene();
        let mut last = None;
        for _ in 0..3 {
            last = Some(det.process_frame(FrameInput::depth(frame.view())));
        }
        // the third frame emits a token, reaches the mapper and faults
        let report = last.unwrap();
        match &report.status {
            FrameStatus::Skipped { reason } => assert!(reason.contains("mapper exploded")),
            other => panic!("unexpected status {other:?}"),
        }
        assert!(report.tokens.is_empty());
        assert_eq!(det.context().frames_processed(), 2);
        assert_eq!(det.context().tracker().track_count(), 0);
    }

    #[test]
    fn empty_frame_reports_surface_failure() {
        let mut det = TabletopDetector::new(DetectorConfig::default());
        let frame = DepthFrame::filled(64, 48, 0).unwrap();
        let report = det.process_frame(FrameInput::depth(frame.view()));
        assert!(report.is_processed());
        assert_eq!(report.notes.len(), 1);
        assert_eq!(report.notes[0].stage, Some(Stage::Surface));
        assert_eq!(report.table_depth_mm, 0);
        assert!(report.height_grid.is_none());
    }
}
