use tabletop_core::{PlaneModel, RegionOfInterest, TableSurface, Token};
use tabletop_surface::HeightGrid;
use tabletop_track::TokenTracker;

use crate::DetectorConfig;

/// Everything the pipeline carries from one frame to the next.
///
/// Owned by a single [`TabletopDetector`](crate::TabletopDetector) and only
/// replaced as a whole once a frame has run through every stage.
#[derive(Clone, Debug)]
pub struct DetectionContext {
    pub(crate) surface: TableSurface,
    pub(crate) roi: Option<RegionOfInterest>,
    pub(crate) roi_locked: bool,
    pub(crate) plane: PlaneModel,
    pub(crate) height_grid: Option<HeightGrid>,
    pub(crate) tracker: TokenTracker,
    pub(crate) tokens: Vec<Token>,
    pub(crate) frame_size: Option<(usize, usize)>,
    pub(crate) frames_processed: u64,
    pub(crate) frames_skipped: u64,
}

impl DetectionContext {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            surface: TableSurface::new(config.surface.history_len),
            roi: None,
            roi_locked: false,
            plane: PlaneModel::flat(0),
            height_grid: None,
            tracker: TokenTracker::new(config.tracker.clone()),
            tokens: Vec::new(),
            frame_size: None,
            frames_processed: 0,
            frames_skipped: 0,
        }
    }

    pub fn surface(&self) -> &TableSurface {
        &self.surface
    }

    /// Smoothed table depth, `0` before the first estimate.
    pub fn table_depth_mm(&self) -> u16 {
        self.surface.depth_mm()
    }

    pub fn is_table_locked(&self) -> bool {
        self.surface.is_locked()
    }

    pub fn roi(&self) -> Option<&RegionOfInterest> {
        self.roi.as_ref()
    }

    pub fn is_roi_locked(&self) -> bool {
        self.roi_locked
    }

    pub fn plane(&self) -> &PlaneModel {
        &self.plane
    }

    pub fn height_grid(&self) -> Option<&HeightGrid> {
        self.height_grid.as_ref()
    }

    pub fn tracker(&self) -> &TokenTracker {
        &self.tracker
    }

    /// Tokens emitted by the last processed frame.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// `(width, height)` of the last processed frame.
    pub fn frame_size(&self) -> Option<(usize, usize)> {
        self.frame_size
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Forget the table, the ROI and every track.
    ///
    /// Frame counters and the tracker id sequence keep running.
    pub(crate) fn reset(&mut self) {
        self.surface.reset();
        self.roi = None;
        self.roi_locked = false;
        self.plane = PlaneModel::flat(0);
        self.height_grid = None;
        self.tracker.reset();
        self.tokens.clear();
    }
}
