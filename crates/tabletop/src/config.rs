use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tabletop_segment::SegmentParams;
use tabletop_surface::{HeightGridParams, PlaneParams, RoiParams, SurfaceParams, ViewingMode};
use tabletop_track::TrackerParams;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Full detector configuration.
///
/// Every field falls back to its default, so a JSON file only needs the
/// values it changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub viewing_mode: ViewingMode,
    /// Skip frames that arrive without a color image.
    pub require_color: bool,
    pub surface: SurfaceParams,
    pub roi: RoiParams,
    pub plane: PlaneParams,
    pub height_grid: HeightGridParams,
    pub segment: SegmentParams,
    pub tracker: TrackerParams,
}

impl DetectorConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn with_viewing_mode(mut self, mode: ViewingMode) -> Self {
        self.viewing_mode = mode;
        self
    }

    pub fn is_angled(&self) -> bool {
        self.viewing_mode == ViewingMode::Angled
    }

    pub fn min_token_height_mm(&self) -> u16 {
        self.segment.min_token_height_mm
    }

    pub fn max_token_height_mm(&self) -> u16 {
        self.segment.max_token_height_mm
    }

    /// Pixel count a blob needs before height relaxation.
    pub fn detection_threshold(&self) -> usize {
        self.segment.detection_threshold
    }

    /// Height to diameter ratio separating miniatures from flat tokens.
    pub fn base_to_height_ratio(&self) -> f32 {
        self.segment.miniature_ratio
    }

    /// Inclusive `(min, max)` depth window of the table search.
    pub fn table_depth_bounds(&self) -> (u16, u16) {
        (self.surface.min_depth_mm, self.surface.max_depth_mm)
    }

    pub fn grid_cell_size_px(&self) -> usize {
        self.height_grid.cell_size_px
    }
}
