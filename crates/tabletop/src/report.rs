use serde::{Deserialize, Serialize};
use tabletop_core::{PlaneModel, RegionOfInterest, Stage, StageError, Token};
use tabletop_surface::HeightGrid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FrameStatus {
    Processed,
    /// Nothing was committed for this frame.
    Skipped { reason: String },
}

/// A recoverable stage failure observed while processing a frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNote {
    pub stage: Option<Stage>,
    pub message: String,
}

impl From<&StageError> for StageNote {
    fn from(err: &StageError) -> Self {
        Self {
            stage: err.stage(),
            message: err.to_string(),
        }
    }
}

/// Wall time per stage in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub surface_us: u64,
    pub roi_us: u64,
    pub plane_us: u64,
    pub height_grid_us: u64,
    pub segment_us: u64,
    pub track_us: u64,
    pub world_us: u64,
    pub total_us: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightGridSummary {
    pub cols: usize,
    pub rows: usize,
    pub cell_size: usize,
    pub occupied_cells: usize,
    pub max_height_mm: i32,
}

impl From<&HeightGrid> for HeightGridSummary {
    fn from(grid: &HeightGrid) -> Self {
        Self {
            cols: grid.cols,
            rows: grid.rows,
            cell_size: grid.cell_size,
            occupied_cells: grid.occupied_cells(),
            max_height_mm: grid.max_height_mm(),
        }
    }
}

/// Outcome of one [`process_frame`](crate::TabletopDetector::process_frame) call.
///
/// State fields reflect the detector after the call, so a skipped frame
/// reports the state carried over from the previous one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Running index over every frame handed to the detector.
    pub frame_index: u64,
    #[serde(flatten)]
    pub status: FrameStatus,
    pub notes: Vec<StageNote>,
    pub table_depth_mm: u16,
    pub table_locked: bool,
    pub roi: Option<RegionOfInterest>,
    pub roi_locked: bool,
    pub plane: PlaneModel,
    pub height_grid: Option<HeightGridSummary>,
    pub tokens: Vec<Token>,
    pub timings: StageTimings,
}

impl FrameReport {
    pub fn is_processed(&self) -> bool {
        self.status == FrameStatus::Processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_flattened_into_the_report() {
        let report = FrameReport {
            frame_index: 4,
            status: FrameStatus::Skipped {
                reason: "no depth frame".into(),
            },
            notes: vec![StageNote::from(&StageError::InsufficientSamples {
                stage: Stage::Surface,
                found: 3,
                required: 100,
            })],
            table_depth_mm: 1000,
            table_locked: false,
            roi: None,
            roi_locked: false,
            plane: PlaneModel::flat(1000),
            height_grid: None,
            tokens: Vec::new(),
            timings: StageTimings::default(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "no depth frame");
        assert_eq!(json["notes"][0]["stage"], "surface");

        let back: FrameReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
        assert!(!back.is_processed());
    }
}
