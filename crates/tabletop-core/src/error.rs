use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RoiRejection;

/// Pipeline stage that produced a [`StageError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Surface,
    Roi,
    Plane,
    HeightGrid,
    Segment,
    Track,
    World,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Surface => "surface",
            Stage::Roi => "roi",
            Stage::Plane => "plane",
            Stage::HeightGrid => "height-grid",
            Stage::Segment => "segment",
            Stage::Track => "track",
            Stage::World => "world",
        };
        f.write_str(name)
    }
}

/// Recoverable per-stage failures.
///
/// None of these abort a frame. The caller keeps its previous state for the
/// failing stage and carries on with the rest of the pipeline.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum StageError {
    #[error("{stage}: insufficient samples ({found} < {required})")]
    InsufficientSamples {
        stage: Stage,
        found: usize,
        required: usize,
    },
    #[error("ROI proposal rejected: {0}")]
    InvalidRoiProposal(#[from] RoiRejection),
    #[error("{stage}: degenerate geometry ({reason})")]
    DegenerateGeometry { stage: Stage, reason: &'static str },
    #[error("sensor frame missing: {reason}")]
    SensorFrameMissing { reason: String },
}

impl StageError {
    /// Stage the error belongs to; `None` for a missing sensor frame.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageError::InsufficientSamples { stage, .. }
            | StageError::DegenerateGeometry { stage, .. } => Some(*stage),
            StageError::InvalidRoiProposal(_) => Some(Stage::Roi),
            StageError::SensorFrameMissing { .. } => None,
        }
    }
}

/// Errors produced when wrapping raw sensor buffers.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid frame buffer length (expected {expected} samples, got {got})")]
    InvalidBuffer { expected: usize, got: usize },
}
