//! Table surface stages of the tabletop pipeline.
//!
//! Per frame, in order:
//! 1. [`SurfaceEstimator`] finds the dominant planar depth (the table).
//! 2. [`RoiDetector`] bounds the pixels lying on that depth.
//! 3. [`PlaneFitter`] fits a tilted plane inside the ROI (angled view only).
//! 4. [`HeightGridBuilder`] averages height above that plane per grid cell.
//!
//! Every stage is a pure function of its inputs; the caller owns the
//! [`tabletop_core::TableSurface`] and ROI state and decides what to commit.

mod estimator;
mod height_grid;
mod params;
mod plane_fit;
mod roi;

pub use estimator::{SurfaceEstimate, SurfaceEstimator, SurfaceMethod};
pub use height_grid::{HeightGrid, HeightGridBuilder, HeightGridCell};
pub use params::{
    HeightGridParams, PlaneFitMethod, PlaneParams, RoiParams, SurfaceParams, ViewingMode,
};
pub use plane_fit::{PlaneFit, PlaneFitter};
pub use roi::RoiDetector;
