use serde::{Deserialize, Serialize};
use tabletop_core::RoiLimits;

/// Camera placement relative to the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewingMode {
    /// Sensor looks roughly straight down; the table is treated as level.
    #[default]
    Overhead,
    /// Sensor views the table at an angle; a tilted plane is fitted per frame.
    Angled,
}

/// Parameters of the table depth search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceParams {
    /// Nearest depth considered a table candidate.
    pub min_depth_mm: u16,
    /// Farthest depth considered a table candidate.
    pub max_depth_mm: u16,
    /// Sample every n-th row and column.
    pub sample_stride: usize,
    /// Depth quantization step.
    pub bin_size_mm: u16,
    /// Minimum samples in a depth bin (or central window) to qualify.
    pub min_bin_points: usize,
    /// Side of the spatial cells used to measure contiguity.
    pub spatial_bin_px: usize,
    /// Upper bound on samples used for the flatness estimate of one bin.
    pub flatness_samples: usize,
    /// Length of the smoothing history.
    pub history_len: usize,
    /// Use the central-mode estimator when the view is overhead.
    pub overhead_fast_path: bool,
    /// Side of the central window, as a fraction of the frame, for the
    /// central-mode estimator.
    pub central_window_fraction: f32,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            min_depth_mm: 500,
            max_depth_mm: 3000,
            sample_stride: 4,
            bin_size_mm: 20,
            min_bin_points: 100,
            spatial_bin_px: 16,
            flatness_samples: 256,
            history_len: 15,
            overhead_fast_path: false,
            central_window_fraction: 0.5,
        }
    }
}

/// Parameters of the table ROI detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiParams {
    pub sample_stride: usize,
    /// Depth tolerance for table pixels in the frame interior.
    pub center_tolerance_mm: u16,
    /// Stricter tolerance near the frame border.
    pub edge_tolerance_mm: u16,
    /// Width of the border band, as a fraction of each frame dimension.
    pub edge_band_fraction: f32,
    /// Tolerance multiplier applied in angled view.
    pub angled_tolerance_scale: f32,
    /// Fraction of extreme X and Y samples dropped on each side.
    pub trim_fraction: f32,
    /// Padding added around the trimmed bounding box.
    pub margin_px: usize,
    /// Minimum number of table samples to propose an ROI.
    pub min_points: usize,
    pub limits: RoiLimits,
}

impl Default for RoiParams {
    fn default() -> Self {
        Self {
            sample_stride: 4,
            center_tolerance_mm: 25,
            edge_tolerance_mm: 12,
            edge_band_fraction: 0.15,
            angled_tolerance_scale: 2.0,
            trim_fraction: 0.05,
            margin_px: 10,
            min_points: 50,
            limits: RoiLimits::default(),
        }
    }
}

/// How the plane normal is derived from the table samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneFitMethod {
    /// Eigenvector of the smallest covariance eigenvalue.
    #[default]
    Pca,
    /// Independent X and Y depth slopes; only valid for near-level tables.
    NearVertical,
}

/// Parameters of the tilted plane fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneParams {
    pub sample_stride: usize,
    /// Samples within this distance of the table depth (first pass) or of
    /// the previous fit (refinement passes) are used.
    pub tolerance_mm: f64,
    pub min_points: usize,
    /// Re-select inliers against the fitted plane this many times.
    pub refine_iterations: usize,
    pub method: PlaneFitMethod,
    /// Reject normals steeper than `acos(min_normal_z)`.
    pub min_normal_z: f64,
    /// Second-smallest eigenvalue below which samples are considered collinear.
    pub min_eigen_spread: f64,
}

impl Default for PlaneParams {
    fn default() -> Self {
        Self {
            sample_stride: 4,
            tolerance_mm: 40.0,
            min_points: 50,
            refine_iterations: 2,
            method: PlaneFitMethod::default(),
            min_normal_z: 0.5,
            min_eigen_spread: 1e-3,
        }
    }
}

/// Parameters of the per-cell height grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightGridParams {
    pub cell_size_px: usize,
    /// Cells with fewer contributing samples report zero height.
    pub min_samples: u32,
    /// Samples deeper than the expected surface by more than this are ignored.
    pub tolerance_mm: f64,
}

impl Default for HeightGridParams {
    fn default() -> Self {
        Self {
            cell_size_px: 10,
            min_samples: 3,
            tolerance_mm: 10.0,
        }
    }
}
