use log::{debug, warn};
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};
use tabletop_core::{DepthFrameView, PlaneModel, RegionOfInterest, Stage, StageError};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{PlaneFitMethod, PlaneParams, ViewingMode};

/// Fitted table plane with its support.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneFit {
    pub plane: PlaneModel,
    pub inliers: usize,
    /// RMS depth residual of the inliers against `plane`.
    pub residual_mm: f64,
}

/// Fits a tilted table plane inside the ROI.
#[derive(Clone, Debug, Default)]
pub struct PlaneFitter {
    params: PlaneParams,
}

impl PlaneFitter {
    pub fn new(params: PlaneParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PlaneParams {
        &self.params
    }

    /// Plane to use for this frame.
    ///
    /// Overhead view always gets the flat plane at `table_depth_mm`. In angled
    /// view a failed fit also falls back to the flat plane and the failure is
    /// returned alongside.
    pub fn fit_or_flat(
        &self,
        frame: &DepthFrameView<'_>,
        roi: &RegionOfInterest,
        table_depth_mm: u16,
        mode: ViewingMode,
    ) -> (PlaneModel, Option<StageError>) {
        if mode == ViewingMode::Overhead {
            return (PlaneModel::flat(table_depth_mm), None);
        }
        match self.fit(frame, roi, table_depth_mm) {
            Ok(fit) => (fit.plane, None),
            Err(err) => {
                warn!("plane: {err}; using flat table");
                (PlaneModel::flat(table_depth_mm), Some(err))
            }
        }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(roi_w = roi.width, roi_h = roi.height))
    )]
    pub fn fit(
        &self,
        frame: &DepthFrameView<'_>,
        roi: &RegionOfInterest,
        table_depth_mm: u16,
    ) -> Result<PlaneFit, StageError> {
        let p = &self.params;
        let roi = roi
            .clamped(frame.width, frame.height)
            .ok_or(StageError::DegenerateGeometry {
                stage: Stage::Plane,
                reason: "roi outside frame",
            })?;
        let table = table_depth_mm as f64;

        let mut points = Vec::new();
        if table_depth_mm != 0 {
            self.collect(frame, &roi, |_, _| table, &mut points);
        }
        self.require(points.len())?;

        let (mut normal, mut centroid) = self.solve(&points)?;
        for _ in 0..p.refine_iterations {
            let current = PlaneModel {
                normal,
                origin: centroid,
            };
            let mut refined = Vec::with_capacity(points.len());
            self.collect(
                frame,
                &roi,
                |x, y| current.expected_depth(x, y),
                &mut refined,
            );
            if refined.len() < p.min_points {
                break;
            }
            match self.solve(&refined) {
                Ok((n, c)) => {
                    normal = n;
                    centroid = c;
                    points = refined;
                }
                Err(_) => break,
            }
        }

        let plane = PlaneModel {
            normal,
            origin: Point3::new(centroid.x, centroid.y, table),
        };
        let residual_mm = rms_residual(&plane, &points);
        debug!(
            "plane: normal=({:.4}, {:.4}, {:.4}) tilt={:.2}deg inliers={} rms={:.2}mm",
            normal.x,
            normal.y,
            normal.z,
            plane.tilt_deg(),
            points.len(),
            residual_mm
        );
        Ok(PlaneFit {
            plane,
            inliers: points.len(),
            residual_mm,
        })
    }

    fn require(&self, found: usize) -> Result<(), StageError> {
        let required = self.params.min_points.max(3);
        if found < required {
            return Err(StageError::InsufficientSamples {
                stage: Stage::Plane,
                found,
                required,
            });
        }
        Ok(())
    }

    /// Samples whose depth lies within tolerance of `expected(x, y)`.
    fn collect<F>(
        &self,
        frame: &DepthFrameView<'_>,
        roi: &RegionOfInterest,
        expected: F,
        out: &mut Vec<Vector3<f64>>,
    ) where
        F: Fn(f64, f64) -> f64,
    {
        let stride = self.params.sample_stride.max(1);
        for y in (roi.y..roi.bottom()).step_by(stride) {
            for x in (roi.x..roi.right()).step_by(stride) {
                let Some(d) = frame.sample(x, y) else {
                    continue;
                };
                let (xf, yf, d) = (x as f64, y as f64, d as f64);
                if (d - expected(xf, yf)).abs() <= self.params.tolerance_mm {
                    out.push(Vector3::new(xf, yf, d));
                }
            }
        }
    }

    fn solve(&self, points: &[Vector3<f64>]) -> Result<(Vector3<f64>, Point3<f64>), StageError> {
        let (centroid, cov) = covariance(points);
        let normal = match self.params.method {
            PlaneFitMethod::Pca => self.pca_normal(&cov)?,
            PlaneFitMethod::NearVertical => self.near_vertical_normal(&cov)?,
        };
        if normal.z < self.params.min_normal_z {
            return Err(StageError::DegenerateGeometry {
                stage: Stage::Plane,
                reason: "plane normal too steep",
            });
        }
        Ok((normal, Point3::from(centroid)))
    }

    fn pca_normal(&self, cov: &Matrix3<f64>) -> Result<Vector3<f64>, StageError> {
        let eig = SymmetricEigen::new(*cov);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
        if eig.eigenvalues[order[1]] < self.params.min_eigen_spread {
            return Err(StageError::DegenerateGeometry {
                stage: Stage::Plane,
                reason: "samples are collinear",
            });
        }
        let mut normal: Vector3<f64> = eig.eigenvectors.column(order[0]).into_owned();
        if normal.z < 0.0 {
            normal = -normal;
        }
        normal
            .try_normalize(f64::EPSILON)
            .ok_or(StageError::DegenerateGeometry {
                stage: Stage::Plane,
                reason: "zero normal",
            })
    }

    /// Depth slopes along x and y taken independently.
    fn near_vertical_normal(&self, cov: &Matrix3<f64>) -> Result<Vector3<f64>, StageError> {
        let (sxx, syy) = (cov[(0, 0)], cov[(1, 1)]);
        if sxx < self.params.min_eigen_spread || syy < self.params.min_eigen_spread {
            return Err(StageError::DegenerateGeometry {
                stage: Stage::Plane,
                reason: "samples span a single row or column",
            });
        }
        let a = cov[(0, 2)] / sxx;
        let b = cov[(1, 2)] / syy;
        Ok(Vector3::new(-a, -b, 1.0).normalize())
    }
}

/// Centroid and population covariance; two passes for stability.
fn covariance(points: &[Vector3<f64>]) -> (Vector3<f64>, Matrix3<f64>) {
    let n = points.len().max(1) as f64;
    let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;
    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p - centroid;
        cov += d * d.transpose();
    }
    (centroid, cov / n)
}

fn rms_residual(plane: &PlaneModel, points: &[Vector3<f64>]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .iter()
        .map(|p| {
            let r = p.z - plane.expected_depth(p.x, p.y);
            r * r
        })
        .sum();
    (sum / points.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tabletop_core::DepthFrame;

    /// depth = 1000 + 0.5 * (y - 80) over a 200x160 frame.
    fn tilted_frame() -> DepthFrame {
        let mut frame = DepthFrame::filled(200, 160, 0).unwrap();
        for y in 0..160 {
            for x in 0..200 {
                frame.set(x, y, (1000.0 + 0.5 * (y as f64 - 80.0)).round() as u16);
            }
        }
        frame
    }

    #[test]
    fn recovers_tilted_plane_with_pca() {
        let frame = tilted_frame();
        // 999 is the median of the sampled rows (y = 0, 4, .., 156).
        let fit = PlaneFitter::default()
            .fit(&frame.view(), &frame.view().full_roi(), 999)
            .unwrap();
        let expected = Vector3::new(0.0, -0.5, 1.0).normalize();
        assert_relative_eq!(fit.plane.normal, expected, epsilon = 1e-6);
        assert_relative_eq!(fit.plane.expected_depth(10.0, 120.0), 1020.0, epsilon = 1e-6);
        assert!(fit.residual_mm < 1e-6);
        assert_eq!(fit.inliers, 50 * 40);
    }

    #[test]
    fn near_vertical_matches_pca_on_gentle_tilt() {
        let frame = tilted_frame();
        let fitter = PlaneFitter::new(PlaneParams {
            method: PlaneFitMethod::NearVertical,
            ..PlaneParams::default()
        });
        let fit = fitter
            .fit(&frame.view(), &frame.view().full_roi(), 1000)
            .unwrap();
        let expected = Vector3::new(0.0, -0.5, 1.0).normalize();
        assert_relative_eq!(fit.plane.normal, expected, epsilon = 1e-6);
    }

    #[test]
    fn flat_table_gives_vertical_normal() {
        let frame = DepthFrame::filled(200, 160, 1000).unwrap();
        let fit = PlaneFitter::default()
            .fit(&frame.view(), &RegionOfInterest::new(20, 20, 160, 120), 1000)
            .unwrap();
        assert_relative_eq!(fit.plane.normal.z, 1.0, epsilon = 1e-9);
        assert_relative_eq!(fit.plane.expected_depth(0.0, 0.0), 1000.0, epsilon = 1e-6);
    }

    #[test]
    fn collinear_samples_are_degenerate() {
        let mut frame = DepthFrame::filled(200, 160, 0).unwrap();
        frame.fill_rect(0, 40, 200, 1, 1000);
        let fitter = PlaneFitter::new(PlaneParams {
            min_points: 20,
            ..PlaneParams::default()
        });
        let roi = frame.view().full_roi();
        let err = fitter.fit(&frame.view(), &roi, 1000).unwrap_err();
        assert!(matches!(err, StageError::DegenerateGeometry { .. }), "{err}");

        let (plane, err) = fitter.fit_or_flat(&frame.view(), &roi, 1000, ViewingMode::Angled);
        assert!(err.is_some());
        assert_eq!(plane, PlaneModel::flat(1000));
    }

    #[test]
    fn too_few_samples_fall_back_to_flat() {
        let frame = DepthFrame::filled(200, 160, 0).unwrap();
        let roi = frame.view().full_roi();
        let (plane, err) =
            PlaneFitter::default().fit_or_flat(&frame.view(), &roi, 1000, ViewingMode::Angled);
        assert_eq!(plane, PlaneModel::flat(1000));
        assert!(matches!(
            err,
            Some(StageError::InsufficientSamples {
                stage: Stage::Plane,
                ..
            })
        ));
    }

    #[test]
    fn overhead_view_skips_fit() {
        let frame = tilted_frame();
        let roi = frame.view().full_roi();
        let (plane, err) =
            PlaneFitter::default().fit_or_flat(&frame.view(), &roi, 1000, ViewingMode::Overhead);
        assert!(plane.is_flat());
        assert!(err.is_none());
    }
}
