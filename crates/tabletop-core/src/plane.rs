use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Table plane in mixed pixel/depth space: `x`, `y` in pixels, `z` in mm.
///
/// The plane is the set of points `p` with `dot(p - origin, normal) = 0`.
/// `normal` is unit length with a non-negative `z` component.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneModel {
    pub normal: Vector3<f64>,
    pub origin: Point3<f64>,
}

impl PlaneModel {
    /// Smallest `|normal.z|` for which the plane can be solved for depth.
    pub const MIN_NORMAL_Z: f64 = 1e-6;

    /// Level table at constant depth.
    pub fn flat(table_depth_mm: u16) -> Self {
        Self {
            normal: Vector3::z(),
            origin: Point3::new(0.0, 0.0, table_depth_mm as f64),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.normal.x == 0.0 && self.normal.y == 0.0
    }

    /// Angle between the plane normal and the optical axis.
    pub fn tilt_deg(&self) -> f64 {
        self.normal.z.abs().clamp(0.0, 1.0).acos().to_degrees()
    }

    /// Table depth predicted at pixel `(x, y)`.
    #[inline]
    pub fn expected_depth(&self, x: f64, y: f64) -> f64 {
        let n = &self.normal;
        if n.z.abs() < Self::MIN_NORMAL_Z {
            return self.origin.z;
        }
        self.origin.z - ((x - self.origin.x) * n.x + (y - self.origin.y) * n.y) / n.z
    }

    /// Height above the table of a depth sample at pixel `(x, y)`, in mm.
    ///
    /// Positive values are closer to the sensor than the table.
    #[inline]
    pub fn height_above(&self, x: usize, y: usize, depth_mm: u16) -> f64 {
        self.expected_depth(x as f64, y as f64) - depth_mm as f64
    }
}
