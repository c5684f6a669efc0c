use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tabletop_core::Token;

/// Sensor-layer projection of a depth pixel to meters.
pub trait PixelToWorld {
    /// `(x, y)` in depth pixels, `depth_mm` raw; returns `[X, Y, Z]` in meters.
    fn map(&self, x: f64, y: f64, depth_mm: u16) -> [f64; 3];
}

impl<F> PixelToWorld for F
where
    F: Fn(f64, f64, u16) -> [f64; 3],
{
    fn map(&self, x: f64, y: f64, depth_mm: u16) -> [f64; 3] {
        self(x, y, depth_mm)
    }
}

/// Pinhole unprojection for hosts without an SDK mapper.
///
/// Defaults are the Kinect v1 depth intrinsics at 640x480.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinholeMapping {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for PinholeMapping {
    fn default() -> Self {
        Self {
            fx: 594.21,
            fy: 591.04,
            cx: 339.5,
            cy: 242.7,
        }
    }
}

impl PinholeMapping {
    pub const BASE_WIDTH: f64 = 640.0;
    pub const BASE_HEIGHT: f64 = 480.0;

    /// Default intrinsics rescaled to a `width x height` depth stream.
    pub fn scaled(width: usize, height: usize) -> Self {
        let d = Self::default();
        let sx = width as f64 / Self::BASE_WIDTH;
        let sy = height as f64 / Self::BASE_HEIGHT;
        Self {
            fx: d.fx * sx,
            fy: d.fy * sy,
            cx: d.cx * sx,
            cy: d.cy * sy,
        }
    }
}

impl PixelToWorld for PinholeMapping {
    fn map(&self, x: f64, y: f64, depth_mm: u16) -> [f64; 3] {
        let z = depth_mm as f64 / 1000.0;
        [(x - self.cx) * z / self.fx, (y - self.cy) * z / self.fy, z]
    }
}

/// Fills world position and metric diameter of tokens.
#[derive(Clone, Debug, Default)]
pub struct WorldMapper<M> {
    mapping: M,
}

impl<M: PixelToWorld> WorldMapper<M> {
    pub fn new(mapping: M) -> Self {
        Self { mapping }
    }

    /// Map every token in place.
    ///
    /// The metric diameter is the world distance between the two ends of the
    /// horizontal pixel diameter at the token depth. Tokens whose mapping is
    /// not finite get no world position and a zero diameter.
    pub fn apply(&self, tokens: &mut [Token]) {
        for token in tokens {
            self.apply_one(token);
        }
    }

    pub fn apply_one(&self, token: &mut Token) {
        let (x, y) = (token.position.x as f64, token.position.y as f64);
        let center = Vector3::from(self.mapping.map(x, y, token.depth_mm));
        let half = token.diameter_px as f64 / 2.0;
        let left = Vector3::from(self.mapping.map(x - half, y, token.depth_mm));
        let right = Vector3::from(self.mapping.map(x + half, y, token.depth_mm));
        if !center.iter().all(|v| v.is_finite()) {
            token.world_position = None;
            token.diameter_m = 0.0;
            return;
        }
        token.world_position = Some(Point3::from(center));
        let diameter = (right - left).norm();
        token.diameter_m = if diameter.is_finite() { diameter } else { 0.0 };
    }
}
