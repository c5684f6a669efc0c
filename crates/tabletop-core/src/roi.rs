use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle presumed to contain the table surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl RegionOfInterest {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return f32::INFINITY;
        }
        self.width as f32 / self.height as f32
    }

    /// Intersect with a `frame_w x frame_h` frame; `None` if nothing is left.
    pub fn clamped(&self, frame_w: usize, frame_h: usize) -> Option<Self> {
        let x1 = self.right().min(frame_w);
        let y1 = self.bottom().min(frame_h);
        if self.x >= x1 || self.y >= y1 {
            return None;
        }
        Some(Self::new(self.x, self.y, x1 - self.x, y1 - self.y))
    }

    /// Check size and aspect constraints against a `frame_w x frame_h` frame.
    pub fn validate(
        &self,
        limits: &RoiLimits,
        frame_w: usize,
        frame_h: usize,
    ) -> Result<(), RoiRejection> {
        if self.right() > frame_w || self.bottom() > frame_h {
            return Err(RoiRejection::OutOfFrame {
                roi: *self,
                frame_w,
                frame_h,
            });
        }
        if self.width < limits.min_size || self.height < limits.min_size {
            return Err(RoiRejection::TooSmall {
                width: self.width,
                height: self.height,
                min: limits.min_size,
            });
        }
        let max_w = limits.max_frame_fraction * frame_w as f32;
        let max_h = limits.max_frame_fraction * frame_h as f32;
        if self.width as f32 > max_w || self.height as f32 > max_h {
            return Err(RoiRejection::TooLarge {
                width: self.width,
                height: self.height,
                max_width: max_w,
                max_height: max_h,
            });
        }
        let aspect = self.aspect();
        if aspect < limits.min_aspect || aspect > limits.max_aspect {
            return Err(RoiRejection::Aspect {
                aspect,
                min: limits.min_aspect,
                max: limits.max_aspect,
            });
        }
        Ok(())
    }
}

/// Acceptance limits for a proposed region of interest.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiLimits {
    /// Minimum width and height in pixels.
    pub min_size: usize,
    /// Maximum width/height as a fraction of the frame width/height.
    pub max_frame_fraction: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl Default for RoiLimits {
    fn default() -> Self {
        Self {
            min_size: 50,
            max_frame_fraction: 0.9,
            min_aspect: 0.5,
            max_aspect: 2.0,
        }
    }
}

/// Reason a proposed ROI was not committed.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum RoiRejection {
    #[error("roi {roi:?} exceeds frame {frame_w}x{frame_h}")]
    OutOfFrame {
        roi: RegionOfInterest,
        frame_w: usize,
        frame_h: usize,
    },
    #[error("roi {width}x{height} smaller than {min}px")]
    TooSmall {
        width: usize,
        height: usize,
        min: usize,
    },
    #[error("roi {width}x{height} larger than {max_width:.0}x{max_height:.0}")]
    TooLarge {
        width: usize,
        height: usize,
        max_width: f32,
        max_height: f32,
    },
    #[error("roi aspect {aspect:.2} outside [{min}, {max}]")]
    Aspect { aspect: f32, min: f32, max: f32 },
}
