use serde::{Deserialize, Serialize};

use crate::{FrameError, RegionOfInterest};

/// Depth value reported by the sensor for "no return".
pub const INVALID_DEPTH: u16 = 0;

fn checked_len(width: usize, height: usize) -> Result<usize, FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(FrameError::InvalidDimensions { width, height })
}

/// Borrowed depth frame, row-major millimeters.
#[derive(Clone, Copy, Debug)]
pub struct DepthFrameView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u16], // len = w*h
}

impl<'a> DepthFrameView<'a> {
    pub fn new(width: usize, height: usize, data: &'a [u16]) -> Result<Self, FrameError> {
        let expected = checked_len(width, height)?;
        if data.len() != expected {
            return Err(FrameError::InvalidBuffer {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Raw sample at `(x, y)`; out-of-frame reads return [`INVALID_DEPTH`].
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u16 {
        if x >= self.width || y >= self.height {
            return INVALID_DEPTH;
        }
        self.data[y * self.width + x]
    }

    /// Valid sample at `(x, y)`, `None` for invalid or out-of-frame pixels.
    #[inline]
    pub fn sample(&self, x: usize, y: usize) -> Option<u16> {
        match self.get(x, y) {
            INVALID_DEPTH => None,
            d => Some(d),
        }
    }

    pub fn full_roi(&self) -> RegionOfInterest {
        RegionOfInterest::new(0, 0, self.width, self.height)
    }
}

/// Owned depth frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u16>,
}

impl DepthFrame {
    pub fn new(width: usize, height: usize, data: Vec<u16>) -> Result<Self, FrameError> {
        DepthFrameView::new(width, height, &data)?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame with every sample set to `depth_mm`.
    pub fn filled(width: usize, height: usize, depth_mm: u16) -> Result<Self, FrameError> {
        let len = checked_len(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![depth_mm; len],
        })
    }

    pub fn view(&self) -> DepthFrameView<'_> {
        DepthFrameView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, depth_mm: u16) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = depth_mm;
        }
    }

    /// Fill an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: usize, y: usize, width: usize, height: usize, depth_mm: u16) {
        let x1 = (x + width).min(self.width);
        let y1 = (y + height).min(self.height);
        for yy in y.min(y1)..y1 {
            let row = yy * self.width;
            self.data[row + x.min(x1)..row + x1].fill(depth_mm);
        }
    }
}

/// Byte layout of one color pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
    Rgba,
    Bgra,
}

impl ChannelOrder {
    pub fn channels(self) -> usize {
        match self {
            ChannelOrder::Rgb | ChannelOrder::Bgr => 3,
            ChannelOrder::Rgba | ChannelOrder::Bgra => 4,
        }
    }

    /// Reorder one pixel into `[r, g, b]`.
    #[inline]
    pub fn to_rgb(self, px: &[u8]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb | ChannelOrder::Rgba => [px[0], px[1], px[2]],
            ChannelOrder::Bgr | ChannelOrder::Bgra => [px[2], px[1], px[0]],
        }
    }
}

/// Borrowed interleaved color frame co-registered with the depth frame.
///
/// When the color resolution differs from the depth resolution, depth pixel
/// coordinates are scaled proportionally before lookup.
#[derive(Clone, Copy, Debug)]
pub struct ColorFrameView<'a> {
    pub width: usize,
    pub height: usize,
    pub order: ChannelOrder,
    pub data: &'a [u8],
}

impl<'a> ColorFrameView<'a> {
    pub fn new(
        width: usize,
        height: usize,
        order: ChannelOrder,
        data: &'a [u8],
    ) -> Result<Self, FrameError> {
        let expected = checked_len(width, height)?
            .checked_mul(order.channels())
            .ok_or(FrameError::InvalidDimensions { width, height })?;
        if data.len() != expected {
            return Err(FrameError::InvalidBuffer {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    #[inline]
    pub fn rgb(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.order.channels();
        let off = (y * self.width + x) * c;
        Some(self.order.to_rgb(&self.data[off..off + c]))
    }

    /// Mean color over depth-space pixels of a frame `depth_width x depth_height`.
    pub fn mean_rgb<I>(&self, depth_width: usize, depth_height: usize, pixels: I) -> Option<[u8; 3]>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        if depth_width == 0 || depth_height == 0 {
            return None;
        }
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for (x, y) in pixels {
            let cx = x * self.width / depth_width;
            let cy = y * self.height / depth_height;
            if let Some([r, g, b]) = self.rgb(cx, cy) {
                sum[0] += r as u64;
                sum[1] += g as u64;
                sum[2] += b as u64;
                count += 1;
            }
        }
        if count == 0 {
            return None;
        }
        Some([
            (sum[0] / count) as u8,
            (sum[1] / count) as u8,
            (sum[2] / count) as u8,
        ])
    }
}
