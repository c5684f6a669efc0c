//! Depth frames on disk: raw little-endian `u16` dumps and 16-bit grayscale PNG.

use std::{fs, path::Path};

use tabletop_core::{DepthFrame, FrameError};

#[derive(thiserror::Error, Debug)]
pub enum FrameLoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("raw depth file has an odd byte length ({0})")]
    OddLength(usize),
    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[cfg(feature = "image")]
    #[error("depth image must be 16-bit grayscale, got {0:?}")]
    NotDepthImage(image::ColorType),
}

/// Read a headerless `width x height` buffer of little-endian millimeters.
pub fn load_raw_depth(
    path: impl AsRef<Path>,
    width: usize,
    height: usize,
) -> Result<DepthFrame, FrameLoadError> {
    let bytes = fs::read(path)?;
    if bytes.len() % 2 != 0 {
        return Err(FrameLoadError::OddLength(bytes.len()));
    }
    let data = bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    Ok(DepthFrame::new(width, height, data)?)
}

pub fn write_raw_depth(frame: &DepthFrame, path: impl AsRef<Path>) -> Result<(), FrameLoadError> {
    let bytes: Vec<u8> = frame.data.iter().flat_map(|d| d.to_le_bytes()).collect();
    fs::write(path, bytes)?;
    Ok(())
}

/// Read a 16-bit grayscale PNG whose values are millimeters.
#[cfg(feature = "image")]
pub fn load_png_depth(path: impl AsRef<Path>) -> Result<DepthFrame, FrameLoadError> {
    match image::open(path)? {
        image::DynamicImage::ImageLuma16(buf) => {
            let (w, h) = buf.dimensions();
            Ok(DepthFrame::new(w as usize, h as usize, buf.into_raw())?)
        }
        other => Err(FrameLoadError::NotDepthImage(other.color())),
    }
}

#[cfg(feature = "image")]
pub fn write_png_depth(frame: &DepthFrame, path: impl AsRef<Path>) -> Result<(), FrameLoadError> {
    let buf = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_raw(
        frame.width as u32,
        frame.height as u32,
        frame.data.clone(),
    )
    .ok_or(FrameError::InvalidBuffer {
        expected: frame.width * frame.height,
        got: frame.data.len(),
    })?;
    buf.save(path)?;
    Ok(())
}
