//! Core types for tabletop depth-sensor detection.
//!
//! This crate holds the data model shared by every pipeline stage: borrowed
//! depth and color frame views, the table region of interest, the fitted table
//! plane, the smoothed table depth, and the externally visible [`Token`].
//! It performs no detection itself and has no knowledge of sensor drivers.
//!
//! Depth samples are unsigned millimeters with `0` marking an invalid return.
//! Pixel coordinates are `(x, y)` with `x` along a row.

mod error;
mod frame;
mod plane;
mod roi;
mod slot;
mod surface;
mod token;

pub use error::{FrameError, Stage, StageError};
pub use frame::{ChannelOrder, ColorFrameView, DepthFrame, DepthFrameView, INVALID_DEPTH};
pub use plane::PlaneModel;
pub use roi::{RegionOfInterest, RoiLimits, RoiRejection};
pub use slot::LatestFrameSlot;
pub use surface::TableSurface;
pub use token::{Token, TokenStyle, TokenType};
