//! Tabletop token and miniature detection from a depth sensor.
//!
//! This crate ties the `tabletop-*` stages into a per-frame pipeline:
//! - [`TabletopDetector`] owns a [`DetectionContext`] and runs surface
//!   estimation, ROI detection, plane fitting, the height grid, blob
//!   segmentation, tracking and world mapping for every frame
//! - [`DetectorConfig`] gathers every stage's parameters, loadable from JSON
//! - [`FrameReport`] is the serializable per-frame result
//! - [`frames`] reads depth frames from raw dumps or (feature `image`)
//!   16-bit PNG files
//!
//! ## Quickstart
//!
//! ```no_run
//! use tabletop::{DetectorConfig, FrameInput, TabletopDetector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let frame = tabletop::frames::load_raw_depth("frame.raw", 640, 480)?;
//! let mut detector = TabletopDetector::new(DetectorConfig::default());
//! let report = detector.process_frame(FrameInput::depth(frame.view()));
//! for token in &report.tokens {
//!     println!("{} {:?} at {:?}", token.id, token.kind, token.world_position);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `tabletop::core`: frames, ROI, plane model, table surface, tokens.
//! - `tabletop::surface`: table depth, ROI, plane fit, height grid.
//! - `tabletop::segment`: blob segmentation and classification.
//! - `tabletop::track`: token identities and pixel-to-world mapping.

pub use tabletop_core as core;
pub use tabletop_segment as segment;
pub use tabletop_surface as surface;
pub use tabletop_track as track;

pub use tabletop_core::{
    ChannelOrder, ColorFrameView, DepthFrame, DepthFrameView, LatestFrameSlot, RegionOfInterest,
    StageError, Token, TokenType,
};
pub use tabletop_surface::ViewingMode;
pub use tabletop_track::{PinholeMapping, PixelToWorld};

mod config;
mod context;
mod detector;
pub mod frames;
mod report;

pub use config::{ConfigIoError, DetectorConfig};
pub use context::DetectionContext;
pub use detector::{FrameInput, TabletopDetector};
pub use report::{FrameReport, FrameStatus, HeightGridSummary, StageNote, StageTimings};
