//! Segmentation of objects standing on the table.
//!
//! Heights are measured against a [`tabletop_core::PlaneModel`], so the same
//! code serves overhead and angled views. Two strategies are available through
//! [`SegmentStrategy`]:
//!
//! - `BaseAndCap` (default): flood-fill low, smoothly varying *bases*, then
//!   collect taller *cap* pixels in a disk above each base. Tapered miniatures
//!   keep their full footprint this way.
//! - `SinglePass`: 8-connected components over every elevated pixel.
//!
//! Both finish with the same merge pass and classification.
//!
//! ```no_run
//! use tabletop_core::{DepthFrame, PlaneModel};
//! use tabletop_segment::{BlobSegmenter, SegmentWorkspace};
//!
//! let mut frame = DepthFrame::filled(320, 240, 1000).unwrap();
//! frame.fill_rect(150, 110, 5, 5, 950);
//! let view = frame.view();
//! let mut ws = SegmentWorkspace::new();
//! let segmenter = BlobSegmenter::default();
//! let candidates = segmenter.segment(&view, &view.full_roi(), &PlaneModel::flat(1000), &mut ws);
//! for c in &candidates {
//!     println!("{:?} at {:?}", segmenter.classify(c), c.base_center);
//! }
//! ```

mod candidate;
mod params;
mod segmenter;
mod workspace;

pub use candidate::{merge_candidates, ObjectCandidate};
pub use params::{SegmentParams, SegmentStrategy};
pub use segmenter::BlobSegmenter;
pub use workspace::SegmentWorkspace;
