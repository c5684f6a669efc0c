//! Token identity across frames and conversion to world units.
//!
//! [`TokenTracker`] combines two mechanisms:
//! - a [`StabilityGate`] that holds back new objects until they have been
//!   seen in the same coarse bucket for several consecutive frames, and
//! - greedy nearest-neighbor matching that carries id, annotations and
//!   position history over once a token is emitted.
//!
//! [`WorldMapper`] then places each token in sensor space through any
//! [`PixelToWorld`] implementation supplied by the host.

mod gate;
mod params;
mod tracker;
mod world;

pub use gate::StabilityGate;
pub use params::TrackerParams;
pub use tracker::TokenTracker;
pub use world::{PinholeMapping, PixelToWorld, WorldMapper};
