use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    /// Largest pixel distance at which a new token inherits an identity.
    pub match_distance_px: f32,
    /// Maximum length of a token's position history.
    pub history_len: usize,
    /// Frames a track may go unmatched before it is retired.
    pub max_missed_frames: u32,
    /// Consecutive frames in one bucket before a new token is emitted.
    pub stability_threshold: u32,
    /// Side of the stability buckets in pixels.
    pub bucket_size_px: f32,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            match_distance_px: 30.0,
            history_len: 10,
            max_missed_frames: 5,
            stability_threshold: 3,
            bucket_size_px: 20.0,
        }
    }
}
