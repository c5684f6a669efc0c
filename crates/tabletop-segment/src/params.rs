use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStrategy {
    #[default]
    BaseAndCap,
    SinglePass,
}

/// Segmentation and classification parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    pub strategy: SegmentStrategy,
    /// Lowest height above the table treated as an object.
    pub min_token_height_mm: u16,
    /// Upper height of a flat token; caps may reach twice this.
    pub max_token_height_mm: u16,
    /// Pixel count a blob needs before height relaxation.
    pub detection_threshold: usize,
    /// Base diameter at which the full `detection_threshold` applies.
    pub reference_diameter_px: f32,
    pub max_blob_size: usize,
    /// Minimum pixels in a base.
    pub min_base_size: usize,
    /// Largest height step between neighboring base pixels.
    pub base_height_step_mm: u16,
    /// Extra radius around a base searched for cap pixels.
    pub cap_margin_px: f32,
    /// Candidates closer than this in depth may merge.
    pub merge_depth_tolerance_mm: u16,
    /// Height above which an object may be a miniature.
    pub miniature_min_height_mm: u16,
    /// Height to base diameter ratio above which an object is a miniature.
    pub miniature_ratio: f32,
    /// Flat tokens narrower than this are small.
    pub small_max_diameter_px: f32,
    /// Flat tokens narrower than this (and not small) are medium.
    pub medium_max_diameter_px: f32,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            strategy: SegmentStrategy::default(),
            min_token_height_mm: 5,
            max_token_height_mm: 50,
            detection_threshold: 20,
            reference_diameter_px: 20.0,
            max_blob_size: 5000,
            min_base_size: 10,
            base_height_step_mm: 10,
            cap_margin_px: 5.0,
            merge_depth_tolerance_mm: 10,
            miniature_min_height_mm: 25,
            miniature_ratio: 0.5,
            small_max_diameter_px: 25.0,
            medium_max_diameter_px: 50.0,
        }
    }
}

impl SegmentParams {
    /// Pixel count required of a blob whose tallest point is `max_height_mm`.
    ///
    /// `threshold` is the base requirement before relaxation; taller objects
    /// need fewer pixels, never fewer than five.
    pub fn relaxed_threshold(threshold: usize, max_height_mm: u16) -> usize {
        threshold
            .saturating_sub(max_height_mm as usize / 5)
            .max(5)
    }

    /// Detection threshold scaled down for bases narrower than the reference.
    pub fn diameter_scaled_threshold(&self, diameter_px: f32) -> usize {
        let scale = if self.reference_diameter_px > 0.0 {
            (diameter_px / self.reference_diameter_px).clamp(0.0, 1.0)
        } else {
            1.0
        };
        (self.detection_threshold as f32 * scale).round() as usize
    }
}
