use std::collections::VecDeque;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Kind of object resting on the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    SmallToken,
    MediumToken,
    LargeToken,
    Miniature,
    Dice,
    Custom,
    Unknown,
}

/// Display attributes of a [`TokenType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenStyle {
    pub color: [u8; 3],
    pub label: &'static str,
}

// Indexed by `TokenType as usize`.
const STYLES: [TokenStyle; 7] = [
    TokenStyle {
        color: [80, 200, 120],
        label: "Small Token",
    },
    TokenStyle {
        color: [70, 130, 220],
        label: "Medium Token",
    },
    TokenStyle {
        color: [150, 90, 210],
        label: "Large Token",
    },
    TokenStyle {
        color: [230, 90, 60],
        label: "Miniature",
    },
    TokenStyle {
        color: [240, 200, 40],
        label: "Dice",
    },
    TokenStyle {
        color: [240, 120, 200],
        label: "Custom",
    },
    TokenStyle {
        color: [160, 160, 160],
        label: "Unknown",
    },
];

impl TokenType {
    pub const ALL: [TokenType; 7] = [
        TokenType::SmallToken,
        TokenType::MediumToken,
        TokenType::LargeToken,
        TokenType::Miniature,
        TokenType::Dice,
        TokenType::Custom,
        TokenType::Unknown,
    ];

    #[inline]
    pub fn style(self) -> TokenStyle {
        STYLES[self as usize]
    }
}

/// Externally visible tracked object.
///
/// Geometry fields are recomputed every frame; `id`, `label`, `category`,
/// `color` and `position_history` are carried across frames by the tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Stable identity, [`Token::UNASSIGNED_ID`] until the tracker emits it.
    pub id: u64,
    pub kind: TokenType,
    /// Base center in pixels.
    pub position: Point2<f32>,
    /// Mean depth of the base footprint.
    pub depth_mm: u16,
    pub height_mm: u16,
    pub diameter_px: f32,
    pub diameter_m: f64,
    /// Sensor-space position in meters, set by the world mapper.
    pub world_position: Option<Point3<f64>>,
    pub stability_frames: u32,
    pub position_history: VecDeque<Point2<f32>>,
    /// Mean observed color under the footprint, if a color frame was given.
    pub color: Option<[u8; 3]>,
    pub category: Option<String>,
    pub label: Option<String>,
    /// Number of pixels in the full silhouette.
    pub point_count: usize,
}

impl Token {
    pub const UNASSIGNED_ID: u64 = 0;

    /// Fresh, untracked token for the current frame.
    pub fn observed(
        kind: TokenType,
        position: Point2<f32>,
        depth_mm: u16,
        height_mm: u16,
        diameter_px: f32,
        point_count: usize,
    ) -> Self {
        Self {
            id: Self::UNASSIGNED_ID,
            kind,
            position,
            depth_mm,
            height_mm,
            diameter_px,
            diameter_m: 0.0,
            world_position: None,
            stability_frames: 0,
            position_history: VecDeque::new(),
            color: None,
            category: None,
            label: None,
            point_count,
        }
    }

    pub fn display_color(&self) -> [u8; 3] {
        self.color.unwrap_or_else(|| self.kind.style().color)
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(self.kind.style().label)
    }

    #[inline]
    pub fn distance_px(&self, other: &Token) -> f32 {
        (self.position - other.position).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_distinct_style() {
        for (i, a) in TokenType::ALL.iter().enumerate() {
            for b in &TokenType::ALL[i + 1..] {
                assert_ne!(a.style().label, b.style().label);
                assert_ne!(a.style().color, b.style().color);
            }
        }
        assert_eq!(TokenType::Miniature.style().label, "Miniature");
    }

    #[test]
    fn display_prefers_annotations() {
        let mut t = Token::observed(
            TokenType::MediumToken,
            Point2::new(10.0, 20.0),
            990,
            4,
            30.0,
            700,
        );
        assert_eq!(t.display_label(), "Medium Token");
        assert_eq!(t.display_color(), TokenType::MediumToken.style().color);
        t.label = Some("Goblin".into());
        t.color = Some([1, 2, 3]);
        assert_eq!(t.display_label(), "Goblin");
        assert_eq!(t.display_color(), [1, 2, 3]);
    }

    #[test]
    fn serializes_kind_as_snake_case() {
        let json = serde_json::to_string(&TokenType::SmallToken).unwrap();
        assert_eq!(json, "\"small_token\"");
    }
}
