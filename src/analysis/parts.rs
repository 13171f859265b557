// src/analysis/parts.rs
//
// Picks at most one detection per excavator part out of a frame's
// detections. Class labels are matched by case-insensitive substring
// against configurable keyword lists.

use crate::types::{Detection, Point};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartKeywords {
    pub bucket: Vec<String>,
    pub hopper: Vec<String>,
    pub arm: Vec<String>,
    pub cabin: Vec<String>,
}

impl Default for PartKeywords {
    fn default() -> Self {
        let words = |w: &[&str]| w.iter().map(|s| s.to_string()).collect();
        Self {
            bucket: words(&["cucharon", "bucket"]),
            hopper: words(&["tolva", "volquete", "hopper"]),
            arm: words(&["brazo", "arm"]),
            cabin: words(&["cabina", "cabin"]),
        }
    }
}

impl PartKeywords {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (part, list) in [
            ("bucket", &self.bucket),
            ("hopper", &self.hopper),
            ("arm", &self.arm),
            ("cabin", &self.cabin),
        ] {
            if list.iter().all(|k| k.trim().is_empty()) {
                anyhow::bail!("parts.{} needs at least one non-empty keyword", part);
            }
        }
        Ok(())
    }

    fn matches(list: &[String], detection: &Detection) -> bool {
        list.iter()
            .filter(|k| !k.is_empty())
            .any(|k| detection.label_contains(k))
    }
}

/// Detections chosen for the current frame, at most one per part.
#[derive(Debug, Default, Clone)]
pub struct SelectedParts<'a> {
    pub bucket: Option<&'a Detection>,
    pub hopper: Option<&'a Detection>,
    pub arm: Option<&'a Detection>,
    pub cabin: Option<&'a Detection>,
}

impl<'a> SelectedParts<'a> {
    /// First detection per part, each part matched on its own, so one
    /// detection can fill several parts. Bucket and hopper must reach their
    /// own confidence floor; arm and cabin are taken regardless of confidence.
    pub fn select(
        detections: &'a [Detection],
        keywords: &PartKeywords,
        conf_bucket: f32,
        conf_hopper: f32,
    ) -> Self {
        let mut parts = SelectedParts::default();
        for det in detections {
            if parts.bucket.is_none()
                && det.confidence >= conf_bucket
                && PartKeywords::matches(&keywords.bucket, det)
            {
                parts.bucket = Some(det);
            }
            if parts.hopper.is_none()
                && det.confidence >= conf_hopper
                && PartKeywords::matches(&keywords.hopper, det)
            {
                parts.hopper = Some(det);
            }
            if parts.arm.is_none() && PartKeywords::matches(&keywords.arm, det) {
                parts.arm = Some(det);
            }
            if parts.cabin.is_none() && PartKeywords::matches(&keywords.cabin, det) {
                parts.cabin = Some(det);
            }
        }
        parts
    }

    pub fn bucket_contour(&self) -> Option<&'a [Point]> {
        contour_of(self.bucket)
    }

    pub fn hopper_contour(&self) -> Option<&'a [Point]> {
        contour_of(self.hopper)
    }
}

/// Empty contours count as absent.
fn contour_of(det: Option<&Detection>) -> Option<&[Point]> {
    det?.contour.as_deref().filter(|c| !c.is_empty())
}
