// src/analysis/frame_analyzer.rs
//
// Per-frame orchestration: detections + current/previous grayscale frame
// → SignalBundle for the cycle state machine.
//
//   bucket contour ─→ mask ──────────────┐
//   hopper contour ─→ mask → dilate ─────┴→ overlap → contact
//   bucket/arm/cabin boxes ─→ dense flow ─→ motion booleans
//   bucket contour ─→ lowest point ─→ tip velocity

use super::parts::{PartKeywords, SelectedParts};
use crate::error::AnalysisError;
use crate::geometry::{bounding_box_of, build_mask, dilate_elliptical, lowest_point_y, overlap_ratio};
use crate::motion::{flow_magnitude, FlowParams, GrayFrame};
use crate::types::{Detection, SignalBundle};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Minimum confidence for a bucket detection
    pub conf_bucket: f32,
    /// Minimum confidence for a hopper / dump-truck detection
    pub conf_hopper: f32,
    /// Overlap ratio at or above which bucket and hopper are in contact
    pub min_overlap: f32,
    /// Size in pixels of the elliptical element used to dilate the hopper mask
    pub dilation_px: usize,
    /// Median flow above which the bucket or arm counts as moving
    pub min_motion_arm_bucket: f32,
    /// Median flow above which the cabin counts as moving
    pub min_motion_cabin: f32,
    pub flow: FlowParams,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            conf_bucket: 0.35,
            conf_hopper: 0.35,
            min_overlap: 0.02,
            dilation_px: 20,
            min_motion_arm_bucket: 0.7,
            min_motion_cabin: 2.0,
            flow: FlowParams::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("conf_bucket", self.conf_bucket),
            ("conf_hopper", self.conf_hopper),
            ("min_overlap", self.min_overlap),
        ] {
            if !(0.0..=1.0).contains(&v) {
                bail!("analysis.{} must be in [0, 1], got {}", name, v);
            }
        }
        for (name, v) in [
            ("min_motion_arm_bucket", self.min_motion_arm_bucket),
            ("min_motion_cabin", self.min_motion_cabin),
        ] {
            if !v.is_finite() || v < 0.0 {
                bail!("analysis.{} must be finite and >= 0, got {}", name, v);
            }
        }
        self.flow.validate()
    }
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct FrameInput<'a> {
    pub detections: &'a [Detection],
    pub gray: &'a GrayFrame,
    /// Previous frame of the stream, if any
    pub prev_gray: Option<&'a GrayFrame>,
}

pub struct FrameAnalyzer {
    config: AnalyzerConfig,
    keywords: PartKeywords,
    prev_tip_y: Option<f32>,
}

impl FrameAnalyzer {
    pub fn new(config: AnalyzerConfig, keywords: PartKeywords) -> Self {
        Self {
            config,
            keywords,
            prev_tip_y: None,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Forget the previous bucket-tip position (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.prev_tip_y = None;
    }

    pub fn analyze(&mut self, input: FrameInput<'_>) -> Result<SignalBundle, AnalysisError> {
        let gray = input.gray;
        if let Some(prev) = input.prev_gray {
            if !prev.same_size(gray) {
                return Err(AnalysisError::FrameSizeMismatch {
                    prev_width: prev.width,
                    prev_height: prev.height,
                    width: gray.width,
                    height: gray.height,
                });
            }
        }
        let (h, w) = (gray.height, gray.width);
        let cfg = &self.config;

        let parts = SelectedParts::select(
            input.detections,
            &self.keywords,
            cfg.conf_bucket,
            cfg.conf_hopper,
        );
        let bucket_contour = parts.bucket_contour();
        let hopper_contour = parts.hopper_contour();

        // contact
        let bucket_mask = build_mask(bucket_contour, h, w)?;
        let mut hopper_mask = build_mask(hopper_contour, h, w)?;
        if !hopper_mask.is_empty() {
            hopper_mask = dilate_elliptical(&hopper_mask, cfg.dilation_px)?;
        }
        let overlap = overlap_ratio(&bucket_mask, &hopper_mask)?;

        // motion
        let bucket_box = bounding_box_of(bucket_contour, h, w).map(|b| b.as_coords());
        let cabin_box = parts.cabin.map(|d| d.bbox);
        let (mut motion_bucket, mut motion_cabin, mut motion_arm) = (0.0, 0.0, 0.0);
        if let (Some(prev), Some(bucket_box), Some(cabin_box)) =
            (input.prev_gray, bucket_box.as_ref(), cabin_box.as_ref())
        {
            motion_bucket = flow_magnitude(Some(prev), Some(gray), Some(bucket_box), &cfg.flow);
            motion_cabin = flow_magnitude(Some(prev), Some(gray), Some(cabin_box), &cfg.flow);
            motion_arm = parts.arm.map_or(0.0, |arm| {
                flow_magnitude(Some(prev), Some(gray), Some(&arm.bbox), &cfg.flow)
            });
        }

        let motion_arm_or_bucket = motion_bucket.max(motion_arm) > cfg.min_motion_arm_bucket;
        let motion_cabin_moving = motion_cabin > cfg.min_motion_cabin;

        // bucket tip
        let tip_y = lowest_point_y(bucket_contour);
        let tip_velocity = match (tip_y, self.prev_tip_y) {
            (Some(y), Some(prev)) => y - prev,
            _ => 0.0,
        };
        self.prev_tip_y = tip_y;

        let signals = SignalBundle {
            contact: overlap >= cfg.min_overlap,
            hopper_present: hopper_contour.is_some(),
            motion_arm,
            motion_bucket,
            motion_cabin,
            motion_arm_or_bucket,
            motion_cabin_moving,
            motion_combined: motion_arm_or_bucket || motion_cabin_moving,
            motion_peak: motion_arm.max(motion_bucket).max(motion_cabin),
            overlap_ratio: overlap,
            bucket_tip_y: tip_y,
            bucket_tip_velocity_y: tip_velocity,
        };

        debug!(
            "overlap={:.3} contact={} motion bucket={:.2} arm={:.2} cabin={:.2}",
            signals.overlap_ratio,
            signals.contact,
            signals.motion_bucket,
            signals.motion_arm,
            signals.motion_cabin
        );

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<Point> {
        vec![(x1, y1), (x2, y1), (x2, y2), (x1, y2)]
    }

    fn det(label: &str, contour: Vec<Point>) -> Detection {
        let xs = contour.iter().map(|p| p.0);
        let ys = contour.iter().map(|p| p.1);
        let bbox = [
            xs.clone().fold(f32::MAX, f32::min),
            ys.clone().fold(f32::MAX, f32::min),
            xs.fold(f32::MIN, f32::max),
            ys.fold(f32::MIN, f32::max),
        ];
        Detection {
            class_name: label.to_string(),
            confidence: 0.9,
            bbox,
            contour: Some(contour),
        }
    }

    fn analyzer() -> FrameAnalyzer {
        FrameAnalyzer::new(AnalyzerConfig::default(), PartKeywords::default())
    }

    fn textured(width: usize, height: usize, shift: usize) -> GrayFrame {
        let data = (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| {
                    let v = 128.0
                        + 60.0 * ((x + width - shift) as f32 * std::f32::consts::TAU / 16.0).sin()
                            * (y as f32 * std::f32::consts::TAU / 20.0).cos();
                    v.round() as u8
                })
            })
            .collect();
        GrayFrame::new(data, width, height)
    }

    #[test]
    fn test_contact_when_bucket_over_hopper() {
        let gray = GrayFrame::new(vec![0; 100 * 80], 100, 80);
        let dets = vec![
            det("cucharon", rect(20.0, 20.0, 40.0, 40.0)),
            det("tolva", rect(30.0, 30.0, 70.0, 70.0)),
        ];
        let s = analyzer()
            .analyze(FrameInput {
                detections: &dets,
                gray: &gray,
                prev_gray: None,
            })
            .unwrap();
        assert!(s.contact);
        assert!(s.hopper_present);
        assert!(s.overlap_ratio > 0.25);
        assert_eq!(s.bucket_tip_y, Some(40.0));
    }

    #[test]
    fn test_dilation_bridges_small_gap() {
        let gray = GrayFrame::new(vec![0; 100 * 80], 100, 80);
        // 5 px gap between bucket and hopper
        let dets = vec![
            det("bucket", rect(10.0, 10.0, 30.0, 30.0)),
            det("hopper", rect(35.0, 10.0, 70.0, 30.0)),
        ];
        let mut a = analyzer();
        let s = a
            .analyze(FrameInput {
                detections: &dets,
                gray: &gray,
                prev_gray: None,
            })
            .unwrap();
        assert!(s.contact, "overlap {}", s.overlap_ratio);

        let far = vec![
            det("bucket", rect(10.0, 10.0, 30.0, 30.0)),
            det("hopper", rect(60.0, 10.0, 90.0, 30.0)),
        ];
        let s = a
            .analyze(FrameInput {
                detections: &far,
                gray: &gray,
                prev_gray: None,
            })
            .unwrap();
        assert!(!s.contact);
        assert_eq!(s.overlap_ratio, 0.0);
    }

    #[test]
    fn test_no_previous_frame_means_no_motion() {
        let gray = textured(64, 64, 0);
        let dets = vec![
            det("bucket", rect(0.0, 0.0, 63.0, 63.0)),
            det("cabin", rect(0.0, 0.0, 63.0, 63.0)),
        ];
        let s = analyzer()
            .analyze(FrameInput {
                detections: &dets,
                gray: &gray,
                prev_gray: None,
            })
            .unwrap();
        assert_eq!(s.motion_bucket, 0.0);
        assert_eq!(s.motion_cabin, 0.0);
        assert_eq!(s.motion_arm, 0.0);
        assert!(!s.motion_combined);
        assert!(!s.hopper_present);
        assert!(!s.contact);
    }

    #[test]
    fn test_motion_requires_bucket_and_cabin() {
        let prev = textured(64, 64, 0);
        let curr = textured(64, 64, 2);
        let only_bucket = vec![det("bucket", rect(0.0, 0.0, 63.0, 63.0))];
        let s = analyzer()
            .analyze(FrameInput {
                detections: &only_bucket,
                gray: &curr,
                prev_gray: Some(&prev),
            })
            .unwrap();
        assert_eq!(s.motion_bucket, 0.0);
        assert!(!s.motion_combined);
    }

    #[test]
    fn test_moving_bucket_sets_motion() {
        let prev = textured(80, 80, 0);
        let curr = textured(80, 80, 2);
        let dets = vec![
            det("bucket", rect(0.0, 0.0, 79.0, 79.0)),
            det("cabin", rect(0.0, 0.0, 79.0, 79.0)),
        ];
        let s = analyzer()
            .analyze(FrameInput {
                detections: &dets,
                gray: &curr,
                prev_gray: Some(&prev),
            })
            .unwrap();
        assert!(s.motion_bucket > 0.7, "bucket motion {}", s.motion_bucket);
        assert!(s.motion_arm_or_bucket);
        assert!(s.motion_combined);
        assert_eq!(s.motion_arm, 0.0);
        assert_eq!(s.motion_peak, s.motion_bucket.max(s.motion_cabin));
    }

    #[test]
    fn test_tip_velocity_tracks_previous_frame() {
        let gray = GrayFrame::new(vec![0; 50 * 50], 50, 50);
        let mut a = analyzer();
        let first = vec![det("bucket", rect(5.0, 5.0, 15.0, 20.0))];
        let second = vec![det("bucket", rect(5.0, 8.0, 15.0, 26.0))];

        let s1 = a
            .analyze(FrameInput {
                detections: &first,
                gray: &gray,
                prev_gray: None,
            })
            .unwrap();
        assert_eq!(s1.bucket_tip_velocity_y, 0.0);

        let s2 = a
            .analyze(FrameInput {
                detections: &second,
                gray: &gray,
                prev_gray: Some(&gray),
            })
            .unwrap();
        assert_eq!(s2.bucket_tip_y, Some(26.0));
        assert_eq!(s2.bucket_tip_velocity_y, 6.0);

        a.reset();
        let s3 = a
            .analyze(FrameInput {
                detections: &second,
                gray: &gray,
                prev_gray: None,
            })
            .unwrap();
        assert_eq!(s3.bucket_tip_velocity_y, 0.0);
    }

    #[test]
    fn test_frame_size_mismatch_is_an_error() {
        let prev = GrayFrame::new(vec![0; 20 * 10], 20, 10);
        let curr = GrayFrame::new(vec![0; 30 * 10], 30, 10);
        let err = analyzer()
            .analyze(FrameInput {
                detections: &[],
                gray: &curr,
                prev_gray: Some(&prev),
            })
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FrameSizeMismatch { .. }));
    }

    #[test]
    fn test_config_validation() {
        assert!(AnalyzerConfig::default().validate().is_ok());
        let bad = AnalyzerConfig {
            conf_hopper: -0.1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = AnalyzerConfig {
            min_motion_cabin: f32::NAN,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
