// src/detection/yolo_seg.rs
//
// YOLO instance segmentation via ONNX Runtime.
//
// output0: [1, 4 + classes + 32, anchors]  box (cx, cy, w, h), class scores, mask coefficients
// output1: [1, 32, mh, mw]                  mask prototypes at 1/4 input resolution
//
// Instance mask = sigmoid(coeffs · prototypes), cut to the box, mapped back
// through the letterbox to frame pixels, then traced into a polygon.

use super::{DetectionModel, ModelConfig};
use crate::geometry::{trace_outer_contour, BinaryMask};
use crate::types::{Detection, Frame};
use anyhow::{bail, Context, Result};
use ndarray::{Array1, ArrayView2};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const MASK_COEFFS: usize = 32;
const LETTERBOX_FILL: u8 = 114;

pub struct YoloSegModel {
    session: Session,
    config: ModelConfig,
    name: String,
}

/// Letterbox geometry: frame = (input - pad) / scale
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

struct Candidate {
    class_id: usize,
    confidence: f32,
    bbox: [f32; 4],
    coeffs: Array1<f32>,
}

impl YoloSegModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        info!("Loading segmentation model: {}", config.path);

        let mut builder = Session::builder()?;
        if config.use_cuda {
            info!("Enabling CUDA execution provider");
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(0)
                .build()])?;
        }
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .commit_from_file(&config.path)
            .with_context(|| format!("load model {}", config.path))?;

        info!("✓ Segmentation model ready ({} classes)", config.class_names.len());
        Ok(Self {
            session,
            config: config.clone(),
            name: format!("yolo_seg:{}", config.path),
        })
    }

    fn preprocess(&self, frame: &Frame) -> (Vec<f32>, Letterbox) {
        let size = self.config.input_size;
        let (src_w, src_h) = (frame.width, frame.height);

        let scale = (size as f32 / src_w as f32).min(size as f32 / src_h as f32);
        let scaled_w = ((src_w as f32 * scale) as usize).clamp(1, size);
        let scaled_h = ((src_h as f32 * scale) as usize).clamp(1, size);
        let pad_x = (size - scaled_w) as f32 / 2.0;
        let pad_y = (size - scaled_h) as f32 / 2.0;

        let resized = resize_bilinear(&frame.data, src_w, src_h, scaled_w, scaled_h);

        let mut canvas = vec![LETTERBOX_FILL; size * size * 3];
        let (ox, oy) = (pad_x as usize, pad_y as usize);
        for y in 0..scaled_h {
            let src_row = &resized[y * scaled_w * 3..(y + 1) * scaled_w * 3];
            let dst_start = ((y + oy) * size + ox) * 3;
            canvas[dst_start..dst_start + scaled_w * 3].copy_from_slice(src_row);
        }

        // HWC u8 -> CHW f32 in [0, 1]
        let plane = size * size;
        let mut input = vec![0.0f32; 3 * plane];
        for (i, px) in canvas.chunks_exact(3).enumerate() {
            for c in 0..3 {
                input[c * plane + i] = px[c] as f32 / 255.0;
            }
        }

        (input, Letterbox { scale, pad_x, pad_y })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<(Vec<usize>, Vec<f32>, Vec<usize>, Vec<f32>)> {
        let size = self.config.input_size;
        let shape = [1, 3, size, size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;

        let (shape0, data0) = outputs[0].try_extract_tensor::<f32>()?;
        let (shape1, data1) = outputs[1].try_extract_tensor::<f32>()?;

        Ok((dims(shape0), data0.to_vec(), dims(shape1), data1.to_vec()))
    }

    fn decode(
        &self,
        boxes_shape: &[usize],
        boxes: &[f32],
        letterbox: Letterbox,
        frame_w: usize,
        frame_h: usize,
    ) -> Result<Vec<Candidate>> {
        let [_, channels, anchors] = boxes_shape else {
            bail!("unexpected box output shape {:?}", boxes_shape);
        };
        let (channels, anchors) = (*channels, *anchors);
        if channels <= 4 + MASK_COEFFS {
            bail!("box output has too few channels: {}", channels);
        }
        let num_classes = channels - 4 - MASK_COEFFS;
        let at = |c: usize, i: usize| boxes[c * anchors + i];

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let mut best_conf = 0.0f32;
            let mut best_class = 0;
            for c in 0..num_classes {
                let conf = at(4 + c, i);
                if conf > best_conf {
                    best_conf = conf;
                    best_class = c;
                }
            }
            if best_conf < self.config.confidence_threshold {
                continue;
            }

            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            let Letterbox { scale, pad_x, pad_y } = letterbox;
            let to_x = |v: f32| ((v - pad_x) / scale).clamp(0.0, frame_w as f32);
            let to_y = |v: f32| ((v - pad_y) / scale).clamp(0.0, frame_h as f32);
            let bbox = [
                to_x(cx - w / 2.0),
                to_y(cy - h / 2.0),
                to_x(cx + w / 2.0),
                to_y(cy + h / 2.0),
            ];

            let coeffs = (0..MASK_COEFFS)
                .map(|k| at(4 + num_classes + k, i))
                .collect::<Array1<f32>>();

            candidates.push(Candidate {
                class_id: best_class,
                confidence: best_conf,
                bbox,
                coeffs,
            });
        }

        Ok(nms_per_class(candidates, self.config.iou_threshold))
    }

    /// Frame-resolution instance mask limited to the detection box.
    fn instance_mask(
        &self,
        candidate: &Candidate,
        protos: &ArrayView2<f32>,
        proto_h: usize,
        proto_w: usize,
        letterbox: Letterbox,
        frame_w: usize,
        frame_h: usize,
    ) -> BinaryMask {
        let logits = candidate.coeffs.dot(protos);
        let size = self.config.input_size as f32;
        let threshold = self.config.mask_threshold;

        let mut mask = BinaryMask::zeros(frame_h, frame_w);
        if frame_w == 0 || frame_h == 0 {
            return mask;
        }
        let [x1, y1, x2, y2] = candidate.bbox;
        let (x1, y1) = (x1.floor() as usize, y1.floor() as usize);
        let x2 = (x2.ceil() as usize).min(frame_w - 1);
        let y2 = (y2.ceil() as usize).min(frame_h - 1);

        for y in y1..=y2 {
            let iy = y as f32 * letterbox.scale + letterbox.pad_y;
            let my = ((iy / size * proto_h as f32) as usize).min(proto_h - 1);
            for x in x1..=x2 {
                let ix = x as f32 * letterbox.scale + letterbox.pad_x;
                let mx = ((ix / size * proto_w as f32) as usize).min(proto_w - 1);
                let logit = logits[my * proto_w + mx];
                if sigmoid(logit) > threshold {
                    mask.set(x, y);
                }
            }
        }
        mask
    }

    fn class_name(&self, class_id: usize) -> String {
        self.config
            .class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl DetectionModel for YoloSegModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = self.preprocess(frame);
        let (boxes_shape, boxes, proto_shape, protos) = self.infer(input)?;

        let candidates = self.decode(&boxes_shape, &boxes, letterbox, frame.width, frame.height)?;

        let [_, k, proto_h, proto_w] = proto_shape.as_slice() else {
            bail!("unexpected prototype shape {:?}", proto_shape);
        };
        let (proto_h, proto_w) = (*proto_h, *proto_w);
        if *k != MASK_COEFFS || proto_h == 0 || proto_w == 0 {
            bail!("unexpected prototype shape {:?}", proto_shape);
        }
        let protos = ArrayView2::from_shape((MASK_COEFFS, proto_h * proto_w), &protos)
            .context("reshape mask prototypes")?;

        let detections: Vec<Detection> = candidates
            .iter()
            .map(|c| -> Result<Detection> {
                let mask = self.instance_mask(
                    c,
                    &protos,
                    proto_h,
                    proto_w,
                    letterbox,
                    frame.width,
                    frame.height,
                );
                Ok(Detection {
                    class_name: self.class_name(c.class_id),
                    confidence: c.confidence,
                    bbox: c.bbox,
                    contour: trace_outer_contour(&mask)?,
                })
            })
            .collect::<Result<_>>()?;

        debug!("Detected {} instance(s)", detections.len());
        Ok(detections)
    }
}

fn dims(shape: &[i64]) -> Vec<usize> {
    shape.iter().map(|&d| d.max(0) as usize).collect()
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        let sy = dy as f32 * y_ratio;
        let sy0 = (sy.floor() as usize).min(src_h - 1);
        let sy1 = (sy0 + 1).min(src_h - 1);
        let fy = sy - sy0 as f32;
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sx0 = (sx.floor() as usize).min(src_w - 1);
            let sx1 = (sx0 + 1).min(src_w - 1);
            let fx = sx - sx0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;
                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;
                dst[(dy * dst_w + dx) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    dst
}

/// Greedy NMS, only suppressing boxes of the same class.
fn nms_per_class(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<Candidate> = Vec::new();
    for cand in candidates {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.bbox, &cand.bbox) >= iou_threshold);
        if !suppressed {
            keep.push(cand);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);
    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
