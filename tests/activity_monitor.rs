// tests/activity_monitor.rs
//
// End-to-end runs over synthetic scenes: frames + detections in, timeline out.

use excavator_monitor::config::Config;
use excavator_monitor::cycle::CycleConfig;
use excavator_monitor::detection::ReplayModel;
use excavator_monitor::pipeline::{run_stream, ActivityMonitor, StopReason};
use excavator_monitor::source::{DirectoryConfig, DirectorySource};
use excavator_monitor::types::{Detection, Frame, OperatingState, Point};
use std::sync::atomic::AtomicBool;

const W: usize = 80;
const H: usize = 80;

fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<Point> {
    vec![(x1, y1), (x2, y1), (x2, y2), (x1, y2)]
}

fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection {
        class_name: label.to_string(),
        confidence: 0.9,
        bbox: [x1, y1, x2, y2],
        contour: Some(rect(x1, y1, x2, y2)),
    }
}

/// Vertical sine bars drifting right by `shift` pixels.
fn textured(shift: usize, t: f64) -> Frame {
    let mut data = Vec::with_capacity(W * H * 3);
    for y in 0..H {
        for x in 0..W {
            let v = 128.0
                + 60.0 * ((x + W - shift) as f32 * std::f32::consts::TAU / 16.0).sin()
                    * (y as f32 * std::f32::consts::TAU / 20.0).cos();
            let v = v.round() as u8;
            data.extend_from_slice(&[v, v, v]);
        }
    }
    Frame {
        data,
        width: W,
        height: H,
        timestamp_s: t,
    }
}

fn uniform(t: f64) -> Frame {
    Frame {
        data: vec![120; W * H * 3],
        width: W,
        height: H,
        timestamp_s: t,
    }
}

fn slow_config() -> Config {
    Config {
        cycle: CycleConfig {
            dead_time_s: 3.0,
            min_load_duration_s: 2.0,
            frame_interval_s: 0.5,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_full_cycle_timeline() {
    let mut monitor = ActivityMonitor::new(&slow_config());

    let excavator = vec![
        det("cucharon", 0.0, 0.0, 79.0, 79.0),
        det("cabina", 0.0, 0.0, 79.0, 79.0),
    ];
    let mut loading = excavator.clone();
    loading.push(det("volquete", 50.0, 50.0, 79.0, 79.0));

    // 2 frames per second:
    //   0..4   moving, no truck          -> PREPARING
    //   4..16  moving, bucket over truck -> LOADING
    //   16..20 moving, truck gone        -> PREPARING
    //   20..30 still                     -> IDLE
    let mut states = Vec::new();
    for i in 0..30usize {
        let t = i as f64 * 0.5;
        let (frame, dets) = match i {
            0..=3 => (textured((2 * i) % 16, t), &excavator),
            4..=15 => (textured((2 * i) % 16, t), &loading),
            16..=19 => (textured((2 * i) % 16, t), &excavator),
            _ => (uniform(t), &excavator),
        };
        let outcome = monitor.process_frame(&frame, dets).unwrap();
        if (4..=15).contains(&i) {
            assert!(outcome.signals.contact, "frame {} should be in contact", i);
        }
        states.push(outcome.state);
    }

    assert_eq!(states[0], OperatingState::Preparing);
    assert_eq!(states[10], OperatingState::Loading);
    assert_eq!(states[18], OperatingState::Preparing);
    assert_eq!(states[29], OperatingState::Idle);

    let report = monitor.finalize();
    assert_eq!(report.frames_processed, 30);
    assert!((report.stream_duration_s - 14.5).abs() < 1e-9);

    let timeline = &report.timeline;
    let sequence: Vec<_> = timeline.intervals.iter().map(|iv| iv.state).collect();
    assert_eq!(
        sequence,
        vec![
            OperatingState::Preparing,
            OperatingState::Loading,
            OperatingState::Preparing,
            OperatingState::Idle,
        ]
    );

    let load = timeline.intervals[1];
    assert_eq!((load.start_s, load.end_s), (2.0, 8.0));

    // still period is backdated into IDLE, never before PREPARING began
    let idle = timeline.intervals[3];
    assert!(idle.start_s >= 8.0 && idle.start_s <= 10.0, "idle from {}", idle.start_s);
    assert_eq!(idle.end_s, 14.5);

    assert!((timeline.total_duration_s - 14.5).abs() < 1e-9);
    assert_eq!(timeline.duration_of(OperatingState::Loading), 6.0);
    let pct: f64 = timeline.summary.iter().map(|s| s.percentage).sum();
    assert!((pct - 100.0).abs() <= 0.2, "percentages sum to {}", pct);
}

#[test]
fn test_short_load_is_reported_as_preparing() {
    let mut monitor = ActivityMonitor::new(&slow_config());
    let excavator = vec![
        det("bucket", 0.0, 0.0, 79.0, 79.0),
        det("cabin", 0.0, 0.0, 79.0, 79.0),
    ];
    let mut touching = excavator.clone();
    touching.push(det("hopper", 40.0, 40.0, 79.0, 79.0));

    // contact for 1 s only, then the truck leaves; always moving
    for i in 0..12usize {
        let t = i as f64 * 0.5;
        let dets = if (2..4).contains(&i) { &touching } else { &excavator };
        monitor
            .process_frame(&textured((2 * i) % 16, t), dets)
            .unwrap();
    }

    let report = monitor.finalize();
    let raw: Vec<_> = report.raw_intervals.iter().map(|iv| iv.state).collect();
    assert!(raw.contains(&OperatingState::Loading));

    assert_eq!(report.timeline.intervals.len(), 1);
    assert_eq!(report.timeline.intervals[0].state, OperatingState::Preparing);
    assert_eq!(report.timeline.summary.len(), 1);
    assert_eq!(report.timeline.summary[0].percentage, 100.0);
}

#[test]
fn test_directory_replay_end_to_end() {
    let frames_dir = tempfile::tempdir().unwrap();
    for i in 0..12 {
        let img = image::RgbImage::from_pixel(40, 30, image::Rgb([70, 70, 70]));
        img.save(frames_dir.path().join(format!("frame_{:04}.png", i)))
            .unwrap();
    }
    // a stray non-image file is ignored
    std::fs::write(frames_dir.path().join("notes.txt"), "x").unwrap();

    let line = r#"{"class_name": "cucharon", "confidence": 0.9, "bbox": [5, 5, 20, 20], "contour": [[5, 5], [20, 5], [20, 20], [5, 20]]}, {"class_name": "tolva", "confidence": 0.9, "bbox": [10, 10, 30, 25], "contour": [[10, 10], [30, 10], [30, 25], [10, 25]]}"#;
    let jsonl: String = (0..12)
        .map(|i| format!("{{\"frame\": {}, \"detections\": [{}]}}\n", i, line))
        .collect();

    let mut source = DirectorySource::new(DirectoryConfig {
        path: frames_dir.path().to_string_lossy().into_owned(),
        fps: 2.0,
    });
    let mut model = ReplayModel::from_jsonl(&jsonl, 0.45).unwrap();
    let config = slow_config();
    let mut monitor = ActivityMonitor::new(&config);
    let stop = AtomicBool::new(false);

    let stats = run_stream(&mut source, &mut model, &mut monitor, &config.runtime, &stop).unwrap();
    assert_eq!(stats.stop_reason, StopReason::EndOfStream);
    assert_eq!(stats.frames_processed, 12);
    assert_eq!(source.len(), 12);

    // contact from the first frame, but nothing ever moves
    let report = monitor.finalize();
    assert_eq!(report.raw_intervals[0].state, OperatingState::Loading);
    assert_eq!(report.timeline.intervals.len(), 1);
    assert_eq!(report.timeline.intervals[0].state, OperatingState::Idle);
    assert_eq!(report.timeline.intervals[0].end_s, 5.5);

    let out = tempfile::tempdir().unwrap();
    let path = report.write_json(out.path(), "replay").unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["frames_processed"], 12);
    assert_eq!(json["timeline"]["summary"][0]["state"], "IDLE");
}
