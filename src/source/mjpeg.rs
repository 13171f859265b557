// src/source/mjpeg.rs
//
// HTTP multipart/x-mixed-replace stream. JPEG frames are cut out of the
// byte stream by their SOI/EOI markers, ignoring the multipart headers.

use super::{decode_rgb, FrameSource};
use crate::types::Frame;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MjpegConfig {
    pub url: String,
    /// Rate the sender is expected to deliver
    pub fps: f64,
    pub timeout_ms: u64,
}

impl Default for MjpegConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000/video_feed".to_string(),
            fps: 30.0,
            timeout_ms: 10_000,
        }
    }
}

pub struct MjpegSource {
    config: MjpegConfig,
    agent: ureq::Agent,
    stream: Option<JpegStream<Box<dyn Read + Send + Sync>>>,
    /// Set on first successful connect; timestamps stay continuous across reconnects
    started_at: Option<Instant>,
    frames: u64,
}

impl MjpegSource {
    pub fn new(config: MjpegConfig) -> Result<Self> {
        url::Url::parse(&config.url).with_context(|| format!("parse mjpeg url {}", config.url))?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.timeout_ms))
            .timeout_read(Duration::from_millis(config.timeout_ms))
            .build();
        Ok(Self {
            config,
            agent,
            stream: None,
            started_at: None,
            frames: 0,
        })
    }
}

impl FrameSource for MjpegSource {
    fn name(&self) -> String {
        self.config.url.clone()
    }

    fn connect(&mut self) -> Result<()> {
        self.stream = None;
        let response = self
            .agent
            .get(&self.config.url)
            .call()
            .with_context(|| format!("connect to mjpeg stream {}", self.config.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if !content_type.contains("multipart") {
            debug!("Unexpected content type '{}', reading JPEG markers anyway", content_type);
        }
        self.stream = Some(JpegStream::new(response.into_reader()));
        self.started_at.get_or_insert_with(Instant::now);
        info!("📡 Connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("mjpeg source not connected"))?;
        let jpeg = stream.read_next_jpeg()?;
        let (data, width, height) = decode_rgb(&jpeg).context("decode mjpeg frame")?;
        let timestamp_s = self
            .started_at
            .map_or(0.0, |t| t.elapsed().as_secs_f64());
        self.frames += 1;
        Ok(Some(Frame {
            data,
            width,
            height,
            timestamp_s,
        }))
    }

    fn nominal_fps(&self) -> Option<f64> {
        Some(self.config.fps)
    }
}

pub(crate) struct JpegStream<R: Read> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: Read> JpegStream<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next complete JPEG in the stream. Errors when the stream ends.
    pub(crate) fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                // keep the tail in case a marker straddles the cut
                let drain_len = self.buffer.len() - 2;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Byte range `[start, end)` of the first SOI..EOI pair in `buffer`.
pub(crate) fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
