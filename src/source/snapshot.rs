// src/source/snapshot.rs
//
// Periodic single-image GET, for cameras that only expose a still endpoint.

use super::{decode_rgb, FrameSource};
use crate::types::Frame;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SNAPSHOT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub url: String,
    /// Time between requests
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000/snapshot.jpg".to_string(),
            interval_ms: 200,
            timeout_ms: 5_000,
        }
    }
}

pub struct SnapshotSource {
    config: SnapshotConfig,
    agent: ureq::Agent,
    started_at: Option<Instant>,
    last_fetch: Option<Instant>,
}

impl SnapshotSource {
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        url::Url::parse(&config.url)
            .with_context(|| format!("parse snapshot url {}", config.url))?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Ok(Self {
            config,
            agent,
            started_at: None,
            last_fetch: None,
        })
    }

    fn fetch(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.config.url)
            .call()
            .with_context(|| format!("fetch snapshot from {}", self.config.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_SNAPSHOT_BYTES)
            .read_to_end(&mut bytes)
            .context("read snapshot body")?;
        if bytes.is_empty() {
            bail!("empty snapshot from {}", self.config.url);
        }
        Ok(bytes)
    }
}

impl FrameSource for SnapshotSource {
    fn name(&self) -> String {
        self.config.url.clone()
    }

    fn connect(&mut self) -> Result<()> {
        // one test request so a dead endpoint fails here, not mid-loop
        self.fetch()?;
        self.started_at.get_or_insert_with(Instant::now);
        info!("📷 Snapshot endpoint reachable: {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let interval = Duration::from_millis(self.config.interval_ms);
        if let Some(last) = self.last_fetch {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_fetch = Some(Instant::now());

        let bytes = self.fetch()?;
        let (data, width, height) = decode_rgb(&bytes).context("decode snapshot")?;
        let started = *self.started_at.get_or_insert_with(Instant::now);
        Ok(Some(Frame {
            data,
            width,
            height,
            timestamp_s: started.elapsed().as_secs_f64(),
        }))
    }

    fn nominal_fps(&self) -> Option<f64> {
        Some(1000.0 / self.config.interval_ms.max(1) as f64)
    }
}
