//! Vision client - object detections for the robot camera
//!
//! Every `interval_ms` of simulated time one camera image is PNG-encoded and
//! posted to the detection service (`POST /yolo_predict`, PNG body). The
//! reply `{"detectedObjects": [...]}` arrives asynchronously and is merged
//! into the next sampled frame, so detections may lag by a few frames.
//!
//! Without a renderer the camera image is an overhead raster of the scene:
//! the agent and every tracked object drawn as dots around the agent.

use bevy::prelude::*;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::time::Duration;

use crate::episode::Detection;
use crate::error::TransportError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Side length of the overhead raster
pub const CAMERA_SIZE: u32 = 64;

/// World units covered by the raster, centered on the agent
const CAMERA_SPAN: f32 = 16.0;

/// Decides when the next image goes out
#[derive(Debug, Clone, Default)]
pub struct VisionThrottle {
    pub interval_ms: u64,
    last_sent_ms: Option<u64>,
    in_flight: bool,
}

impl VisionThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            ..Default::default()
        }
    }

    /// True when a request may be sent now; marks it in flight
    pub fn try_begin(&mut self, now_ms: u64) -> bool {
        if self.in_flight {
            return false;
        }
        let due = match self.last_sent_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
            None => true,
        };
        if due {
            self.last_sent_ms = Some(now_ms);
            self.in_flight = true;
        }
        due
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Draw the overhead stand-in camera image
pub fn render_overhead(agent: Vec3, objects: &[(String, Vec3)]) -> RgbImage {
    let mut img = RgbImage::from_pixel(CAMERA_SIZE, CAMERA_SIZE, Rgb([24, 24, 24]));
    let scale = CAMERA_SIZE as f32 / CAMERA_SPAN;
    let half = CAMERA_SIZE as f32 / 2.0;

    let mut dot = |world: Vec3, color: Rgb<u8>| {
        let px = (world.x - agent.x) * scale + half;
        let py = (world.z - agent.z) * scale + half;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let x = px as i32 + dx;
                let y = py as i32 + dy;
                if x >= 0 && y >= 0 && (x as u32) < CAMERA_SIZE && (y as u32) < CAMERA_SIZE {
                    img.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    };

    for (_, position) in objects {
        if position.is_finite() {
            dot(*position, Rgb([220, 180, 40]));
        }
    }
    dot(agent, Rgb([40, 200, 255]));
    img
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, TransportError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Pull detections out of a service reply. Unknown shapes yield nothing.
pub fn parse_detections(body: &Value) -> Vec<Detection> {
    let Some(items) = body.get("detectedObjects") else {
        warn!("Vision reply without detectedObjects");
        return Vec::new();
    };
    match serde_json::from_value::<Vec<Detection>>(items.clone()) {
        Ok(detections) => detections,
        Err(e) => {
            warn!("Malformed detections: {}", e);
            Vec::new()
        }
    }
}

pub struct VisionClient {
    url: String,
    agent: ureq::Agent,
}

impl VisionClient {
    pub fn new(url: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Self {
            url: url.to_string(),
            agent,
        }
    }

    /// Blocking round trip; run it off-tick
    pub fn detect(&self, png: &[u8]) -> Result<Vec<Detection>, TransportError> {
        let mut response = self
            .agent
            .post(&self.url)
            .header("Content-Type", "image/png")
            .send(png)?;
        let body: Value = response.body_mut().read_json()?;
        Ok(parse_detections(&body))
    }
}
