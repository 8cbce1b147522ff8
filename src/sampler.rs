//! State sampler - assembles one Frame per tick from live simulation state
//!
//! Sampling never fails. Missing or non-finite readings fall back to the last
//! good value seen, then to defaults.

use bevy::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::ACTIONS;
use crate::episode::{Detection, Frame, ObjectInView, StopReason};

/// Raw readings for one tick
#[derive(Debug, Clone, Default)]
pub struct SampleInputs {
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub active_actions: BTreeSet<String>,
    pub collision: bool,
    pub objects_in_view: Vec<ObjectInView>,
    pub target_object: String,
    pub time_remaining: f32,
}

#[derive(Debug, Clone)]
pub struct StateSampler {
    next_frame_number: u64,
    key_durations: BTreeMap<String, u32>,
    last_position: Vec3,
    last_rotation: Quat,
    last_time_remaining: f32,
    detections: Vec<Detection>,
}

impl Default for StateSampler {
    fn default() -> Self {
        Self {
            next_frame_number: 0,
            key_durations: initial_durations(),
            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
            last_time_remaining: 0.0,
            detections: Vec::new(),
        }
    }
}

fn initial_durations() -> BTreeMap<String, u32> {
    ACTIONS.iter().map(|a| (a.to_string(), 0)).collect()
}

impl StateSampler {
    /// Frame number the next sample will carry
    pub fn frame_number(&self) -> u64 {
        self.next_frame_number
    }

    /// Restart numbering and held-key counters (session start or scene reset)
    pub fn reset(&mut self) {
        self.next_frame_number = 0;
        self.key_durations = initial_durations();
        self.detections.clear();
    }

    /// Replace the detections carried by subsequent frames
    pub fn merge_detections(&mut self, detections: Vec<Detection>) {
        self.detections = detections
            .into_iter()
            .filter(|d| d.confidence.is_finite())
            .collect();
    }

    pub fn sample(&mut self, inputs: &SampleInputs) -> Frame {
        let position = match inputs.position {
            Some(p) if p.is_finite() => {
                self.last_position = p;
                p
            }
            _ => {
                debug!("Sampler: no usable position, reusing last known");
                self.last_position
            }
        };

        let rotation = match inputs.rotation {
            Some(q) if q.is_finite() && q.length_squared() > f32::EPSILON => {
                let q = q.normalize();
                self.last_rotation = q;
                q
            }
            _ => {
                debug!("Sampler: no usable rotation, reusing last known");
                self.last_rotation
            }
        };

        let time_remaining = if inputs.time_remaining.is_finite() {
            self.last_time_remaining = inputs.time_remaining;
            inputs.time_remaining
        } else {
            self.last_time_remaining
        };

        self.update_durations(&inputs.active_actions);

        let frame = Frame {
            position: position.to_array(),
            rotation: rotation.to_array(),
            active_actions: inputs.active_actions.clone(),
            key_durations: self.key_durations.clone(),
            collision: inputs.collision,
            detected_objects: self.detections.clone(),
            objects_in_view: inputs
                .objects_in_view
                .iter()
                .filter(|o| o.distance.is_finite() && o.centrality.is_finite())
                .cloned()
                .collect(),
            target_object: inputs.target_object.clone(),
            time_remaining,
            frame_number: self.next_frame_number,
        };
        self.next_frame_number += 1;
        frame
    }

    /// Sample the frame that ends a recording, forcing the stop evidence into it
    pub fn sample_final(
        &mut self,
        inputs: &SampleInputs,
        reason: StopReason,
        trigger_symbol: &str,
    ) -> Frame {
        let mut inputs = inputs.clone();
        match reason {
            StopReason::Collision => inputs.collision = true,
            StopReason::TriggerAction => {
                inputs.active_actions.insert(trigger_symbol.to_string());
            }
            StopReason::TimeExpired => inputs.time_remaining = inputs.time_remaining.min(0.0),
            StopReason::Manual => {}
        }
        self.sample(&inputs)
    }

    fn update_durations(&mut self, active: &BTreeSet<String>) {
        for symbol in active {
            self.key_durations.entry(symbol.clone()).or_insert(0);
        }
        for (symbol, held) in self.key_durations.iter_mut() {
            if active.contains(symbol) {
                *held = held.saturating_add(1);
            } else {
                *held = 0;
            }
        }
    }
}
