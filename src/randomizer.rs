//! Object randomizer - scatters movable props over the building's tables
//!
//! Each fresh recording gets a new layout: every model lands on a distinct
//! table, offset within 70% of the top, dropped from 2 units above so the
//! scene can settle it. A fixed seed reproduces the layout.

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

use crate::episode::{ObjectPlacement, PhysicsProps};

/// Table footprint: width, height to the top surface, depth
pub const TABLE_SIZE: Vec3 = Vec3::new(1.5, 1.3, 1.5);

/// Drop height above the table top
pub const DROP_HEIGHT: f32 = 2.0;

/// Fraction of the table top objects may land on
const USABLE_TOP: f32 = 0.7;

/// Table base positions, grouped by room
pub const TABLE_POSITIONS: [[f32; 3]; 15] = [
    // Blue room
    [-1.5, 0.0, 0.0],
    [1.5, 0.0, 1.5],
    [0.0, 0.0, -1.5],
    // Red room
    [-1.5, 0.0, 12.0],
    [0.5, 0.0, 13.5],
    [0.0, 0.0, 10.5],
    // Yellow room
    [16.5, 0.0, 13.5],
    [16.5, 0.0, 12.0],
    [15.0, 0.0, 10.5],
    // Orange room
    [8.5, 0.0, 3.5],
    [11.5, 0.0, 3.5],
    [11.5, 0.0, 0.25],
    // Green room
    [3.5, 0.0, -9.0],
    [5.5, 0.0, -10.25],
    [3.5, 0.0, -11.75],
];

/// A movable prop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovableModel {
    pub name: &'static str,
    pub scale: f32,
    /// Fixed yaw; None picks a random one
    pub yaw: Option<f32>,
}

pub const MOVABLE_MODELS: [MovableModel; 11] = [
    MovableModel { name: "apple", scale: 0.01, yaw: Some(std::f32::consts::FRAC_PI_4) },
    MovableModel { name: "alarmClock", scale: 0.1, yaw: None },
    MovableModel { name: "backpack", scale: 0.1, yaw: None },
    MovableModel { name: "handbag", scale: 3.0, yaw: None },
    MovableModel { name: "teddy", scale: 1.0, yaw: None },
    MovableModel { name: "phone", scale: 3.0, yaw: None },
    MovableModel { name: "pottedPlant", scale: 0.05, yaw: None },
    MovableModel { name: "umbrella", scale: 0.015, yaw: None },
    MovableModel { name: "book", scale: 1.0, yaw: None },
    MovableModel { name: "keys", scale: 1.0, yaw: None },
    MovableModel { name: "cup", scale: 1.0, yaw: None },
];

pub struct ObjectRandomizer {
    rng: StdRng,
    tables: Vec<Vec3>,
    models: Vec<MovableModel>,
}

impl ObjectRandomizer {
    /// Seeded randomizer over the default tables and models
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| rand::thread_rng().r#gen());
        debug!("Object randomizer seed {}", seed);
        Self {
            rng: StdRng::seed_from_u64(seed),
            tables: TABLE_POSITIONS.iter().map(|p| Vec3::from_array(*p)).collect(),
            models: MOVABLE_MODELS.to_vec(),
        }
    }

    pub fn with_layout(mut self, tables: Vec<Vec3>, models: Vec<MovableModel>) -> Self {
        self.tables = tables;
        self.models = models;
        self
    }

    /// One placement per model, each on a different table. Extra models
    /// beyond the table count are left out.
    pub fn generate(&mut self) -> Vec<ObjectPlacement> {
        let mut tables = self.tables.clone();
        let mut models = self.models.clone();
        tables.shuffle(&mut self.rng);
        models.shuffle(&mut self.rng);

        let reach_x = TABLE_SIZE.x * USABLE_TOP / 2.0;
        let reach_z = TABLE_SIZE.z * USABLE_TOP / 2.0;

        tables
            .into_iter()
            .zip(models)
            .map(|(table, model)| {
                let offset_x = self.rng.gen_range(-reach_x..=reach_x);
                let offset_z = self.rng.gen_range(-reach_z..=reach_z);
                let yaw = model.yaw.unwrap_or_else(|| self.rng.gen_range(0.0..TAU));
                let top = table.y + TABLE_SIZE.y;
                ObjectPlacement {
                    id: model.name.to_string(),
                    position: [table.x + offset_x, top + DROP_HEIGHT, table.z + offset_z],
                    rotation: [0.0, yaw, 0.0],
                    scale: model.scale,
                    physics: PhysicsProps::default(),
                }
            })
            .collect()
    }

    /// Pick the object the episode should seek
    pub fn choose_target(&mut self, placements: &[ObjectPlacement]) -> Option<String> {
        placements.choose(&mut self.rng).map(|p| p.id.clone())
    }
}
