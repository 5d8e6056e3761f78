//! Placement and value policy for the single active collectible.

use crate::config::{GameConfig, ValuePolicy};
use arena_shared::{Collectible, PlayField};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Upper bound on placement retries when the field leaves little room.
const MAX_SPAWN_ATTEMPTS: u32 = 64;

/// Tier values and their cumulative weights out of 100.
const TIERS: [(u32, u32); 3] = [(1, 60), (2, 85), (3, 100)];

pub struct CollectibleSpawner {
    rng: StdRng,
    field: PlayField,
    coin_size: f32,
    variant_count: u8,
    value_policy: ValuePolicy,
    next_id: u64,
    active: Collectible,
}

impl CollectibleSpawner {
    /// Creates the spawner along with the session's first collectible.
    pub fn new(config: &GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    pub fn with_seed(config: &GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &GameConfig, mut rng: StdRng) -> Self {
        let variant = rng.gen_range(0..config.variant_count.max(1));
        let mut spawner = Self {
            rng,
            field: config.field,
            coin_size: config.coin_size,
            variant_count: config.variant_count.max(1),
            value_policy: config.value_policy,
            next_id: 1,
            active: Collectible {
                id: String::new(),
                x: 0.0,
                y: 0.0,
                value: 0,
                variant,
            },
        };
        let first = spawner.build(None, variant);
        debug!("Initial collectible {:?}", first);
        spawner.active = first;
        spawner
    }

    pub fn active(&self) -> &Collectible {
        &self.active
    }

    /// Replaces the active collectible with a fresh one.
    ///
    /// The new position is never equal to `previous` unless the field only
    /// has room for a single position.
    pub fn spawn(&mut self, previous: (f32, f32)) -> Collectible {
        let variant = (self.active.variant + 1) % self.variant_count;
        let next = self.build(Some(previous), variant);
        debug!(
            "Spawned collectible {} at ({}, {}) worth {}",
            next.id, next.x, next.y, next.value
        );
        self.active = next.clone();
        next
    }

    fn build(&mut self, previous: Option<(f32, f32)>, variant: u8) -> Collectible {
        let mut position = self.random_position();
        let mut attempts = 1;
        while Some(position) == previous {
            if attempts >= MAX_SPAWN_ATTEMPTS {
                warn!(
                    "No free collectible position after {} attempts, reusing ({}, {})",
                    attempts, position.0, position.1
                );
                break;
            }
            position = self.random_position();
            attempts += 1;
        }

        let id = format!("c{}", self.next_id);
        self.next_id += 1;

        Collectible {
            id,
            x: position.0,
            y: position.1,
            value: self.random_value(),
            variant,
        }
    }

    /// Whole-number center position with the sprite fully inside the field.
    fn random_position(&mut self) -> (f32, f32) {
        let half = self.coin_size / 2.0;
        let (x_lo, x_hi) = axis_range(half, self.field.width - half);
        let (y_lo, y_hi) = axis_range(self.field.top + half, self.field.height - half);

        let x = self.rng.gen_range(x_lo..=x_hi);
        let y = self.rng.gen_range(y_lo..=y_hi);
        (x as f32, y as f32)
    }

    fn random_value(&mut self) -> u32 {
        match self.value_policy {
            ValuePolicy::Tiered => {
                let roll = self.rng.gen_range(0..100);
                TIERS
                    .iter()
                    .find(|(_, cumulative)| roll < *cumulative)
                    .map_or(1, |(value, _)| *value)
            }
            ValuePolicy::Uniform { min, max } => self.rng.gen_range(min.max(1)..=max.max(1)),
        }
    }
}

/// Integer range inside `[min, max]`, collapsing to the midpoint when empty.
fn axis_range(min: f32, max: f32) -> (i32, i32) {
    let lo = min.ceil() as i32;
    let hi = max.floor() as i32;
    if lo <= hi {
        (lo, hi)
    } else {
        let mid = ((min + max) / 2.0).round() as i32;
        (mid, mid)
    }
}
