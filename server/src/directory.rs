//! Player records for every joined connection
//!
//! The directory is the only owner of `Player` values on the server. It is
//! created once per process and handed to the registry, which drives it:
//! - players are inserted on join and removed on disconnect
//! - movement and animation fields are merged from client updates
//! - scores only change through `add_score`, which the arbiter calls
//!
//! Records are kept in join order so snapshots sent to new clients are stable.

use arena_shared::{PlayField, Player, SpriteState};
use indexmap::IndexMap;
use log::{debug, info, warn};

/// Initial position and sprite a client reports when joining
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    pub sprite_state: Option<SpriteState>,
}

/// Fields a movement update may carry. Missing fields keep their old value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialState {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub sprite_state: Option<SpriteState>,
}

/// Outcome of a join request
#[derive(Debug, Clone, PartialEq)]
pub enum Joined {
    /// A new record was created
    Inserted(Player),
    /// The id was already joined; the existing record is returned unchanged
    AlreadyPresent(Player),
}

impl Joined {
    pub fn player(&self) -> &Player {
        match self {
            Joined::Inserted(player) | Joined::AlreadyPresent(player) => player,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Joined::Inserted(_))
    }
}

pub struct PlayerDirectory {
    /// Joined players keyed by connection id, in join order
    players: IndexMap<String, Player>,
    /// Positions are clamped into this rectangle
    field: PlayField,
}

impl PlayerDirectory {
    pub fn new(field: PlayField) -> Self {
        Self {
            players: IndexMap::new(),
            field,
        }
    }

    /// Inserts a player for `id` with a zero score
    ///
    /// A second join from the same connection is tolerated: it is logged and
    /// the existing record is returned untouched.
    pub fn join(&mut self, id: &str, initial: PlayerState) -> Joined {
        if let Some(existing) = self.players.get(id) {
            warn!("Player {} sent a duplicate join, ignoring", id);
            return Joined::AlreadyPresent(existing.clone());
        }

        if !self.field.contains(initial.x, initial.y) {
            debug!(
                "Join position ({}, {}) for {} is off the field, clamping",
                initial.x, initial.y, id
            );
        }
        let (x, y) = self.field.clamp(initial.x, initial.y);
        let mut player = Player::new(id, x, y);
        player.sprite_state = initial.sprite_state;

        info!("Player {} joined at ({}, {})", id, x, y);
        self.players.insert(id.to_string(), player.clone());
        Joined::Inserted(player)
    }

    /// Merges movement and animation fields into an existing record
    ///
    /// Returns `None` when the player is unknown, typically because the
    /// connection is already gone.
    pub fn update_state(&mut self, id: &str, partial: PartialState) -> Option<Player> {
        let field = self.field;
        let player = self.players.get_mut(id)?;

        let (x, y) = field.clamp(
            partial.x.unwrap_or(player.x),
            partial.y.unwrap_or(player.y),
        );
        player.x = x;
        player.y = y;
        if partial.sprite_state.is_some() {
            player.sprite_state = partial.sprite_state;
        }

        Some(player.clone())
    }

    /// Removes the player, keeping the remaining join order intact
    pub fn leave(&mut self, id: &str) -> Option<Player> {
        let player = self.players.shift_remove(id)?;
        info!("Player {} left with score {}", id, player.score);
        Some(player)
    }

    /// All joined players in join order
    pub fn snapshot(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    /// Adds `value` to the player's score and returns the new score
    ///
    /// The addition saturates so a score can never go down.
    pub fn add_score(&mut self, id: &str, value: u32) -> Option<u32> {
        let player = self.players.get_mut(id)?;
        player.score = player.score.saturating_add(value);
        debug!("Player {} score is now {}", id, player.score);
        Some(player.score)
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    /// Ids of every joined player except `id`, in join order
    pub fn ids_except(&self, id: &str) -> Vec<String> {
        self.players
            .keys()
            .filter(|other| other.as_str() != id)
            .cloned()
            .collect()
    }

    /// Returns the number of joined players
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Returns true if nobody has joined
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
