use serde::{Deserialize, Serialize};

pub const DEFAULT_FIELD_WIDTH: f32 = 640.0;
pub const DEFAULT_FIELD_HEIGHT: f32 = 480.0;
pub const DEFAULT_FIELD_TOP: f32 = 50.0;
pub const PLAYER_SIZE: f32 = 30.0;
pub const COIN_SIZE: f32 = 15.0;
pub const MAX_FRAME_LEN: usize = 64 * 1024;
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Join {
        id: Option<String>,
        x: f32,
        y: f32,
        sprite_state: Option<SpriteState>,
    },
    StateChange {
        x: f32,
        y: f32,
        sprite_state: Option<SpriteState>,
    },
    Collide {
        player_id: String,
        collectible_id: String,
    },
    Ping {
        timestamp: u64,
    },
    Disconnect,

    Connected {
        player_id: String,
    },
    CurrentPlayers {
        players: Vec<Player>,
    },
    Collectible {
        collectible: Collectible,
    },
    NewPlayer {
        player: Player,
    },
    OpponentStateChange {
        player: Player,
    },
    Scored {
        score: u32,
    },
    EndGame {
        result: GameResult,
    },
    PlayerLeave {
        id: String,
    },
    Pong {
        timestamp: u64,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// True for the packets a client is allowed to send.
    pub fn is_client_bound(&self) -> bool {
        matches!(
            self,
            Packet::Join { .. }
                | Packet::StateChange { .. }
                | Packet::Collide { .. }
                | Packet::Ping { .. }
                | Packet::Disconnect
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Packet::Join { .. } => "join",
            Packet::StateChange { .. } => "stateChange",
            Packet::Collide { .. } => "collide",
            Packet::Ping { .. } => "ping",
            Packet::Disconnect => "disconnect",
            Packet::Connected { .. } => "connected",
            Packet::CurrentPlayers { .. } => "currentPlayers",
            Packet::Collectible { .. } => "collectible",
            Packet::NewPlayer { .. } => "newPlayer",
            Packet::OpponentStateChange { .. } => "opponentStateChange",
            Packet::Scored { .. } => "scored",
            Packet::EndGame { .. } => "endGame",
            Packet::PlayerLeave { .. } => "playerLeave",
            Packet::Pong { .. } => "pong",
            Packet::Disconnected { .. } => "disconnected",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Up,
    Down,
    Left,
    Right,
}

/// Animation state a client attaches to its avatar. The server only relays it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SpriteState {
    pub facing: Facing,
    pub moving: bool,
    pub frame: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub score: u32,
    pub sprite_state: Option<SpriteState>,
}

impl Player {
    pub fn new(id: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            score: 0,
            sprite_state: None,
        }
    }

    /// Axis-aligned bounds around the player's center.
    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        let half = PLAYER_SIZE / 2.0;
        (self.x - half, self.y - half, self.x + half, self.y + half)
    }
}

/// The shared pickup. A new value is produced on every respawn; a handed-out
/// value is never changed afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Collectible {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub value: u32,
    pub variant: u8,
}

impl Collectible {
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        let half = COIN_SIZE / 2.0;
        (self.x - half, self.y - half, self.x + half, self.y + half)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Win,
    Lose,
}

/// Playable rectangle. The band above `top` is reserved for the HUD.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PlayField {
    pub width: f32,
    pub height: f32,
    pub top: f32,
}

impl Default for PlayField {
    fn default() -> Self {
        Self {
            width: DEFAULT_FIELD_WIDTH,
            height: DEFAULT_FIELD_HEIGHT,
            top: DEFAULT_FIELD_TOP,
        }
    }
}

impl PlayField {
    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(0.0, self.width), y.clamp(self.top, self.height))
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        (0.0..=self.width).contains(&x) && (self.top..=self.height).contains(&y)
    }
}

pub fn check_collision(player: &Player, collectible: &Collectible) -> bool {
    let (x1, y1, x2, y2) = player.get_bounds();
    let (x3, y3, x4, y4) = collectible.get_bounds();

    !(x2 <= x3 || x4 <= x1 || y2 <= y3 || y4 <= y1)
}

/// Serializes a packet into a length-prefixed frame.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, bincode::Error> {
    let body = bincode::serialize(packet)?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn decode_body(body: &[u8]) -> Result<Packet, bincode::Error> {
    bincode::deserialize(body)
}
