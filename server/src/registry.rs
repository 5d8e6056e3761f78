//! Maps inbound connection events onto the session core
//!
//! The registry owns every piece of session state: connection records, the
//! player directory, the collectible spawner and the outbound bus. It is
//! driven from a single task, so each event runs to completion before the
//! next one starts and no state is shared across threads.
//!
//! Event handling per packet:
//! - `Join` replies with the current players and collectible, then announces
//!   the newcomer to everyone else
//! - `StateChange` relays the merged record to everyone else
//! - `Collide` goes through the arbiter; a valid claim answers the claimant,
//!   relays the new score, and publishes the replacement collectible to all
//! - `Disconnect` (or transport close) removes the player and tells the rest
//!
//! Anything that does not apply is returned as a `Rejection` for the caller
//! to log. Session state is untouched in that case.

use crate::arbiter::{Claim, ScoreArbiter};
use crate::bus::{Audience, BroadcastBus};
use crate::config::GameConfig;
use crate::directory::{PartialState, PlayerDirectory, PlayerState};
use crate::error::Rejection;
use crate::spawner::CollectibleSpawner;
use arena_shared::{Collectible, GameResult, Packet, Player, SpriteState};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A live transport connection, joined or not
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub addr: SocketAddr,
    /// Last time any packet arrived from this connection
    pub last_seen: Instant,
}

impl Connection {
    pub fn new(id: String, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn refresh_last_seen(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

pub struct ConnectionRegistry {
    connections: HashMap<String, Connection>,
    next_connection_id: u64,
    max_clients: usize,
    directory: PlayerDirectory,
    spawner: CollectibleSpawner,
    arbiter: ScoreArbiter,
    bus: BroadcastBus,
}

impl ConnectionRegistry {
    pub fn new(config: &GameConfig, max_clients: usize) -> Self {
        Self::with_spawner(config, max_clients, CollectibleSpawner::new(config))
    }

    pub fn with_spawner(
        config: &GameConfig,
        max_clients: usize,
        spawner: CollectibleSpawner,
    ) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_clients,
            directory: PlayerDirectory::new(config.field),
            spawner,
            arbiter: ScoreArbiter::new(config.win_score),
            bus: BroadcastBus::new(),
        }
    }

    /// Accepts a new transport connection
    ///
    /// Returns the assigned id, or `None` when the server is full. A refused
    /// connection gets a `Disconnected` packet on `sender` before it is dropped.
    pub fn connect(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<Packet>,
    ) -> Option<String> {
        if self.connections.len() >= self.max_clients {
            warn!("Refusing connection from {}: server full", addr);
            let _ = sender.try_send(Packet::Disconnected {
                reason: "Server full".to_string(),
            });
            return None;
        }

        let id = format!("p{}", self.next_connection_id);
        self.next_connection_id += 1;

        info!("Connection {} opened from {}", id, addr);
        self.connections
            .insert(id.clone(), Connection::new(id.clone(), addr));
        self.bus.register(&id, sender);
        self.bus.publish(
            Audience::Reply(&id),
            Packet::Connected {
                player_id: id.clone(),
            },
        );

        Some(id)
    }

    /// Dispatches one packet received on connection `id`
    ///
    /// Connections whose outbound queue overflowed while handling the packet
    /// are disconnected before this returns.
    pub fn handle_packet(&mut self, id: &str, packet: Packet) -> Result<(), Rejection> {
        let result = self.dispatch(id, packet);
        self.evict_lagging();
        result
    }

    fn dispatch(&mut self, id: &str, packet: Packet) -> Result<(), Rejection> {
        match self.connections.get_mut(id) {
            Some(connection) => connection.refresh_last_seen(),
            None => return Err(Rejection::UnknownPlayer(id.to_string())),
        }

        match packet {
            Packet::Join {
                id: claimed_id,
                x,
                y,
                sprite_state,
            } => {
                if let Some(claimed_id) = claimed_id.filter(|claimed| claimed.as_str() != id) {
                    debug!(
                        "Connection {} asked to join as {}, using connection id",
                        id, claimed_id
                    );
                }
                self.join(id, finite_position(x, y)?, sprite_state);
                Ok(())
            }

            Packet::StateChange { x, y, sprite_state } => {
                let (x, y) = finite_position(x, y)?;
                self.state_change(
                    id,
                    PartialState {
                        x: Some(x),
                        y: Some(y),
                        sprite_state,
                    },
                )
                .map(|_| ())
            }

            Packet::Collide {
                player_id,
                collectible_id,
            } => {
                if player_id != id {
                    warn!(
                        "Connection {} tried to claim on behalf of {}",
                        id, player_id
                    );
                    return Err(Rejection::UnknownPlayer(player_id));
                }
                self.collide(id, &collectible_id).map(|_| ())
            }

            Packet::Ping { timestamp } => {
                self.bus
                    .publish(Audience::Reply(id), Packet::Pong { timestamp });
                Ok(())
            }

            Packet::Disconnect => {
                self.disconnect(id);
                Ok(())
            }

            other => Err(Rejection::MalformedPayload(format!(
                "client sent server packet {}",
                other.name()
            ))),
        }
    }

    /// Disconnects every connection that stopped draining its queue
    ///
    /// A leave announcement can overflow yet another queue, so this repeats
    /// until nothing is lagging.
    pub fn evict_lagging(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        loop {
            let lagging = self.bus.take_lagging();
            if lagging.is_empty() {
                return evicted;
            }
            for id in lagging {
                warn!("Disconnecting {}: not reading its packets", id);
                self.disconnect(&id);
                evicted.push(id);
            }
        }
    }

    /// Marks the connection as alive without handling anything
    pub fn touch(&mut self, id: &str) {
        if let Some(connection) = self.connections.get_mut(id) {
            connection.refresh_last_seen();
        }
    }

    /// Adds the player and sends it the session so far
    ///
    /// A repeated join from a joined connection changes nothing and sends
    /// nothing.
    pub fn join(&mut self, id: &str, (x, y): (f32, f32), sprite_state: Option<SpriteState>) {
        let opponents = self.directory.snapshot();
        let joined = self.directory.join(id, PlayerState { x, y, sprite_state });
        if !joined.is_new() {
            return;
        }

        self.bus.publish(
            Audience::Reply(id),
            Packet::CurrentPlayers { players: opponents },
        );
        self.bus.publish(
            Audience::Reply(id),
            Packet::Collectible {
                collectible: self.spawner.active().clone(),
            },
        );

        self.bus.publish(
            Audience::Others(id),
            Packet::NewPlayer {
                player: joined.player().clone(),
            },
        );
    }

    pub fn state_change(&mut self, id: &str, partial: PartialState) -> Result<Player, Rejection> {
        let player = self
            .directory
            .update_state(id, partial)
            .ok_or_else(|| Rejection::UnknownPlayer(id.to_string()))?;

        self.bus.publish(
            Audience::Others(id),
            Packet::OpponentStateChange {
                player: player.clone(),
            },
        );
        Ok(player)
    }

    pub fn collide(&mut self, id: &str, collectible_id: &str) -> Result<Claim, Rejection> {
        let claim = self.arbiter.claim(
            &mut self.directory,
            &mut self.spawner,
            id,
            collectible_id,
        )?;

        self.bus.publish(
            Audience::Reply(id),
            Packet::Scored {
                score: claim.player.score,
            },
        );
        self.bus.publish(
            Audience::Others(id),
            Packet::OpponentStateChange {
                player: claim.player.clone(),
            },
        );
        self.bus.publish(
            Audience::All,
            Packet::Collectible {
                collectible: claim.next.clone(),
            },
        );

        if let Some(victory) = &claim.victory {
            self.bus.send_to(
                &victory.winner,
                Packet::EndGame {
                    result: GameResult::Win,
                },
            );
            for loser in &victory.losers {
                self.bus.send_to(
                    loser,
                    Packet::EndGame {
                        result: GameResult::Lose,
                    },
                );
            }
        }

        Ok(claim)
    }

    /// Drops the connection and its player, if any
    ///
    /// Safe to call more than once; only the first call announces the leave.
    pub fn disconnect(&mut self, id: &str) -> Option<Player> {
        if let Some(connection) = self.connections.remove(id) {
            info!("Connection {} from {} closed", id, connection.addr);
        }
        self.bus.unregister(id);

        let player = self.directory.leave(id)?;
        self.bus.publish(
            Audience::Others(id),
            Packet::PlayerLeave { id: id.to_string() },
        );
        Some(player)
    }

    /// Disconnects every connection silent for longer than `timeout`
    pub fn sweep_timeouts(&mut self, timeout: Duration) -> Vec<String> {
        let timed_out: Vec<String> = self
            .connections
            .values()
            .filter(|connection| connection.is_timed_out(timeout))
            .map(|connection| connection.id.clone())
            .collect();

        for id in &timed_out {
            warn!("Connection {} timed out", id);
            self.disconnect(id);
        }

        timed_out
    }

    pub fn directory(&self) -> &PlayerDirectory {
        &self.directory
    }

    pub fn active_collectible(&self) -> &Collectible {
        self.spawner.active()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }
}

fn finite_position(x: f32, y: f32) -> Result<(f32, f32), Rejection> {
    if x.is_finite() && y.is_finite() {
        Ok((x, y))
    } else {
        Err(Rejection::MalformedPayload(format!(
            "non-finite position ({}, {})",
            x, y
        )))
    }
}
