//! Session-level properties checked directly against the registry
//!
//! These tests skip the network and feed events straight into a
//! `ConnectionRegistry`, reading what each connection would have been sent.

use arena_server::bus::outbound_channel;
use arena_server::config::{GameConfig, ValuePolicy};
use arena_server::directory::PartialState;
use arena_server::error::Rejection;
use arena_server::registry::ConnectionRegistry;
use arena_server::spawner::CollectibleSpawner;
use arena_shared::{Facing, GameResult, Packet, SpriteState, DEFAULT_FIELD_WIDTH};
use assert_approx_eq::assert_approx_eq;
use std::collections::HashMap;
use tokio::sync::mpsc;

struct Session {
    registry: ConnectionRegistry,
    inboxes: HashMap<String, mpsc::Receiver<Packet>>,
}

impl Session {
    fn new(value: u32, win_score: u32, seed: u64) -> Self {
        let config = GameConfig {
            value_policy: ValuePolicy::Uniform {
                min: value,
                max: value,
            },
            win_score,
            ..GameConfig::default()
        };
        let spawner = CollectibleSpawner::with_seed(&config, seed);
        Self {
            registry: ConnectionRegistry::with_spawner(&config, 64, spawner),
            inboxes: HashMap::new(),
        }
    }

    fn join(&mut self, x: f32, y: f32) -> String {
        let (tx, rx) = outbound_channel();
        let id = self
            .registry
            .connect("127.0.0.1:4000".parse().unwrap(), tx)
            .unwrap();
        self.inboxes.insert(id.clone(), rx);
        self.registry
            .handle_packet(
                &id,
                Packet::Join {
                    id: None,
                    x,
                    y,
                    sprite_state: None,
                },
            )
            .unwrap();
        id
    }

    fn collide(&mut self, id: &str, collectible_id: &str) -> Result<(), Rejection> {
        self.registry.handle_packet(
            id,
            Packet::Collide {
                player_id: id.to_string(),
                collectible_id: collectible_id.to_string(),
            },
        )
    }

    fn inbox(&mut self, id: &str) -> Vec<Packet> {
        let rx = self.inboxes.get_mut(id).unwrap();
        let mut packets = Vec::new();
        while let Ok(packet) = rx.try_recv() {
            packets.push(packet);
        }
        packets
    }

    fn clear(&mut self) {
        let ids: Vec<String> = self.inboxes.keys().cloned().collect();
        for id in ids {
            self.inbox(&id);
        }
    }
}

/// Player A scores a 3-point collectible while B watches
#[test]
fn scenario_single_claim() {
    let mut session = Session::new(3, 30, 1);
    let b = session.join(400.0, 300.0);
    let a = session.join(100.0, 50.0);
    session.clear();

    let coin = session.registry.active_collectible().clone();
    assert_eq!(coin.id, "c1");
    assert_eq!(coin.value, 3);

    session.collide(&a, "c1").unwrap();

    let next = session.registry.active_collectible().clone();
    assert_ne!(next.id, "c1");
    assert_ne!(next.position(), coin.position());
    assert_eq!(session.registry.directory().get(&a).unwrap().score, 3);

    assert_eq!(
        session.inbox(&a),
        vec![
            Packet::Scored { score: 3 },
            Packet::Collectible {
                collectible: next.clone()
            }
        ]
    );
    let to_b = session.inbox(&b);
    assert!(to_b.iter().any(|packet| matches!(
        packet,
        Packet::OpponentStateChange { player } if player.id == a && player.score == 3
    )));
    assert!(to_b.contains(&Packet::Collectible { collectible: next }));
}

/// Both players replay an id that was already claimed
#[test]
fn scenario_stale_claims() {
    let mut session = Session::new(3, 30, 2);
    let a = session.join(100.0, 100.0);
    let b = session.join(200.0, 200.0);
    session.collide(&a, "c1").unwrap();
    session.clear();
    let active = session.registry.active_collectible().clone();

    for id in [&a, &b] {
        assert!(matches!(
            session.collide(id, "c1"),
            Err(Rejection::StaleCollectible { .. })
        ));
    }

    assert_eq!(session.registry.directory().get(&a).unwrap().score, 3);
    assert_eq!(session.registry.directory().get(&b).unwrap().score, 0);
    assert_eq!(session.registry.active_collectible(), &active);
    assert!(session.inbox(&a).is_empty());
    assert!(session.inbox(&b).is_empty());
}

#[test]
fn many_claims_for_one_collectible_score_once() {
    let mut session = Session::new(2, 0, 3);
    let players: Vec<String> = (0..10).map(|i| session.join(50.0 * i as f32, 100.0)).collect();
    let coin = session.registry.active_collectible().id.clone();

    let accepted = players
        .iter()
        .filter(|id| session.collide(id, &coin).is_ok())
        .count();
    assert_eq!(accepted, 1);

    let total: u32 = session
        .registry
        .directory()
        .snapshot()
        .iter()
        .map(|player| player.score)
        .sum();
    assert_eq!(total, 2);
}

#[test]
fn respawn_never_repeats_previous_position() {
    let mut session = Session::new(1, 0, 4);
    let a = session.join(100.0, 100.0);

    for _ in 0..300 {
        let coin = session.registry.active_collectible().clone();
        session.collide(&a, &coin.id).unwrap();
        assert_ne!(
            session.registry.active_collectible().position(),
            coin.position()
        );
    }
}

#[test]
fn scores_are_monotonic() {
    let mut session = Session::new(2, 0, 5);
    let a = session.join(100.0, 100.0);
    let b = session.join(120.0, 100.0);
    let mut last = HashMap::new();

    for round in 0..100 {
        let coin = session.registry.active_collectible().id.clone();
        let (first, second) = if round % 3 == 0 { (&b, &a) } else { (&a, &b) };
        let _ = session.collide(first, &coin);
        let _ = session.collide(second, &coin);
        session
            .registry
            .state_change(
                first,
                PartialState {
                    x: Some(round as f32),
                    ..Default::default()
                },
            )
            .unwrap();

        for id in [&a, &b] {
            let score = session.registry.directory().get(id).unwrap().score;
            let previous = last.insert(id.clone(), score).unwrap_or(0);
            assert!(score >= previous);
        }
    }
}

#[test]
fn disconnect_removes_player_and_notifies_once() {
    let mut session = Session::new(1, 0, 6);
    let a = session.join(100.0, 100.0);
    let b = session.join(120.0, 100.0);
    let c = session.join(140.0, 100.0);
    session.clear();

    assert!(session.registry.disconnect(&b).is_some());
    assert!(session.registry.disconnect(&b).is_none());

    for id in [&a, &c] {
        assert_eq!(
            session.inbox(id),
            vec![Packet::PlayerLeave { id: b.clone() }]
        );
    }
    assert!(session
        .registry
        .directory()
        .snapshot()
        .iter()
        .all(|player| player.id != b));

    let coin = session.registry.active_collectible().id.clone();
    assert!(session.collide(&b, &coin).is_err());
    assert!(session.registry.directory().get(&b).is_none());
}

#[test]
fn win_notifies_every_joined_player() {
    let mut session = Session::new(5, 10, 7);
    let players: Vec<String> = (0..4).map(|i| session.join(30.0 * i as f32, 100.0)).collect();
    let winner = players[2].clone();

    // 5 -> 10 crosses the threshold on the second claim
    for _ in 0..2 {
        let coin = session.registry.active_collectible().id.clone();
        session.clear();
        session.collide(&winner, &coin).unwrap();
    }

    let mut wins = 0;
    let mut losses = 0;
    for id in &players {
        for packet in session.inbox(id) {
            match packet {
                Packet::EndGame {
                    result: GameResult::Win,
                } => {
                    assert_eq!(id, &winner);
                    wins += 1;
                }
                Packet::EndGame {
                    result: GameResult::Lose,
                } => {
                    assert_ne!(id, &winner);
                    losses += 1;
                }
                _ => {}
            }
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(losses, players.len() - 1);

    // Past the threshold already, so nothing more is announced
    let coin = session.registry.active_collectible().id.clone();
    session.clear();
    session.collide(&winner, &coin).unwrap();
    for id in &players {
        assert!(!session
            .inbox(id)
            .iter()
            .any(|packet| matches!(packet, Packet::EndGame { .. })));
    }
}

#[test]
fn movement_is_clamped_and_keeps_sprite() {
    let mut session = Session::new(1, 0, 8);
    let a = session.join(100.0, 100.0);
    let b = session.join(120.0, 100.0);
    session.clear();

    let sprite = SpriteState {
        facing: Facing::Down,
        moving: true,
        frame: 2,
    };
    session
        .registry
        .handle_packet(
            &a,
            Packet::StateChange {
                x: DEFAULT_FIELD_WIDTH + 55.5,
                y: 222.25,
                sprite_state: Some(sprite),
            },
        )
        .unwrap();

    match session.inbox(&b).as_slice() {
        [Packet::OpponentStateChange { player }] => {
            assert_approx_eq!(player.x, DEFAULT_FIELD_WIDTH);
            assert_approx_eq!(player.y, 222.25);
            assert_eq!(player.sprite_state, Some(sprite));
        }
        other => panic!("Unexpected packets {:?}", other),
    }
}
