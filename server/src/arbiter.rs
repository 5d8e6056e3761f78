//! Exactly-once resolution of collectible claims.
//!
//! Every client runs its own collision check and races a claim to the
//! server. The arbiter is the single point that decides which claim counts:
//! a claim is valid only while its collectible id is the active one, and a
//! valid claim replaces the active collectible in the same call, so any
//! later claim for that id is stale.

use crate::directory::PlayerDirectory;
use crate::error::Rejection;
use crate::spawner::CollectibleSpawner;
use arena_shared::{Collectible, Player};
use log::{debug, info};

/// A claim that counted
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    /// The claiming player after the score change
    pub player: Player,
    /// The collectible that was consumed
    pub claimed: Collectible,
    /// Its replacement, already active
    pub next: Collectible,
    pub victory: Option<Victory>,
}

/// Set when a claim pushes a player across the win threshold
#[derive(Debug, Clone, PartialEq)]
pub struct Victory {
    pub winner: String,
    pub losers: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreArbiter {
    win_score: u32,
}

impl ScoreArbiter {
    /// `win_score` of zero turns win detection off.
    pub fn new(win_score: u32) -> Self {
        Self { win_score }
    }

    pub fn claim(
        &self,
        directory: &mut PlayerDirectory,
        spawner: &mut CollectibleSpawner,
        player_id: &str,
        collectible_id: &str,
    ) -> Result<Claim, Rejection> {
        let active = spawner.active();
        if active.id != collectible_id {
            debug!(
                "Rejected claim from {} for {}, active is {}",
                player_id, collectible_id, active.id
            );
            return Err(Rejection::StaleCollectible {
                claimed: collectible_id.to_string(),
                active: active.id.clone(),
            });
        }

        let before = directory
            .get(player_id)
            .map(|player| player.score)
            .ok_or_else(|| Rejection::UnknownPlayer(player_id.to_string()))?;

        let claimed = active.clone();
        let after = directory
            .add_score(player_id, claimed.value)
            .ok_or_else(|| Rejection::UnknownPlayer(player_id.to_string()))?;
        let next = spawner.spawn(claimed.position());

        info!(
            "Player {} claimed {} worth {} (score {} -> {})",
            player_id, claimed.id, claimed.value, before, after
        );

        let victory = if self.crosses_threshold(before, after) {
            let losers = directory.ids_except(player_id);
            info!(
                "Player {} reached {} and wins against {} others",
                player_id,
                self.win_score,
                losers.len()
            );
            Some(Victory {
                winner: player_id.to_string(),
                losers,
            })
        } else {
            None
        };

        let player = directory
            .get(player_id)
            .cloned()
            .ok_or_else(|| Rejection::UnknownPlayer(player_id.to_string()))?;

        Ok(Claim {
            player,
            claimed,
            next,
            victory,
        })
    }

    fn crosses_threshold(&self, before: u32, after: u32) -> bool {
        self.win_score > 0 && before < self.win_score && after >= self.win_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GameConfig, ValuePolicy};
    use crate::directory::PlayerState;
    use arena_shared::PlayField;

    fn setup(value: u32) -> (PlayerDirectory, CollectibleSpawner) {
        let config = GameConfig {
            value_policy: ValuePolicy::Uniform {
                min: value,
                max: value,
            },
            ..GameConfig::default()
        };
        let mut directory = PlayerDirectory::new(PlayField::default());
        for id in ["p1", "p2", "p3"] {
            directory.join(
                id,
                PlayerState {
                    x: 100.0,
                    y: 100.0,
                    sprite_state: None,
                },
            );
        }
        (directory, CollectibleSpawner::with_seed(&config, 11))
    }

    #[test]
    fn test_successful_claim() {
        let (mut directory, mut spawner) = setup(3);
        let arbiter = ScoreArbiter::new(30);
        let first = spawner.active().clone();

        let claim = arbiter
            .claim(&mut directory, &mut spawner, "p1", &first.id)
            .unwrap();

        assert_eq!(claim.player.score, 3);
        assert_eq!(claim.claimed, first);
        assert_ne!(claim.next.id, first.id);
        assert_ne!(claim.next.position(), first.position());
        assert_eq!(spawner.active(), &claim.next);
        assert!(claim.victory.is_none());
        assert_eq!(directory.get("p1").unwrap().score, 3);
    }

    #[test]
    fn test_second_claim_for_same_id_is_stale() {
        let (mut directory, mut spawner) = setup(3);
        let arbiter = ScoreArbiter::new(30);
        let id = spawner.active().id.clone();

        assert!(arbiter.claim(&mut directory, &mut spawner, "p1", &id).is_ok());
        let active_after_first = spawner.active().clone();

        let second = arbiter.claim(&mut directory, &mut spawner, "p2", &id);
        assert_eq!(
            second,
            Err(Rejection::StaleCollectible {
                claimed: id,
                active: active_after_first.id.clone(),
            })
        );
        assert_eq!(directory.get("p2").unwrap().score, 0);
        assert_eq!(spawner.active(), &active_after_first);
    }

    #[test]
    fn test_unknown_player_does_not_consume() {
        let (mut directory, mut spawner) = setup(3);
        let arbiter = ScoreArbiter::new(30);
        let active = spawner.active().clone();

        let result = arbiter.claim(&mut directory, &mut spawner, "ghost", &active.id);
        assert_eq!(result, Err(Rejection::UnknownPlayer("ghost".to_string())));
        assert_eq!(spawner.active(), &active);
    }

    #[test]
    fn test_claim_after_leave_is_rejected() {
        let (mut directory, mut spawner) = setup(3);
        let arbiter = ScoreArbiter::new(30);
        directory.leave("p1");
        let id = spawner.active().id.clone();

        assert!(matches!(
            arbiter.claim(&mut directory, &mut spawner, "p1", &id),
            Err(Rejection::UnknownPlayer(_))
        ));
        assert!(directory.get("p1").is_none());
    }

    #[test]
    fn test_win_on_crossing_only() {
        let (mut directory, mut spawner) = setup(3);
        let arbiter = ScoreArbiter::new(6);

        let id = spawner.active().id.clone();
        let claim = arbiter.claim(&mut directory, &mut spawner, "p2", &id).unwrap();
        assert!(claim.victory.is_none());

        let id = spawner.active().id.clone();
        let claim = arbiter.claim(&mut directory, &mut spawner, "p2", &id).unwrap();
        assert_eq!(claim.player.score, 6);
        assert_eq!(
            claim.victory,
            Some(Victory {
                winner: "p2".to_string(),
                losers: vec!["p1".to_string(), "p3".to_string()],
            })
        );

        // Already past the threshold, so no second announcement
        let id = spawner.active().id.clone();
        let claim = arbiter.claim(&mut directory, &mut spawner, "p2", &id).unwrap();
        assert_eq!(claim.player.score, 9);
        assert!(claim.victory.is_none());
    }

    #[test]
    fn test_zero_threshold_disables_wins() {
        let (mut directory, mut spawner) = setup(5);
        let arbiter = ScoreArbiter::new(0);

        let id = spawner.active().id.clone();
        let claim = arbiter.claim(&mut directory, &mut spawner, "p1", &id).unwrap();
        assert!(claim.victory.is_none());
    }

    #[test]
    fn test_scores_never_decrease() {
        let (mut directory, mut spawner) = setup(2);
        let arbiter = ScoreArbiter::new(0);
        let mut last = 0;

        for round in 0..50 {
            let player = if round % 2 == 0 { "p1" } else { "p3" };
            let id = spawner.active().id.clone();
            arbiter.claim(&mut directory, &mut spawner, player, &id).unwrap();
            // Replayed claims are dropped
            let _ = arbiter.claim(&mut directory, &mut spawner, player, &id);

            let score = directory.get("p1").unwrap().score;
            assert!(score >= last);
            last = score;
        }
        assert_eq!(directory.get("p1").unwrap().score, 50);
        assert_eq!(directory.get("p3").unwrap().score, 50);
    }
}
