//! Command line configuration and the validated game settings derived from it.

use arena_shared::{
    PlayField, COIN_SIZE, DEFAULT_FIELD_HEIGHT, DEFAULT_FIELD_TOP, DEFAULT_FIELD_WIDTH,
};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "32")]
    pub max_clients: usize,

    /// Score that wins the game (0 disables win detection)
    #[arg(short, long, default_value = "30")]
    pub win_score: u32,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value = "30")]
    pub client_timeout: u64,

    /// Play field width
    #[arg(long, default_value_t = DEFAULT_FIELD_WIDTH)]
    pub field_width: f32,

    /// Play field height
    #[arg(long, default_value_t = DEFAULT_FIELD_HEIGHT)]
    pub field_height: f32,

    /// Height of the HUD band at the top of the field
    #[arg(long, default_value_t = DEFAULT_FIELD_TOP)]
    pub field_top: f32,

    /// Collectible sprite edge length
    #[arg(long, default_value_t = COIN_SIZE)]
    pub coin_size: f32,

    /// Number of collectible sprite variants
    #[arg(long, default_value = "3")]
    pub coin_variants: u8,

    /// How collectible values are drawn
    #[arg(long, value_enum, default_value_t = ValuePolicyKind::Tiered)]
    pub value_policy: ValuePolicyKind,

    /// Lowest value for the uniform policy
    #[arg(long, default_value = "1")]
    pub value_min: u32,

    /// Highest value for the uniform policy
    #[arg(long, default_value = "5")]
    pub value_max: u32,

    /// Seed for collectible placement (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuePolicyKind {
    Tiered,
    Uniform,
}

/// Value distribution for new collectibles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuePolicy {
    /// 1, 2 or 3 with probabilities 0.60, 0.25 and 0.15.
    Tiered,
    /// Uniform over `min..=max`.
    Uniform { min: u32, max: u32 },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("play field must have a positive size, got {width}x{height}")]
    EmptyField { width: f32, height: f32 },

    #[error("HUD band ({top}) must be below the field height ({height})")]
    TopOutsideField { top: f32, height: f32 },

    #[error("collectible size {0} does not fit in the play field")]
    CoinTooLarge(f32),

    #[error("at least one collectible variant is required")]
    NoVariants,

    #[error("uniform value range {min}..={max} is invalid")]
    BadValueRange { min: u32, max: u32 },
}

/// Settings the session core needs, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub field: PlayField,
    pub coin_size: f32,
    pub variant_count: u8,
    pub value_policy: ValuePolicy,
    pub win_score: u32,
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            field: PlayField::default(),
            coin_size: COIN_SIZE,
            variant_count: 3,
            value_policy: ValuePolicy::Tiered,
            win_score: 30,
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let field = self.field;
        if field.width <= 0.0 || field.height <= 0.0 {
            return Err(ConfigError::EmptyField {
                width: field.width,
                height: field.height,
            });
        }
        if field.top < 0.0 || field.top >= field.height {
            return Err(ConfigError::TopOutsideField {
                top: field.top,
                height: field.height,
            });
        }
        if self.coin_size < 0.0
            || self.coin_size > field.width
            || self.coin_size > field.height - field.top
        {
            return Err(ConfigError::CoinTooLarge(self.coin_size));
        }
        if self.variant_count == 0 {
            return Err(ConfigError::NoVariants);
        }
        if let ValuePolicy::Uniform { min, max } = self.value_policy {
            if min == 0 || min > max {
                return Err(ConfigError::BadValueRange { min, max });
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout)
    }

    pub fn game_config(&self) -> Result<GameConfig, ConfigError> {
        let value_policy = match self.value_policy {
            ValuePolicyKind::Tiered => ValuePolicy::Tiered,
            ValuePolicyKind::Uniform => ValuePolicy::Uniform {
                min: self.value_min,
                max: self.value_max,
            },
        };

        let game = GameConfig {
            field: PlayField {
                width: self.field_width,
                height: self.field_height,
                top: self.field_top,
            },
            coin_size: self.coin_size,
            variant_count: self.coin_variants,
            value_policy,
            win_score: self.win_score,
            seed: self.seed,
        };
        game.validate()?;
        Ok(game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["arena-server"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.client_timeout(), Duration::from_secs(30));

        let game = config.game_config().unwrap();
        assert_eq!(game, GameConfig::default());
    }

    #[test]
    fn test_uniform_policy_from_flags() {
        let config = parse(&[
            "--value-policy",
            "uniform",
            "--value-min",
            "2",
            "--value-max",
            "4",
            "--seed",
            "9",
        ]);
        let game = config.game_config().unwrap();
        assert_eq!(game.value_policy, ValuePolicy::Uniform { min: 2, max: 4 });
        assert_eq!(game.seed, Some(9));
    }

    #[test]
    fn test_invalid_uniform_range() {
        let config = parse(&[
            "--value-policy",
            "uniform",
            "--value-min",
            "0",
            "--value-max",
            "4",
        ]);
        assert_eq!(
            config.game_config(),
            Err(ConfigError::BadValueRange { min: 0, max: 4 })
        );
    }

    #[test]
    fn test_field_validation() {
        let config = parse(&["--field-top", "480"]);
        assert!(matches!(
            config.game_config(),
            Err(ConfigError::TopOutsideField { .. })
        ));

        let config = parse(&["--coin-size", "1000"]);
        assert_eq!(config.game_config(), Err(ConfigError::CoinTooLarge(1000.0)));

        let config = parse(&["--coin-variants", "0"]);
        assert_eq!(config.game_config(), Err(ConfigError::NoVariants));
    }
}
