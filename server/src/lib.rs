//! # Coin Arena Server Library
//!
//! This library provides the authoritative session server for the coin race
//! game. It tracks connected players, owns the single collectible every
//! player is racing toward, and pushes updates so every client sees the same
//! players, scores and collectible.
//!
//! ## Core Responsibilities
//!
//! ### Player Registry
//! Every client connection gets a server-issued id. Once the client joins,
//! a player record with that id holds its position, animation state and
//! score until the connection goes away.
//!
//! ### Collectible Arbitration
//! Clients detect collisions locally and race claim messages to the server.
//! The server accepts exactly one claim per collectible: the first claim
//! naming the active collectible scores, replaces the collectible and
//! possibly ends the game; every later claim for that id is stale and dropped.
//!
//! ### Fan-out
//! Results are pushed to the right audience: the originating client, every
//! other client, or everyone.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! All session state lives in one `ConnectionRegistry` owned by the server's
//! main loop. Connection tasks only decode frames and forward them over a
//! channel, so events are applied one at a time and never race each other.
//! Outbound packets go into bounded per-connection queues filled with
//! `try_send`, so no state change ever waits on a socket. A client that lets
//! its queue fill up is disconnected instead of buffering without limit.
//!
//! ### TCP Framing
//! Each client holds one TCP connection carrying length-prefixed `bincode`
//! frames of the shared `Packet` type. A frame that fails to decode is
//! dropped and the connection stays open.
//!
//! ## Module Organization
//!
//! - `directory`: joined players in join order
//! - `spawner`: collectible placement, values and ids
//! - `arbiter`: exactly-once claim resolution and win detection
//! - `bus`: reply / others / all delivery
//! - `registry`: maps connection events onto the modules above
//! - `network`: listener, per-connection tasks, session loop
//! - `codec`: frame reading and writing
//! - `config`: command line flags and validated game settings
//! - `error`: rejection reasons for dropped events
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use arena_server::config::GameConfig;
//! use arena_server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind with default game rules, room for 32 clients and a 30s idle timeout
//!     let mut server = Server::bind(
//!         "127.0.0.1:8080",
//!         &GameConfig::default(),
//!         32,
//!         Duration::from_secs(30),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod arbiter;
pub mod bus;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod network;
pub mod registry;
pub mod spawner;
