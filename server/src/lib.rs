//! # Arena Server Library
//!
//! Authoritative server for a top-down multiplayer arena shooter. Clients
//! connect over TCP, join the arena, stream their inputs, and receive a
//! snapshot of the whole world after every simulation tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server owns the only copy of the world. Movement, shooting, hits,
//! scoring and respawns are all decided here on a fixed time step; clients
//! only render what they are told.
//!
//! ### Connection Management
//! Every TCP connection goes through a JOIN handshake before it becomes a
//! player. The registry assigns ids, enforces capacity and tears players
//! down when they leave, misbehave or stop reading.
//!
//! ### State Broadcasting
//! After each tick the world is encoded once and queued to every joined
//! client. A client that cannot keep up with the tick rate is disconnected
//! instead of stalling everyone else.
//!
//! ## Architecture Design
//!
//! ### Single Owner of the World
//! `GameState` lives inside the game loop task and is never shared. Connection
//! tasks talk to it through two channels:
//! - a `watch` per player carrying its latest input snapshot, read once per tick
//! - a command queue for joins and leaves, drained at the start of each tick
//!
//! ### Framed JSON over TCP
//! Messages are JSON objects prefixed by a 4-byte big-endian length. The
//! codec lives in the `shared` crate so tools and tests speak the same protocol.
//!
//! ## Module Organization
//!
//! - `broadcast`: per-tick snapshot fan-out and slow-client eviction
//! - `client_manager`: id assignment, capacity and connection lifecycle
//! - `config`: server and simulation tunables
//! - `error`: server error type
//! - `game`: the simulation engine
//! - `network`: TCP accept loop, handshake, connection tasks and game loop
//! - `physics`: 2D vector math
//! - `utils`: colors and name validation
//! - `world`: arena, player, bullet and input types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:5555".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod game;
pub mod network;
pub mod physics;
pub mod utils;
pub mod world;
