#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

//! **Spire** — a multi-user text adventure server.
//!
//! Many line-oriented clients share one in-memory tower world: rooms with
//! exits and floor items, NPCs with threat tables and respawn timers, and
//! players with bags, classes, spells, and quests. Session threads and the
//! tick scheduler mutate the same graph under a documented lock order; the
//! persistence façade snapshots characters behind a storage-agnostic trait.

// Core modules
pub mod bus;
pub mod chat;
pub mod class;
pub mod clock;
pub mod combat;
pub mod command;
pub mod config;
pub mod dice;
pub mod item;
pub mod net;
pub mod npc;
pub mod persist;
pub mod player;
pub mod portal;
pub mod quest;
pub mod room;
pub mod server;
pub mod session;
pub mod spell;
pub mod statistics;
pub mod status;
pub mod ticker;
pub mod world;

// Re-exports for convenience
pub use config::{ServerConfig, WorldContent};
pub use item::Item;
pub use npc::Npc;
pub use persist::{CharacterStore, FileStore, MemoryStore};
pub use player::Player;
pub use room::Room;
pub use server::Server;
pub use world::World;

pub const SPIRE_VERSION: &str = env!("CARGO_PKG_VERSION");
