#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! ** Spire **
//! Multi-user text adventure server.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{info, warn};

use spire_engine::persist::FileStore;
use spire_engine::{CharacterStore, Server, ServerConfig, SPIRE_VERSION, World, WorldContent};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();
    info!("Starting Spire server (version {SPIRE_VERSION})");

    let settings_path = std::env::args().nth(1).unwrap_or_else(|| "server.yaml".to_string());
    let config = ServerConfig::load(Path::new(&settings_path)).context("while loading settings")?;

    info!("loading world content from '{}'", config.data_dir);
    let content = WorldContent::load(Path::new(&config.data_dir)).context("while loading world content")?;

    let store: Arc<dyn CharacterStore> = Arc::new(
        FileStore::open(Path::new(&config.save_dir)).context("while opening the character store")?,
    );

    let world = Arc::new(World::new(config, content).context("while building the world")?);
    if world.config.admins.is_empty() {
        warn!("no admin accounts configured; admin verbs are unreachable");
    }

    info!("world ready; serving");
    Server::new(world, store).run()
}
