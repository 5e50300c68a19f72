//! Server top level: accept connections, own the world, orchestrate
//! shutdown.

use anyhow::{Context, Result};
use log::{info, warn};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use crate::net::TcpClient;
use crate::persist::{CharacterStore, save_player};
use crate::session::Session;
use crate::ticker::{join_tickers, spawn_tickers};
use crate::world::World;

/// How often the accept loop polls for the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub struct Server {
    world: Arc<World>,
    store: Arc<dyn CharacterStore>,
}

impl Server {
    pub fn new(world: Arc<World>, store: Arc<dyn CharacterStore>) -> Self {
        Self { world, store }
    }

    /// Bind, serve until the shutdown flag flips, then drain everything.
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.world.config.bind_addr)
            .with_context(|| format!("binding {}", self.world.config.bind_addr))?;
        listener.set_nonblocking(true).context("non-blocking listener")?;
        info!("listening on {}", self.world.config.bind_addr);

        let tickers = spawn_tickers(&self.world, &self.store);
        let mut sessions = Vec::new();

        while !self.world.is_shutting_down() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!("connection from {addr}");
                    if let Err(err) = stream.set_nonblocking(false) {
                        warn!("rejecting {addr}: {err}");
                        continue;
                    }
                    let client = match TcpClient::new(stream) {
                        Ok(client) => Arc::new(client),
                        Err(err) => {
                            warn!("rejecting {addr}: {err}");
                            continue;
                        }
                    };
                    let session = Session::new(Arc::clone(&self.world), Arc::clone(&self.store), client);
                    let handle = std::thread::Builder::new()
                        .name(format!("session-{addr}"))
                        .spawn(move || session.run())
                        .context("spawning session thread")?;
                    sessions.push(handle);
                    // Opportunistically reap finished session threads.
                    sessions.retain(|handle| !handle.is_finished());
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(err) => {
                    warn!("accept failed: {err}");
                    std::thread::sleep(ACCEPT_POLL);
                }
            }
        }

        self.shutdown(sessions, tickers);
        Ok(())
    }

    /// Orderly drain: warn, snapshot, close clients, join threads.
    fn shutdown(&self, sessions: Vec<std::thread::JoinHandle<()>>, tickers: Vec<std::thread::JoinHandle<()>>) {
        info!("shutting down: saving {} online player(s)", self.world.online_count());
        self.world
            .broadcast_global("The spire grows still. Come back soon.");
        for player in self.world.online_players() {
            save_player(&self.store, &player);
            player.request_close();
        }
        join_tickers(tickers);
        for handle in sessions {
            if handle.join().is_err() {
                warn!("a session thread panicked during shutdown");
            }
        }
        info!("shutdown complete");
    }
}
