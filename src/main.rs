mod config;
mod events;
mod game;
mod msg;
mod net;
mod parser;
mod persistence;
mod systems;

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use game::{GameServer, GameWorld, SessionMessage, SessionReply};
use net::connection::handle_connection;
use parser::router::KeywordRouter;
use persistence::backend::{JsonStorageBackend, StorageBackend};
use persistence::WorldStatePersistence;
use systems::catalog::starter_catalog;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Item definition files layered over the built-in starter set.
const ITEM_FILES: [&str; 2] = ["data/items.json", "data/relics.yaml"];

fn load_catalog() -> systems::catalog::ItemCatalog {
    let mut catalog = starter_catalog();
    if let Err(e) = catalog.load_from_files(&ITEM_FILES) {
        warn!("Item definition load failed, continuing with built-ins: {e}");
    }
    catalog
}

fn usage() {
    eprintln!("Usage: eldermoor-server [serve | save <game> | load <game> | list | backup <game>]");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let code = match args.first().map(String::as_str) {
        None | Some("serve") => {
            run_server().await;
            0
        }
        Some("save") => match args.get(1) {
            Some(game_id) => cmd_save(game_id),
            None => {
                usage();
                1
            }
        },
        Some("load") => match args.get(1) {
            Some(game_id) => cmd_load(game_id),
            None => {
                usage();
                1
            }
        },
        Some("list") => cmd_list(),
        Some("backup") => match args.get(1) {
            Some(game_id) => cmd_backup(game_id),
            None => {
                usage();
                1
            }
        },
        Some(other) => {
            eprintln!("Unknown command: {other}");
            usage();
            1
        }
    };

    std::process::exit(code);
}

fn open_persistence() -> Option<WorldStatePersistence> {
    match JsonStorageBackend::new(config::SAVE_DIR) {
        Ok(backend) => Some(WorldStatePersistence::new(Box::new(backend))),
        Err(e) => {
            error!("Failed to open save directory: {e}");
            None
        }
    }
}

/// `save <game>`: bootstrap a fresh world for the game id and write a full
/// snapshot.
fn cmd_save(game_id: &str) -> i32 {
    let mut persistence = match open_persistence() {
        Some(p) => p,
        None => return 1,
    };
    persistence.start_session(game_id);

    let mut world = GameWorld::new(load_catalog(), Box::new(KeywordRouter::new()));
    world.update_player_location("player_1", config::STARTING_LOCATION);

    match persistence.save_world_state(&world.snapshot(), true, false) {
        Ok(_) => {
            println!("Saved game '{game_id}'.");
            0
        }
        Err(e) => {
            error!("Save failed: {e}");
            1
        }
    }
}

/// `load <game>`: load and validate a save, printing a short summary.
fn cmd_load(game_id: &str) -> i32 {
    let mut persistence = match open_persistence() {
        Some(p) => p,
        None => return 1,
    };
    persistence.start_session(game_id);

    match persistence.load_world_state(Some(game_id)) {
        Ok(Some(state)) => {
            let players = state.player.as_ref().map(|p| p.len()).unwrap_or(0);
            let locations = state.locations.as_ref().map(|l| l.len()).unwrap_or(0);
            let containers = state.containers.as_ref().map(|c| c.len()).unwrap_or(0);
            println!(
                "Loaded game '{game_id}': {players} player(s), {locations} location(s), {containers} container(s)."
            );
            0
        }
        Ok(None) => {
            eprintln!("Unknown game: {game_id}");
            2
        }
        Err(e) => {
            error!("Load failed: {e}");
            1
        }
    }
}

fn cmd_list() -> i32 {
    let persistence = match open_persistence() {
        Some(p) => p,
        None => return 1,
    };
    let games = persistence.list_saved_games();
    if games.is_empty() {
        println!("No saved games.");
    } else {
        for info in games {
            println!(
                "{}\tlast saved: {}",
                info.game_id,
                info.last_saved.as_deref().unwrap_or("unknown")
            );
        }
    }
    0
}

fn cmd_backup(game_id: &str) -> i32 {
    let backend = match JsonStorageBackend::new(config::SAVE_DIR) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to open save directory: {e}");
            return 1;
        }
    };
    match backend.backup_world_state(game_id) {
        Ok(true) => {
            println!("Backup created for game '{game_id}'.");
            0
        }
        Ok(false) => {
            eprintln!("Unknown game: {game_id}");
            2
        }
        Err(e) => {
            error!("Backup failed: {e}");
            1
        }
    }
}

async fn run_server() {
    let addr = format!("0.0.0.0:{}", config::PORT);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {addr}: {e}");
            return;
        }
    };
    info!("Eldermoor server listening on ws://{addr}");

    // World setup: resume the default game if a save exists, otherwise
    // seed the starting village.
    let mut persistence = match open_persistence() {
        Some(p) => p,
        None => return,
    };
    persistence.start_session(config::DEFAULT_GAME_ID);

    let mut world = GameWorld::new(load_catalog(), Box::new(KeywordRouter::new()));
    match persistence.load_world_state(Some(config::DEFAULT_GAME_ID)) {
        Ok(Some(state)) => {
            world.restore(&state);
            info!("Resumed game '{}'", config::DEFAULT_GAME_ID);
        }
        Ok(None) => {
            world.update_player_location("player_1", config::STARTING_LOCATION);
            info!("Started fresh game '{}'", config::DEFAULT_GAME_ID);
        }
        Err(e) => {
            warn!("Could not load saved world, starting fresh: {e}");
            world.update_player_location("player_1", config::STARTING_LOCATION);
        }
    }

    // Channel: connections -> engine loop.
    let (engine_tx, engine_rx) = mpsc::unbounded_channel::<SessionMessage>();

    // Engine loop owns all world state on its own task.
    let server = GameServer::new(world, persistence, engine_rx);
    let engine_handle = tokio::spawn(server.run());

    // Accept loop.
    let accept_tx = engine_tx.clone();
    let accept_handle = tokio::spawn(async move {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(v) => v,
                Err(e) => {
                    warn!("Accept error: {e}");
                    continue;
                }
            };

            let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
            info!("New connection {conn_id} from {peer_addr}");

            let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {peer_addr}: {e}");
                    continue;
                }
            };

            // Per-connection channel: engine -> connection write task.
            let (conn_tx, conn_rx) = mpsc::unbounded_channel::<SessionReply>();
            let _ = accept_tx.send(SessionMessage::Connected {
                conn_id,
                tx: conn_tx,
            });

            let engine_tx = accept_tx.clone();
            tokio::spawn(async move {
                handle_connection(ws_stream, conn_id, engine_tx, conn_rx).await;
            });
        }
    });

    // The engine loop ends on ctrl-c (after its final save); the accept
    // loop is aborted with it.
    let _ = engine_handle.await;
    accept_handle.abort();
}
