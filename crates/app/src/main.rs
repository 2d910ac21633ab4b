//! Survivote - survival vote game driver
//!
//! Runs migrations, lists the lobby, inspects finished rooms and plays
//! seeded simulations against the local database.

use std::env;

use survivote_core::{Game, RoomFilter, Storage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod simulate;
mod state;

const DEFAULT_FILTER: &str = "survivote=info,survivote_core=info";

fn print_usage() {
    println!("survivote <command>");
    println!("commands:");
    println!("  migrate");
    println!("    create or upgrade the database and print the schema version");
    println!("  rooms");
    println!("    list rooms that have not resolved yet");
    println!("  simulate [capacity] [seed]");
    println!("    play one seeded room end to end (default capacity 5)");
    println!("  leaderboard <room_id>");
    println!("  result <room_id>");
    println!("environment:");
    println!("  {}  database path override", state::DATABASE_ENV);
    println!("  RUST_LOG      log filter (default {DEFAULT_FILTER})");
}

fn parse_room_id(value: Option<&String>) -> Result<Uuid, String> {
    let raw = value.ok_or_else(|| "missing room_id".to_string())?;
    Uuid::parse_str(raw).map_err(|_| format!("invalid room_id: {raw}"))
}

fn parse_u32_or(value: Option<&String>, label: &str, default: u32) -> Result<u32, String> {
    value
        .map(|raw| {
            raw.parse::<u32>()
                .map_err(|_| format!("invalid {label}: {raw}"))
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}

fn parse_seed(value: Option<&String>) -> Result<u64, String> {
    match value {
        Some(raw) => raw.parse::<u64>().map_err(|_| format!("invalid seed: {raw}")),
        None => Ok(rand::random()),
    }
}

/// Host of a room, used as the acting identity for read commands
fn host_of<S: Storage>(game: &Game<S>, room_id: Uuid) -> Result<Uuid, String> {
    game.store()
        .find_room(room_id)
        .map_err(|e| e.to_string())?
        .map(|room| room.host_user_id)
        .ok_or_else(|| format!("room {room_id} not found"))
}

fn run(args: &[String]) -> Result<(), String> {
    let command = args.get(1).map(String::as_str);
    if matches!(command, None | Some("help") | Some("--help") | Some("-h")) {
        print_usage();
        return Ok(());
    }

    let paths = state::AppPaths::discover().map_err(|e| e.to_string())?;
    let (settings, db) = state::open(&paths).map_err(|e| e.to_string())?;

    if command == Some("migrate") {
        println!("schema version {}", db.schema_version());
        return Ok(());
    }

    let game = Game::new(db, settings).map_err(|e| e.to_string())?;

    match command {
        Some("rooms") => {
            let rooms = game
                .rooms()
                .list_rooms(&RoomFilter::default())
                .map_err(|e| e.to_string())?;
            if rooms.is_empty() {
                println!("no open rooms");
            }
            for room in rooms {
                println!(
                    "{} {} {}/{} created {}",
                    room.id,
                    room.status,
                    room.current_players,
                    room.capacity,
                    room.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Some("simulate") => {
            let capacity = parse_u32_or(args.get(2), "capacity", 5)?;
            let seed = parse_seed(args.get(3))?;
            let summary = simulate::run(&game, capacity, seed).map_err(|e| e.to_string())?;

            println!(
                "simulated room={} seed={} chapters={}",
                summary.room_id, seed, summary.chapters
            );
            match summary.result {
                Some(result) => println!(
                    "winner {} with {} influence, mvp {}",
                    result.winner,
                    result.winning_weight,
                    result
                        .mvp_user_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".into())
                ),
                None => println!("leader vote tied, room left in FINAL_VOTE"),
            }
        }
        Some("leaderboard") => {
            let room_id = parse_room_id(args.get(2))?;
            let caller = host_of(&game, room_id)?;
            let board = game
                .election()
                .get_leaderboard(room_id, caller)
                .map_err(|e| e.to_string())?;
            for (rank, player) in board.iter().enumerate() {
                let marker = if player.is_host { " (host)" } else { "" };
                println!("{:>2}. {} {}{marker}", rank + 1, player.score, player.nickname);
            }
        }
        Some("result") => {
            let room_id = parse_room_id(args.get(2))?;
            let caller = host_of(&game, room_id)?;
            let result = game
                .election()
                .get_final_result(room_id, caller)
                .map_err(|e| e.to_string())?;
            println!("winner: {} ({})", result.winner, result.winning_weight);
            for (candidate, weight) in &result.totals {
                println!("  {candidate}: {weight}");
            }
            println!("resolved at {}", result.resolved_at.to_rfc3339());
        }
        Some(other) => {
            print_usage();
            return Err(format!("unknown command: {other}"));
        }
        None => print_usage(),
    }

    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .init();

    let args: Vec<String> = env::args().collect();
    if let Err(err) = run(&args) {
        tracing::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
