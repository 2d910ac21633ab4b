//! Several database handles on one file, racing on the same room

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use survivote_core::{
    Candidate, Choice, Conflict, Database, Game, GameSettings, Influence, Result, RoomStatus,
};
use tempfile::TempDir;
use uuid::Uuid;

fn open_game(path: &Path) -> Game<Database> {
    Game::new(Database::open(path).unwrap(), GameSettings::default()).unwrap()
}

/// Run `f` on `n` threads, each with its own handle, released together
fn race<T, F>(path: &Path, n: usize, f: F) -> Vec<Result<T>>
where
    T: Send + 'static,
    F: Fn(&Game<Database>, usize) -> Result<T> + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(n));
    let f = Arc::new(f);

    let handles: Vec<_> = (0..n)
        .map(|i| {
            let path = path.to_path_buf();
            let barrier = Arc::clone(&barrier);
            let f = Arc::clone(&f);
            thread::spawn(move || {
                let game = open_game(&path);
                barrier.wait();
                f(&game, i)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn setup() -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    (dir, path)
}

#[test]
fn test_concurrent_chapter_resolution_rewards_once() {
    let (_dir, path) = setup();
    let game = open_game(&path);

    let host = Uuid::new_v4();
    let room = game.rooms().create_room(host, 3, "host").unwrap();
    let p1 = Uuid::new_v4();
    let p2 = Uuid::new_v4();
    game.rooms().join_room(room.id, p1, "one").unwrap();
    game.rooms().join_room(room.id, p2, "two").unwrap();
    game.chapters().start_game(room.id, host).unwrap();

    let chapter = game.chapters().get_current_chapter(room.id, host).unwrap();
    game.chapters().vote_chapter(room.id, chapter.id, host, Choice::A).unwrap();
    game.chapters().vote_chapter(room.id, chapter.id, p1, Choice::A).unwrap();

    let room_id = room.id;
    let chapter_id = chapter.id;
    let results = race(&path, 4, move |game, _| {
        game.chapters().resolve_chapter(room_id, chapter_id, host)
    });

    let applied = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(applied, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(err.is_resolution_race(), "unexpected error: {err}");
    }

    assert_eq!(game.ledger().read(room_id, host).unwrap(), Influence(100));
    assert_eq!(game.ledger().read(room_id, p1).unwrap(), Influence(100));
    assert_eq!(game.ledger().read(room_id, p2).unwrap(), Influence::ZERO);
    assert_eq!(game.chapters().list_resolutions(room_id, host).unwrap().len(), 1);

    let state = game.rooms().get_game_state(room_id, host).unwrap();
    assert_eq!(state.current_chapter_order, Some(2));
}

#[test]
fn test_concurrent_joins_never_overfill() {
    let (_dir, path) = setup();
    let game = open_game(&path);
    let host = Uuid::new_v4();
    let room = game.rooms().create_room(host, 3, "host").unwrap();

    let room_id = room.id;
    let results = race(&path, 6, move |game, i| {
        game.rooms().join_room(room_id, Uuid::new_v4(), &format!("p{i}"))
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.conflict(), Some(&Conflict::RoomFull), "unexpected error: {err}");
    }
    assert_eq!(game.rooms().get_players(room_id, host).unwrap().len(), 3);
}

#[test]
fn test_concurrent_final_resolution_writes_one_result() {
    let (_dir, path) = setup();
    let game = open_game(&path);

    let host = Uuid::new_v4();
    let room = game.rooms().create_room(host, 3, "host").unwrap();
    let others = [Uuid::new_v4(), Uuid::new_v4()];
    for (i, user) in others.iter().enumerate() {
        game.rooms().join_room(room.id, *user, &format!("p{i}")).unwrap();
    }
    game.chapters().start_game(room.id, host).unwrap();

    while let Ok(chapter) = game.chapters().get_current_chapter(room.id, host) {
        for user in [host, others[0], others[1]] {
            game.chapters()
                .vote_chapter(room.id, chapter.id, user, Choice::B)
                .unwrap();
        }
    }

    // Two of three ballots: no quorum, the host closes the vote
    let election = game.election();
    election
        .vote_leader(room.id, others[0], Candidate::Player(host))
        .unwrap();
    election
        .vote_leader(room.id, others[1], Candidate::Player(host))
        .unwrap();

    let room_id = room.id;
    let results = race(&path, 3, move |game, _| {
        game.election().resolve_final(room_id, host)
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(
            err.conflict(),
            Some(&Conflict::AlreadyResolved {
                phase: RoomStatus::Resolved
            })
        );
    }

    let stored = game.election().get_final_result(room_id, host).unwrap();
    let winner = results.into_iter().find_map(|r| r.ok()).unwrap();
    assert_eq!(stored.winner, winner.winner);
    assert_eq!(stored.totals, winner.totals);
}
