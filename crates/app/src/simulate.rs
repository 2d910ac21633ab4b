//! Seeded end-to-end playthrough of one room

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use survivote_core::{
    BallotKind, Candidate, Choice, Conflict, Error, Game, Result, RoomResult, Storage,
};
use tracing::{info, warn};
use uuid::Uuid;

pub struct Summary {
    pub room_id: Uuid,
    pub host: Uuid,
    pub chapters: usize,
    pub result: Option<RoomResult>,
}

fn random_choice(rng: &mut StdRng) -> Choice {
    if rng.gen_bool(0.5) {
        Choice::A
    } else {
        Choice::B
    }
}

/// Fill a room, vote every chapter at random and run the leader election
pub fn run<S: Storage>(game: &Game<S>, capacity: u32, seed: u64) -> Result<Summary> {
    let mut rng = StdRng::seed_from_u64(seed);

    let host = Uuid::new_v4();
    let room = game.rooms().create_room(host, capacity, "host")?;
    let mut players = vec![host];
    for seat in 1..capacity {
        let user = Uuid::new_v4();
        game.rooms().join_room(room.id, user, &format!("player-{seat}"))?;
        players.push(user);
    }
    info!(room_id = %room.id, capacity, seed, "Room filled");

    let chapters = game.chapters();
    chapters.start_game(room.id, host)?;

    let mut resolved = 0;
    loop {
        let chapter = match chapters.get_current_chapter(room.id, host) {
            Ok(chapter) => chapter,
            Err(Error::Conflict(Conflict::NoActiveChapter)) => break,
            Err(e) => return Err(e),
        };

        for user in &players {
            let receipt =
                chapters.vote_chapter(room.id, chapter.id, *user, random_choice(&mut rng))?;
            if let Some(outcome) = receipt.outcome {
                println!(
                    "chapter {} \"{}\": {} wins {}-{}, {} rewarded",
                    outcome.chapter_order,
                    chapter.title,
                    outcome.majority,
                    outcome.count_a,
                    outcome.count_b,
                    outcome.rewarded.len()
                );
                resolved += 1;
            }
        }
    }

    let election = game.election();
    let mut result = None;
    for user in &players {
        let candidate = match game.settings().leader_ballot {
            BallotKind::Player => Candidate::Player(players[rng.gen_range(0..players.len())]),
            BallotKind::Choice => Candidate::Choice(random_choice(&mut rng)),
        };
        let receipt = election.vote_leader(room.id, *user, candidate)?;
        if receipt.result.is_some() {
            result = receipt.result;
        }
    }
    if result.is_none() {
        warn!(room_id = %room.id, "Leader election tied");
    }

    Ok(Summary {
        room_id: room.id,
        host,
        chapters: resolved,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use survivote_core::{Database, GameSettings, RoomStatus};

    #[test]
    fn simulation_reaches_the_final_vote() {
        let db = Database::open_in_memory().unwrap();
        let game = Game::new(db, GameSettings::default()).unwrap();

        let summary = run(&game, 5, 7).unwrap();
        assert_eq!(summary.chapters, game.catalog().len());

        let room = game.rooms().get_room(summary.room_id, summary.host).unwrap();
        match summary.result {
            Some(_) => assert_eq!(room.status, RoomStatus::Resolved),
            None => assert_eq!(room.status, RoomStatus::FinalVote),
        }
    }
}
