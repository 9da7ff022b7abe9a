//! Ledger integrity under concurrency and across a whole ballot.

use std::thread;

use chrono::Utc;
use forum::{
    db::Store,
    error::AppError,
    models::{SessionControl, SessionStatus},
};

fn open_session(store: &Store, post: &str, index: i64) {
    store
        .save_control(&SessionControl {
            status: SessionStatus::InProgress,
            current_post: Some(post.to_string()),
            current_post_index: index,
            post_start_at: Some(Utc::now()),
        })
        .unwrap();
}

fn fixture() -> Store {
    let store = Store::open_in_memory().unwrap();
    store.seed_posts().unwrap();
    store
        .insert_student("21CS001", "Asha", "CSE", "III", "hash")
        .unwrap();
    store
}

#[test]
fn test_concurrent_votes_same_student_one_winner() {
    let store = fixture();
    let c1 = store
        .insert_candidate("Ravi", "President", "ECE", "II", "m", "")
        .unwrap();
    let c2 = store
        .insert_candidate("Kiran", "President", "MECH", "IV", "m", "")
        .unwrap();
    open_session(&store, "President", 0);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let candidate = if i % 2 == 0 { c1.id } else { c2.id };
            thread::spawn(move || store.cast_vote("21CS001", "President", candidate))
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let accepted = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(accepted, 1, "exactly one concurrent vote must land");
    for outcome in &outcomes {
        if let Err(e) = outcome {
            assert!(matches!(e, AppError::DuplicateVote(_)), "got {e:?}");
        }
    }

    // The winning candidate's tally moved exactly once, the other not at all.
    let votes1 = store.candidate(c1.id).unwrap().unwrap().votes;
    let votes2 = store.candidate(c2.id).unwrap().unwrap().votes;
    assert_eq!(votes1 + votes2, 1);
}

#[test]
fn test_full_ballot_sets_has_voted_all() {
    let store = fixture();
    let posts = store.posts().unwrap();

    // One candidate per post, voted in session order.
    for (index, post) in posts.iter().enumerate() {
        let candidate = store
            .insert_candidate("Ravi", &post.name, "ECE", "II", "m", "")
            .unwrap();
        open_session(&store, &post.name, index as i64);

        let outcome = store
            .cast_vote("21CS001", &post.name, candidate.id)
            .unwrap();

        let expected_complete = index == posts.len() - 1;
        assert_eq!(
            outcome.has_voted_all, expected_complete,
            "completeness flipped early at {}",
            post.name
        );

        let record = store.student_by_register_no("21CS001").unwrap().unwrap();
        assert_eq!(record.student.has_voted_all, expected_complete);
    }

    // Never true with a gap, never false once the set is complete.
    let record = store.student_by_register_no("21CS001").unwrap().unwrap();
    let map = store.voted_posts(record.student.id).unwrap();
    assert_eq!(map.len(), posts.len());
    assert!(record.student.has_voted_all);

    // A completed ballot can never vote again anywhere.
    open_session(&store, "President", 0);
    let candidate = store.candidates_for_post("President").unwrap()[0].id;
    let err = store.cast_vote("21CS001", "President", candidate).unwrap_err();
    assert!(matches!(err, AppError::AlreadyVoted(_)));
}

#[test]
fn test_tally_sum_equals_accepted_votes() {
    let store = fixture();
    for i in 2..=6 {
        store
            .insert_student(&format!("21CS00{i}"), "Student", "CSE", "III", "hash")
            .unwrap();
    }
    let c1 = store
        .insert_candidate("Ravi", "President", "ECE", "II", "m", "")
        .unwrap();
    let c2 = store
        .insert_candidate("Kiran", "President", "MECH", "IV", "m", "")
        .unwrap();
    open_session(&store, "President", 0);

    let voters = ["21CS001", "21CS002", "21CS003", "21CS004", "21CS005", "21CS006"];
    for (i, voter) in voters.iter().enumerate() {
        let candidate = if i < 4 { c1.id } else { c2.id };
        store.cast_vote(voter, "President", candidate).unwrap();
    }
    // A duplicate attempt does not move any tally.
    let _ = store.cast_vote("21CS001", "President", c2.id).unwrap_err();

    let total: i64 = store
        .candidates_for_post("President")
        .unwrap()
        .iter()
        .map(|c| c.votes)
        .sum();
    assert_eq!(total, voters.len() as i64);

    let totals = store.post_totals().unwrap();
    let president = totals.iter().find(|t| t.post == "President").unwrap();
    assert_eq!(president.total_votes, voters.len() as i64);
}

#[test]
fn test_candidate_deletion_rederives_completeness() {
    let store = fixture();
    let posts = store.posts().unwrap();

    let mut last_candidate = 0;
    for (index, post) in posts.iter().enumerate() {
        let candidate = store
            .insert_candidate("Ravi", &post.name, "ECE", "II", "m", "")
            .unwrap();
        open_session(&store, &post.name, index as i64);
        store
            .cast_vote("21CS001", &post.name, candidate.id)
            .unwrap();
        last_candidate = candidate.id;
    }

    let record = store.student_by_register_no("21CS001").unwrap().unwrap();
    assert!(record.student.has_voted_all);

    // Deleting a voted-for candidate removes its votes, so the ballot has a
    // gap again.
    store.delete_candidate(last_candidate).unwrap();

    let record = store.student_by_register_no("21CS001").unwrap().unwrap();
    assert!(!record.student.has_voted_all);
    let map = store.voted_posts(record.student.id).unwrap();
    assert_eq!(map.len(), posts.len() - 1);
}
