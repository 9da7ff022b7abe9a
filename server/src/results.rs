//! Result tabulator.
//!
//! Announcing a post reconciles the tally cache from the ledger, picks the
//! winner deterministically (votes descending, then candidate id ascending)
//! and upserts the Result and CommitteeSeat rows in one transaction.
//! Re-announcing recomputes from current tallies, so with no new votes the
//! outcome is identical. Callers broadcast only after the commit.

use chrono::Utc;
use rusqlite::params;

use crate::{
    db::{CANDIDATE_COLUMNS, Store, row_to_candidate},
    error::AppError,
    models::{Candidate, CandidateTally, ElectionResult},
};

impl Store {
    pub fn announce(&self, post: &str) -> Result<(ElectionResult, Candidate), AppError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        // The vote-count cache is never trusted across concurrent writes;
        // recompute it from the ledger before ranking.
        tx.execute(
            "UPDATE candidates
             SET votes = (SELECT COUNT(*) FROM votes WHERE candidate_id = candidates.id)
             WHERE post = ?1",
            params![post],
        )?;

        let candidates: Vec<Candidate> = {
            let mut stmt = tx.prepare(&format!(
                "{CANDIDATE_COLUMNS} FROM candidates WHERE post = ?1 ORDER BY votes DESC, id ASC"
            ))?;
            let rows = stmt.query_map(params![post], row_to_candidate)?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        if candidates.is_empty() {
            return Err(AppError::NotFound(
                "No candidates found for this post".to_string(),
            ));
        }

        let winner = candidates[0].clone();
        let tally: Vec<CandidateTally> = candidates
            .iter()
            .map(|c| CandidateTally {
                candidate_id: c.id,
                name: c.name.clone(),
                votes: c.votes,
            })
            .collect();
        let announced_at = Utc::now();

        tx.execute(
            "INSERT INTO results (post, winner_id, winner_name, tally, announced_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(post) DO UPDATE SET
                 winner_id = excluded.winner_id,
                 winner_name = excluded.winner_name,
                 tally = excluded.tally,
                 announced_at = excluded.announced_at",
            params![
                post,
                winner.id,
                winner.name,
                serde_json::to_string(&tally)?,
                announced_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "INSERT INTO committee (post, candidate_id, name, dept, year, announced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(post) DO UPDATE SET
                 candidate_id = excluded.candidate_id,
                 name = excluded.name,
                 dept = excluded.dept,
                 year = excluded.year,
                 announced_at = excluded.announced_at",
            params![
                post,
                winner.id,
                winner.name,
                winner.department,
                winner.year,
                announced_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        let result = ElectionResult {
            post: post.to_string(),
            winner_id: winner.id,
            winner_name: winner.name.clone(),
            total_votes_per_candidate: tally,
            announced_at,
        };
        Ok((result, winner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announce_without_candidates() {
        let store = Store::open_in_memory().unwrap();
        store.seed_posts().unwrap();
        let err = store.announce("President").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_tie_breaks_on_lowest_id() {
        let store = Store::open_in_memory().unwrap();
        store.seed_posts().unwrap();
        let first = store
            .insert_candidate("Ravi", "President", "ECE", "II", "m", "")
            .unwrap();
        store
            .insert_candidate("Kiran", "President", "MECH", "IV", "m", "")
            .unwrap();

        // Zero votes each: the earlier id wins, repeatably.
        let (a, _) = store.announce("President").unwrap();
        let (b, _) = store.announce("President").unwrap();
        assert_eq!(a.winner_id, first.id);
        assert_eq!(b.winner_id, first.id);
        assert_eq!(a.total_votes_per_candidate, b.total_votes_per_candidate);
    }
}
