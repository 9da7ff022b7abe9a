//! Vote ledger.
//!
//! The whole cast runs inside one transaction: the duplicate check, the
//! ledger insert, the tally increment and the completeness update commit
//! together or not at all. The `UNIQUE (student_id, post)` index is the
//! storage-level backstop — if anything races past the in-transaction check,
//! the constraint fires and is reported as a duplicate vote, not as a
//! generic storage failure.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use crate::{
    db::{Store, fetch_candidate, read_control},
    error::AppError,
    models::SessionStatus,
};

#[derive(Clone, Debug)]
pub struct VoteOutcome {
    pub has_voted_all: bool,
    pub student_name: String,
    pub register_no: String,
}

impl Store {
    /// Casts one vote. Preconditions are checked in order, each reported as
    /// its own failure kind.
    pub fn cast_vote(
        &self,
        register_no: &str,
        post: &str,
        candidate_id: i64,
    ) -> Result<VoteOutcome, AppError> {
        if register_no.trim().is_empty() || post.trim().is_empty() {
            return Err(AppError::Validation("All fields are required".to_string()));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let control = read_control(&tx)?;
        if control.status != SessionStatus::InProgress {
            return Err(AppError::VotingClosed(
                "Voting is not in progress".to_string(),
            ));
        }
        if control.current_post.as_deref() != Some(post) {
            return Err(AppError::VotingClosed(format!(
                "Voting for {post} is not currently open"
            )));
        }

        let student = tx
            .query_row(
                "SELECT id, name, has_voted_all FROM students WHERE register_no = ?1",
                params![register_no],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((student_id, student_name, has_voted_all)) = student else {
            return Err(AppError::NotFound("Student not found".to_string()));
        };

        if has_voted_all {
            return Err(AppError::AlreadyVoted(
                "You have already cast your vote".to_string(),
            ));
        }

        let already: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM votes WHERE student_id = ?1 AND post = ?2",
                params![student_id, post],
                |row| row.get(0),
            )
            .optional()?;
        if already.is_some() {
            return Err(duplicate_vote());
        }

        let Some(candidate) = fetch_candidate(&tx, candidate_id)? else {
            return Err(AppError::InvalidCandidate(
                "Candidate not found".to_string(),
            ));
        };
        if candidate.post != post {
            return Err(AppError::InvalidCandidate(
                "Candidate does not belong to this post".to_string(),
            ));
        }

        let inserted = tx.execute(
            "INSERT INTO votes (student_id, student_register_no, post, candidate_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                student_id,
                register_no,
                post,
                candidate_id,
                Utc::now().to_rfc3339()
            ],
        );
        if let Err(e) = inserted {
            return Err(match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    duplicate_vote()
                }
                other => other.into(),
            });
        }

        tx.execute(
            "UPDATE candidates SET votes = votes + 1 WHERE id = ?1",
            params![candidate_id],
        )?;

        // Completeness is recomputed against the authoritative post count,
        // not a cached one.
        let (voted, total): (i64, i64) = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM votes WHERE student_id = ?1),
                    (SELECT COUNT(*) FROM posts)",
            params![student_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let completed = total > 0 && voted >= total;

        if completed {
            tx.execute(
                "UPDATE students SET has_voted_all = 1 WHERE id = ?1",
                params![student_id],
            )?;
        }

        tx.commit()?;

        Ok(VoteOutcome {
            has_voted_all: completed,
            student_name,
            register_no: register_no.to_string(),
        })
    }
}

fn duplicate_vote() -> AppError {
    AppError::DuplicateVote("You have already voted for this post".to_string())
}
