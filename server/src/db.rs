//! SQLite-backed store.
//!
//! One connection guarded by a mutex: every multi-statement write runs as a
//! single transaction on it, which is what linearizes the ledger and the
//! session control row. The schema is embedded at compile time.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::{
    error::AppError,
    models::{
        AdminRecord, Candidate, CommitteeSeat, FIXED_POSTS, Post, SessionControl, SessionStatus,
        Student, StudentRecord,
    },
};

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Partial candidate update; `None` leaves the field untouched.
#[derive(Debug, Default)]
pub struct CandidateUpdate {
    pub name: Option<String>,
    pub post: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub manifesto: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostTotal {
    pub post: String,
    pub total_votes: i64,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, AppError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    // ---- posts ----

    /// Idempotent re-seed of the fixed post set.
    pub fn seed_posts(&self) -> Result<Vec<Post>, AppError> {
        {
            let conn = self.lock();
            for (name, ord) in FIXED_POSTS {
                conn.execute(
                    "INSERT OR IGNORE INTO posts (name, ord) VALUES (?1, ?2)",
                    params![name, ord],
                )?;
            }
        }
        self.posts()
    }

    pub fn posts(&self) -> Result<Vec<Post>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name, ord FROM posts ORDER BY ord")?;
        let rows = stmt.query_map([], |row| {
            Ok(Post {
                name: row.get(0)?,
                order: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn post_exists(&self, name: &str) -> Result<bool, AppError> {
        let conn = self.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM posts WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ---- session control ----

    pub fn get_control(&self) -> Result<SessionControl, AppError> {
        let conn = self.lock();
        read_control(&conn)
    }

    pub fn save_control(&self, control: &SessionControl) -> Result<(), AppError> {
        let conn = self.lock();
        write_control(&conn, control)?;
        Ok(())
    }

    // ---- admins ----

    pub fn upsert_admin(&self, email: &str, password_hash: &str) -> Result<(), AppError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO admins (email, password_hash) VALUES (?1, ?2)
             ON CONFLICT(email) DO UPDATE SET password_hash = excluded.password_hash",
            params![email, password_hash],
        )?;
        Ok(())
    }

    pub fn admin_by_email(&self, email: &str) -> Result<Option<AdminRecord>, AppError> {
        let conn = self.lock();
        let admin = conn
            .query_row(
                "SELECT id, email, password_hash FROM admins WHERE email = ?1",
                params![email],
                |row| {
                    Ok(AdminRecord {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        password_hash: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(admin)
    }

    // ---- students ----

    pub fn insert_student(
        &self,
        register_no: &str,
        name: &str,
        department: &str,
        year: &str,
        password_hash: &str,
    ) -> Result<Student, AppError> {
        let conn = self.lock();
        let inserted = conn.execute(
            "INSERT INTO students (register_no, name, department, year, password_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![register_no, name, department, year, password_hash],
        );

        match inserted {
            Ok(_) => Ok(Student {
                id: conn.last_insert_rowid(),
                register_no: register_no.to_string(),
                name: name.to_string(),
                department: department.to_string(),
                year: year.to_string(),
                has_voted_all: false,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AppError::Validation(
                    "Student with this register number already exists".to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn students(&self) -> Result<Vec<Student>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, register_no, name, department, year, has_voted_all
             FROM students ORDER BY register_no",
        )?;
        let rows = stmt.query_map([], row_to_student)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn student_by_register_no(
        &self,
        register_no: &str,
    ) -> Result<Option<StudentRecord>, AppError> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT id, register_no, name, department, year, has_voted_all, password_hash
                 FROM students WHERE register_no = ?1",
                params![register_no],
                |row| {
                    Ok(StudentRecord {
                        student: row_to_student(row)?,
                        password_hash: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// The per-student voted-posts map, read back from the ledger.
    pub fn voted_posts(&self, student_id: i64) -> Result<BTreeMap<String, i64>, AppError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT post, candidate_id FROM votes WHERE student_id = ?1")?;
        let rows = stmt.query_map(params![student_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ---- candidates ----

    pub fn insert_candidate(
        &self,
        name: &str,
        post: &str,
        department: &str,
        year: &str,
        manifesto: &str,
        photo_url: &str,
    ) -> Result<Candidate, AppError> {
        if !self.post_exists(post)? {
            return Err(AppError::Validation(format!("Unknown post: {post}")));
        }

        let conn = self.lock();
        conn.execute(
            "INSERT INTO candidates (name, post, department, year, manifesto, photo_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, post, department, year, manifesto, photo_url],
        )?;
        let id = conn.last_insert_rowid();
        fetch_candidate(&conn, id)?.ok_or_else(|| missing_candidate(id))
    }

    pub fn candidate(&self, id: i64) -> Result<Option<Candidate>, AppError> {
        let conn = self.lock();
        fetch_candidate(&conn, id)
    }

    pub fn candidates(&self) -> Result<Vec<Candidate>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{CANDIDATE_COLUMNS} FROM candidates ORDER BY post, name"
        ))?;
        let rows = stmt.query_map([], row_to_candidate)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn candidates_for_post(&self, post: &str) -> Result<Vec<Candidate>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{CANDIDATE_COLUMNS} FROM candidates WHERE post = ?1 ORDER BY name"
        ))?;
        let rows = stmt.query_map(params![post], row_to_candidate)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Applies a partial update and reconciles the tally cache from the
    /// ledger in the same transaction.
    pub fn update_candidate(
        &self,
        id: i64,
        update: CandidateUpdate,
    ) -> Result<Candidate, AppError> {
        if let Some(post) = &update.post {
            if !self.post_exists(post)? {
                return Err(AppError::Validation(format!("Unknown post: {post}")));
            }
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let existing = fetch_candidate(&tx, id)?
            .ok_or_else(|| AppError::NotFound("Candidate not found".to_string()))?;

        tx.execute(
            "UPDATE candidates
             SET name = ?1, post = ?2, department = ?3, year = ?4, manifesto = ?5, photo_url = ?6,
                 votes = (SELECT COUNT(*) FROM votes WHERE candidate_id = ?7)
             WHERE id = ?7",
            params![
                update.name.unwrap_or(existing.name),
                update.post.unwrap_or(existing.post),
                update.department.unwrap_or(existing.department),
                update.year.unwrap_or(existing.year),
                update.manifesto.unwrap_or(existing.manifesto),
                update.photo_url.unwrap_or(existing.photo_url),
                id,
            ],
        )?;

        let updated = fetch_candidate(&tx, id)?.ok_or_else(|| missing_candidate(id))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Deletes a candidate and its votes, then re-derives `has_voted_all`
    /// for every student whose ballot shrank.
    pub fn delete_candidate(&self, id: i64) -> Result<(), AppError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        fetch_candidate(&tx, id)?
            .ok_or_else(|| AppError::NotFound("Candidate not found".to_string()))?;

        let affected: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT DISTINCT student_id FROM votes WHERE candidate_id = ?1")?;
            let rows = stmt.query_map(params![id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        tx.execute("DELETE FROM votes WHERE candidate_id = ?1", params![id])?;
        tx.execute("DELETE FROM candidates WHERE id = ?1", params![id])?;

        for student_id in affected {
            tx.execute(
                "UPDATE students SET has_voted_all =
                     ((SELECT COUNT(*) FROM votes WHERE student_id = ?1) =
                      (SELECT COUNT(*) FROM posts)
                      AND (SELECT COUNT(*) FROM posts) > 0)
                 WHERE id = ?1",
                params![student_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Recomputes one candidate's tally cache from the ledger. Exposed for
    /// diagnostics; edit and announcement paths reconcile on their own.
    pub fn reconcile_candidate(&self, id: i64) -> Result<Candidate, AppError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE candidates
             SET votes = (SELECT COUNT(*) FROM votes WHERE candidate_id = ?1)
             WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound("Candidate not found".to_string()));
        }
        fetch_candidate(&conn, id)?.ok_or_else(|| missing_candidate(id))
    }

    // ---- aggregates ----

    pub fn post_totals(&self) -> Result<Vec<PostTotal>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT p.name, COUNT(v.id) FROM posts p
             LEFT JOIN votes v ON v.post = p.name
             GROUP BY p.name ORDER BY p.ord",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PostTotal {
                post: row.get(0)?,
                total_votes: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn committee(&self) -> Result<Vec<CommitteeSeat>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT f.post, f.candidate_id, f.name, f.dept, f.year, f.announced_at, c.photo_url
             FROM committee f
             LEFT JOIN candidates c ON c.id = f.candidate_id
             LEFT JOIN posts p ON p.name = f.post
             ORDER BY p.ord",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut seats = Vec::new();
        for row in rows {
            let (post, candidate_id, name, dept, year, announced_at, photo_url) = row?;
            seats.push(CommitteeSeat {
                post,
                candidate_id,
                name,
                dept,
                year,
                announced_at: parse_ts(&announced_at)?,
                photo_url,
            });
        }
        Ok(seats)
    }
}

pub(crate) const CANDIDATE_COLUMNS: &str =
    "SELECT id, name, post, department, year, manifesto, photo_url, votes";

fn row_to_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        register_no: row.get(1)?,
        name: row.get(2)?,
        department: row.get(3)?,
        year: row.get(4)?,
        has_voted_all: row.get(5)?,
    })
}

pub(crate) fn row_to_candidate(row: &rusqlite::Row<'_>) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        id: row.get(0)?,
        name: row.get(1)?,
        post: row.get(2)?,
        department: row.get(3)?,
        year: row.get(4)?,
        manifesto: row.get(5)?,
        photo_url: row.get(6)?,
        votes: row.get(7)?,
    })
}

pub(crate) fn fetch_candidate(
    conn: &Connection,
    id: i64,
) -> Result<Option<Candidate>, AppError> {
    let candidate = conn
        .query_row(
            &format!("{CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1"),
            params![id],
            row_to_candidate,
        )
        .optional()?;
    Ok(candidate)
}

fn missing_candidate(id: i64) -> AppError {
    AppError::Storage(format!("candidate {id} vanished mid-statement"))
}

/// Reads the singleton control row, creating it on first access.
pub(crate) fn read_control(conn: &Connection) -> Result<SessionControl, AppError> {
    let row = conn
        .query_row(
            "SELECT status, current_post, current_post_index, post_start_at
             FROM control WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((status, current_post, current_post_index, post_start_at)) = row else {
        conn.execute("INSERT INTO control (id) VALUES (1)", [])?;
        return Ok(SessionControl {
            status: SessionStatus::NotStarted,
            current_post: None,
            current_post_index: 0,
            post_start_at: None,
        });
    };

    let status = SessionStatus::parse(&status)
        .ok_or_else(|| AppError::Storage(format!("unknown session status: {status}")))?;
    let post_start_at = match post_start_at {
        Some(raw) => Some(parse_ts(&raw)?),
        None => None,
    };

    Ok(SessionControl {
        status,
        current_post,
        current_post_index,
        post_start_at,
    })
}

pub(crate) fn write_control(
    conn: &Connection,
    control: &SessionControl,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO control (id, status, current_post, current_post_index, post_start_at)
         VALUES (1, ?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             status = excluded.status,
             current_post = excluded.current_post,
             current_post_index = excluded.current_post_index,
             post_start_at = excluded.post_start_at",
        params![
            control.status.as_str(),
            control.current_post,
            control.current_post_index,
            control.post_start_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Storage(format!("bad timestamp {raw:?}: {e}")))
}
