//! Persistent entities and their JSON projections.
//!
//! Field names follow the frontend contract (camelCase). Password hashes
//! never appear on any serialized shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed post set, in session order. Seeded once and restorable, never
/// extended at runtime.
pub const FIXED_POSTS: [(&str, i64); 8] = [
    ("President", 1),
    ("Vice President", 2),
    ("Secretary", 3),
    ("Joint Secretary", 4),
    ("Treasurer", 5),
    ("Event Organizer", 6),
    ("Sports Coordinator", 7),
    ("Media Coordinator", 8),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Ended,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(SessionStatus::NotStarted),
            "in_progress" => Some(SessionStatus::InProgress),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub name: String,
    pub order: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub register_no: String,
    pub name: String,
    pub department: String,
    pub year: String,
    pub has_voted_all: bool,
}

/// Internal row shape, hash included. Stays out of responses.
#[derive(Clone, Debug)]
pub struct StudentRecord {
    pub student: Student,
    pub password_hash: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: i64,
    pub name: String,
    pub post: String,
    pub department: String,
    pub year: String,
    pub manifesto: String,
    pub photo_url: String,
    pub votes: i64,
}

/// Candidate as shown to voters: no tally before announcement.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCandidate {
    pub id: i64,
    pub name: String,
    pub post: String,
    pub department: String,
    pub year: String,
    pub manifesto: String,
    pub photo_url: String,
}

impl From<Candidate> for PublicCandidate {
    fn from(c: Candidate) -> Self {
        PublicCandidate {
            id: c.id,
            name: c.name,
            post: c.post,
            department: c.department,
            year: c.year,
            manifesto: c.manifesto,
            photo_url: c.photo_url,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdminRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionControl {
    pub status: SessionStatus,
    pub current_post: Option<String>,
    pub current_post_index: i64,
    pub post_start_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTally {
    pub candidate_id: i64,
    pub name: String,
    pub votes: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResult {
    pub post: String,
    pub winner_id: i64,
    pub winner_name: String,
    pub total_votes_per_candidate: Vec<CandidateTally>,
    pub announced_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeSeat {
    pub post: String,
    pub candidate_id: i64,
    pub name: String,
    pub dept: String,
    pub year: String,
    pub announced_at: DateTime<Utc>,
    /// Joined from the candidate row; absent when the candidate was deleted
    /// after announcement.
    pub photo_url: Option<String>,
}
