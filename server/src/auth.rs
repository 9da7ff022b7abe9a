//! Credentials and bearer tokens.
//!
//! Passwords are stored as `salt$digest` with a per-record random salt.
//! Logins hand out opaque random tokens held in process memory with an
//! expiry; the process owning the session state is also the only token
//! authority, so nothing needs to be stateless.

use std::{collections::HashMap, sync::Mutex};

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{error::AppError, state::SharedState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Student,
}

#[derive(Clone, Debug)]
pub struct AuthSession {
    pub role: Role,
    pub subject_id: i64,
    pub register_no: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub struct Sessions {
    ttl: Duration,
    tokens: Mutex<HashMap<String, AuthSession>>,
}

impl Sessions {
    pub fn new(ttl_hours: i64) -> Self {
        Sessions {
            ttl: Duration::hours(ttl_hours),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self, role: Role, subject_id: i64, register_no: Option<String>) -> String {
        let token = new_token();
        let session = AuthSession {
            role,
            subject_id,
            register_no,
            expires_at: Utc::now() + self.ttl,
        };

        let mut tokens = self.tokens.lock().expect("session mutex poisoned");
        tokens.retain(|_, s| s.expires_at > Utc::now());
        tokens.insert(token.clone(), session);
        token
    }

    pub fn authenticate(&self, token: &str) -> Option<AuthSession> {
        let mut tokens = self.tokens.lock().expect("session mutex poisoned");
        match tokens.get(token) {
            Some(session) if session.expires_at > Utc::now() => Some(session.clone()),
            Some(_) => {
                tokens.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn revoke(&self, token: &str) {
        let mut tokens = self.tokens.lock().expect("session mutex poisoned");
        tokens.remove(token);
    }
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };

    let actual = digest(&salt, password);
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Admin bearer-token gate for handlers.
pub struct AdminAuth {
    pub admin_id: i64,
}

/// Student bearer-token gate for handlers.
pub struct StudentAuth {
    pub student_id: i64,
    pub register_no: String,
}

impl FromRequestParts<SharedState> for AdminAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let session = bearer_session(parts, state)?;
        if session.role != Role::Admin {
            return Err(AppError::Permission(
                "Admin permission required. Please login as admin.".to_string(),
            ));
        }
        Ok(AdminAuth {
            admin_id: session.subject_id,
        })
    }
}

impl FromRequestParts<SharedState> for StudentAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let session = bearer_session(parts, state)?;
        if session.role != Role::Student {
            return Err(AppError::Permission(
                "Student access required. Please login as student.".to_string(),
            ));
        }
        Ok(StudentAuth {
            student_id: session.subject_id,
            register_no: session.register_no.unwrap_or_default(),
        })
    }
}

fn bearer_session(parts: &Parts, state: &SharedState) -> Result<AuthSession, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| no_token())?;

    let token = header.strip_prefix("Bearer ").ok_or_else(no_token)?;

    state
        .sessions
        .authenticate(token)
        .ok_or_else(|| AppError::Auth("Invalid or expired token. Please login again.".to_string()))
}

fn no_token() -> AppError {
    AppError::Auth("No token provided. Please login again.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let stored = hash_password("hunter2");
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn test_distinct_salts() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn test_malformed_hash_rejected() {
        assert!(!verify_password("x", "no-dollar-sign"));
        assert!(!verify_password("x", "nothex$deadbeef"));
    }

    #[test]
    fn test_token_lifecycle() {
        let sessions = Sessions::new(1);
        let token = sessions.issue(Role::Student, 7, Some("21CS001".to_string()));

        let session = sessions.authenticate(&token).unwrap();
        assert_eq!(session.role, Role::Student);
        assert_eq!(session.subject_id, 7);

        sessions.revoke(&token);
        assert!(sessions.authenticate(&token).is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let sessions = Sessions::new(-1);
        let token = sessions.issue(Role::Admin, 1, None);
        assert!(sessions.authenticate(&token).is_none());
    }
}
