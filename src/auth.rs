// src/auth.rs
use crate::error::AuthError;
use argon2::password_hash::{
    rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier,
    SaltString,
};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const SESSION_COOKIE: &str = "session";
const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: usize,
    exp: usize,
}

/// The authenticated caller of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub email: String,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|err| match err {
            PasswordHashError::Password => AuthError::InvalidCredentials,
            other => AuthError::Hash(other.to_string()),
        })
}

/// Signs and checks session cookies.
pub struct SessionKeys {
    secret: Vec<u8>,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: SESSION_TTL,
        }
    }

    pub fn issue(&self, email: &str) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| AuthError::Token("system clock is before UNIX_EPOCH".into()))?;
        let claims = Claims {
            sub: email.to_string(),
            iat: now.as_secs() as usize,
            exp: (now + self.ttl).as_secs() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AuthError::Token(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<SessionContext, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| SessionContext {
            email: data.claims.sub,
        })
        .map_err(|_| AuthError::Unauthorized)
    }

    pub fn max_age(&self) -> u64 {
        self.ttl.as_secs()
    }
}

/// Compares a presented trigger token with the configured one.
///
/// An unset secret rejects every caller.
pub fn check_trigger_token(configured: Option<&str>, presented: Option<&str>) -> Result<(), AuthError> {
    match (configured, presented) {
        (Some(expected), Some(given)) if !expected.is_empty() && constant_time_eq(expected, given) => {
            Ok(())
        }
        _ => Err(AuthError::Unauthorized),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2", &hash).is_ok());
        assert!(matches!(
            verify_password("hunter3", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn session_token_carries_email() {
        let keys = SessionKeys::new("test-secret");
        let token = keys.issue("a@example.com").unwrap();
        assert_eq!(keys.verify(&token).unwrap().email, "a@example.com");
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = SessionKeys::new("one").issue("a@example.com").unwrap();
        assert!(matches!(
            SessionKeys::new("two").verify(&token),
            Err(AuthError::Unauthorized)
        ));
        assert!(SessionKeys::new("one").verify("garbage").is_err());
    }

    #[test]
    fn trigger_token_must_match_configured_secret() {
        assert!(check_trigger_token(Some("s3cret"), Some("s3cret")).is_ok());
        assert!(check_trigger_token(Some("s3cret"), Some("s3creT")).is_err());
        assert!(check_trigger_token(Some("s3cret"), None).is_err());
        assert!(check_trigger_token(None, Some("anything")).is_err());
        assert!(check_trigger_token(Some(""), Some("")).is_err());
    }
}
