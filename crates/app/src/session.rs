use std::time::Duration;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use payboard_storage::{NewSession, SessionRepository, StorageError};

use crate::executor::Clock;

pub const SESSION_COOKIE: &str = "payboard_session";

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Operator id.
    pub sub: String,
    /// Session row id.
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Session handed to the operator after a successful sign-in.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: String,
    pub operator_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Session attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: String,
    pub operator_id: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("session token expired")]
    Expired,
    #[error("session revoked or unknown")]
    Revoked,
    #[error("session ttl is out of range")]
    TtlOutOfRange,
    #[error("session storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Issues, verifies and revokes operator sessions.
///
/// A session is a signed HS256 token naming a server-side row; the token alone
/// is never sufficient, the row must also be active.
#[derive(Clone)]
pub struct SessionManager {
    repo: SessionRepository,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    clock: Clock,
}

impl SessionManager {
    pub fn new(repo: SessionRepository, secret: &[u8], ttl: Duration, clock: Clock) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        Self {
            repo,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue(&self, operator_id: &str) -> Result<IssuedSession, SessionError> {
        let now = self.now();
        let ttl = ChronoDuration::from_std(self.ttl).map_err(|_| SessionError::TtlOutOfRange)?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(SessionError::TtlOutOfRange)?;
        let session_id = Uuid::new_v4().to_string();

        let claims = SessionClaims {
            sub: operator_id.to_string(),
            sid: session_id.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        self.repo
            .insert(&NewSession {
                id: &session_id,
                operator_id,
                created_at: now,
                expires_at,
            })
            .await?;

        Ok(IssuedSession {
            session_id,
            operator_id: operator_id.to_string(),
            token,
            expires_at,
        })
    }

    pub async fn verify(&self, token: &str) -> Result<ActiveSession, SessionError> {
        let claims = self.decode_claims(token)?;
        let now = self.now();
        if now.timestamp() >= claims.exp {
            return Err(SessionError::Expired);
        }

        let record = self
            .repo
            .find_active(&claims.sid, now)
            .await?
            .ok_or(SessionError::Revoked)?;
        if record.operator_id != claims.sub {
            return Err(SessionError::Revoked);
        }

        Ok(ActiveSession {
            session_id: record.id,
            operator_id: record.operator_id,
        })
    }

    /// Revokes the session named by `token`. Returns `false` if it was
    /// already revoked or never existed.
    pub async fn revoke(&self, token: &str) -> Result<bool, SessionError> {
        let claims = self.decode_claims(token)?;
        Ok(self.repo.revoke(&claims.sid, self.now()).await?)
    }

    fn decode_claims(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

/// `Set-Cookie` value carrying a freshly issued session token.
pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
        max_age.as_secs()
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn cleared_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Extracts the session token from the request cookies.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    };

    use axum::http::HeaderValue;
    use chrono::TimeZone;
    use payboard_storage::{Database, NewOperator};

    use super::*;

    async fn setup() -> (Database, Arc<AtomicI64>, SessionManager) {
        let db = Database::connect("sqlite::memory:").await.expect("connect");
        db.run_migrations().await.expect("migrations");
        db.operators()
            .insert(&NewOperator {
                id: "op-1",
                name: "User",
                email: "user@nextmail.com",
                password_salt: "00",
                password_hash: "00",
                created_at: Utc::now(),
            })
            .await
            .expect("operator");

        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap().timestamp();
        let offset = Arc::new(AtomicI64::new(0));
        let clock_offset = offset.clone();
        let clock: Clock = Arc::new(move || {
            Utc.timestamp_opt(start + clock_offset.load(Ordering::SeqCst), 0)
                .unwrap()
        });
        let manager = SessionManager::new(
            db.sessions(),
            b"session-secret",
            Duration::from_secs(3600),
            clock,
        );
        (db, offset, manager)
    }

    #[tokio::test]
    async fn issued_session_verifies_until_expiry() {
        let (_db, offset, manager) = setup().await;
        let issued = manager.issue("op-1").await.expect("issue");

        let active = manager.verify(&issued.token).await.expect("verify");
        assert_eq!(active.operator_id, "op-1");
        assert_eq!(active.session_id, issued.session_id);

        offset.store(3600, Ordering::SeqCst);
        assert!(matches!(
            manager.verify(&issued.token).await,
            Err(SessionError::Expired)
        ));
    }

    #[tokio::test]
    async fn revoked_session_is_rejected() {
        let (_db, _offset, manager) = setup().await;
        let issued = manager.issue("op-1").await.expect("issue");

        assert!(manager.revoke(&issued.token).await.expect("revoke"));
        assert!(!manager.revoke(&issued.token).await.expect("revoke again"));
        assert!(matches!(
            manager.verify(&issued.token).await,
            Err(SessionError::Revoked)
        ));
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let (db, _offset, manager) = setup().await;
        let issued = manager.issue("op-1").await.expect("issue");
        let other = SessionManager::new(
            db.sessions(),
            b"another-secret",
            Duration::from_secs(3600),
            Arc::new(Utc::now),
        );
        assert!(matches!(
            other.verify(&issued.token).await,
            Err(SessionError::Token(_))
        ));
    }

    #[test]
    fn cookie_round_trip() {
        let cookie = session_cookie("abc.def", Duration::from_secs(60), true);
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.ends_with("; Secure"));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; payboard_session=abc.def"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def"));

        headers.insert(header::COOKIE, HeaderValue::from_static("payboard_session="));
        assert!(token_from_headers(&headers).is_none());
    }
}
