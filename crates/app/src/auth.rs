use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::Hmac;
use metrics::counter;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use payboard_core::{Credentials, CredentialsError, RawForm};
use payboard_storage::{NewOperator, OperatorError, OperatorRepository, StorageError};

use crate::session::{IssuedSession, SessionError, SessionManager};

const SALT_LEN: usize = 16;

/// Classified sign-in failures. Anything else is unclassified and propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Unknown email, wrong password or malformed credentials.
    CredentialsSignin,
    /// The credential store could not be consulted.
    CallbackRouteError,
}

impl AuthErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CredentialsSignin => "credentials_signin",
            Self::CallbackRouteError => "callback_route_error",
        }
    }

    /// Message shown on the login form.
    pub fn message(self) -> &'static str {
        match self {
            Self::CredentialsSignin => "Invalid credentials.",
            Self::CallbackRouteError => "Something went wrong.",
        }
    }
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("sign-in rejected: {}", .0.as_str())]
    Auth(AuthErrorKind),
    #[error("stored credential is unusable: {0}")]
    CorruptCredential(#[from] PasswordError),
    #[error("failed to issue session: {0}")]
    Session(#[from] SessionError),
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to initialize password hasher")]
    Hasher,
    #[error("stored password digest is not valid hex")]
    Encoding(#[from] hex::FromHexError),
    #[error("stored password digest has an unsupported format")]
    Format,
}

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("credential store unavailable: {0}")]
    Unavailable(#[from] StorageError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Operator identity confirmed by a [`CredentialVerifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedOperator {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Checks submitted credentials against a credential store.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(None)` means the credentials did not match any operator.
    async fn verify(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<VerifiedOperator>, VerifierError>;
}

/// [`CredentialVerifier`] backed by the `operators` table.
pub struct OperatorDirectory {
    operators: OperatorRepository,
}

impl OperatorDirectory {
    pub fn new(operators: OperatorRepository) -> Self {
        Self { operators }
    }
}

#[async_trait]
impl CredentialVerifier for OperatorDirectory {
    async fn verify(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<VerifiedOperator>, VerifierError> {
        let Some(record) = self.operators.find_by_email(credentials.email()).await? else {
            return Ok(None);
        };

        let salt = hex::decode(&record.password_salt).map_err(PasswordError::from)?;
        if !verify_password(&salt, credentials.password(), &record.password_hash)? {
            return Ok(None);
        }

        Ok(Some(VerifiedOperator {
            id: record.id,
            name: record.name,
            email: record.email,
        }))
    }
}

/// Result of a login submission that did not fail unexpectedly.
#[derive(Debug)]
pub enum SignInOutcome {
    Authenticated(IssuedSession),
    Rejected(&'static str),
}

/// Exchanges login submissions for sessions.
#[derive(Clone)]
pub struct AuthenticationGate {
    verifier: Arc<dyn CredentialVerifier>,
    sessions: SessionManager,
}

impl AuthenticationGate {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, sessions: SessionManager) -> Self {
        Self { verifier, sessions }
    }

    /// Classified failures become the login form message; unclassified ones
    /// are returned as `Err` for the HTTP boundary to report.
    pub async fn sign_in(&self, form: &RawForm) -> Result<SignInOutcome, SignInError> {
        match self.authenticate(form).await {
            Ok(session) => {
                counter!("auth_attempts_total", "result" => "ok").increment(1);
                info!(
                    stage = "auth",
                    operator_id = %session.operator_id,
                    expires_at = %session.expires_at,
                    "operator signed in"
                );
                Ok(SignInOutcome::Authenticated(session))
            }
            Err(SignInError::Auth(kind)) => {
                counter!("auth_attempts_total", "result" => kind.as_str()).increment(1);
                warn!(stage = "auth", kind = kind.as_str(), "sign-in rejected");
                Ok(SignInOutcome::Rejected(kind.message()))
            }
            Err(err) => {
                counter!("auth_attempts_total", "result" => "error").increment(1);
                Err(err)
            }
        }
    }

    async fn authenticate(&self, form: &RawForm) -> Result<IssuedSession, SignInError> {
        let credentials = Credentials::from_form(form)
            .map_err(|_| SignInError::Auth(AuthErrorKind::CredentialsSignin))?;

        let operator = match self.verifier.verify(&credentials).await {
            Ok(Some(operator)) => operator,
            Ok(None) => return Err(SignInError::Auth(AuthErrorKind::CredentialsSignin)),
            Err(VerifierError::Unavailable(err)) => {
                error!(stage = "auth", error = %err, "credential store unavailable");
                return Err(SignInError::Auth(AuthErrorKind::CallbackRouteError));
            }
            Err(VerifierError::Password(err)) => return Err(SignInError::CorruptCredential(err)),
        };

        debug!(stage = "auth", name = %operator.name, email = %operator.email, "credentials verified");
        Ok(self.sessions.issue(&operator.id).await?)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}

const DIGEST_SCHEME: &str = "pbkdf2-sha256";
const DIGEST_LEN: usize = 32;

#[cfg(not(test))]
const PBKDF2_ROUNDS: u32 = 600_000;
#[cfg(test)]
const PBKDF2_ROUNDS: u32 = 1_000;

/// Salted PBKDF2-HMAC-SHA256 digest ready to be stored with an operator.
///
/// `hash` is encoded as `pbkdf2-sha256$<rounds>$<hex>` so the iteration
/// count travels with the digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    pub salt_hex: String,
    pub hash: String,
}

impl PasswordDigest {
    pub fn derive(password: &str) -> Result<Self, PasswordError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let hash = hash_password(&salt, password, PBKDF2_ROUNDS)?;
        Ok(Self {
            salt_hex: hex::encode(salt),
            hash: format!("{DIGEST_SCHEME}${PBKDF2_ROUNDS}${}", hex::encode(hash)),
        })
    }
}

fn hash_password(salt: &[u8], password: &str, rounds: u32) -> Result<Vec<u8>, PasswordError> {
    let mut out = vec![0u8; DIGEST_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, rounds, &mut out)
        .map_err(|_| PasswordError::Hasher)?;
    Ok(out)
}

fn verify_password(salt: &[u8], password: &str, stored: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    let (Some(DIGEST_SCHEME), Some(rounds), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PasswordError::Format);
    };
    let rounds: u32 = rounds.parse().map_err(|_| PasswordError::Format)?;
    if rounds == 0 {
        return Err(PasswordError::Format);
    }
    let expected = hex::decode(hash)?;
    let actual = hash_password(salt, password, rounds)?;
    Ok(actual.as_slice().ct_eq(&expected).into())
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("bootstrap credentials are invalid: {0}")]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("failed to store operator: {0}")]
    Operator(OperatorError),
}

/// Creates an operator unless one with the same email exists.
/// Returns `true` when a new row was written.
pub async fn seed_operator(
    operators: &OperatorRepository,
    name: &str,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<bool, SeedError> {
    let credentials = Credentials::try_from_parts(email, password)?;
    let digest = PasswordDigest::derive(credentials.password())?;
    let id = Uuid::new_v4().to_string();

    match operators
        .insert(&NewOperator {
            id: &id,
            name,
            email: credentials.email(),
            password_salt: &digest.salt_hex,
            password_hash: &digest.hash,
            created_at: now,
        })
        .await
    {
        Ok(()) => Ok(true),
        Err(OperatorError::DuplicateEmail) => Ok(false),
        Err(err) => Err(SeedError::Operator(err)),
    }
}
