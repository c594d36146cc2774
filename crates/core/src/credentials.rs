use std::fmt;

use thiserror::Error;

use crate::form::RawForm;
use crate::schema::is_email;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Why a login submission could not be turned into [`Credentials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialsError {
    #[error("email is missing or malformed")]
    InvalidEmail,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    ShortPassword,
}

/// Operator login credentials.
///
/// ## Invariants
/// - `email` is a syntactically valid address (surrounding whitespace removed).
/// - `password` has at least [`MIN_PASSWORD_LEN`] characters and is kept verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    pub fn try_from_parts(email: &str, password: &str) -> Result<Self, CredentialsError> {
        let email = email.trim();
        if !is_email(email) {
            return Err(CredentialsError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CredentialsError::ShortPassword);
        }
        Ok(Self {
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    /// Reads `email` and `password` from a login form.
    pub fn from_form(form: &RawForm) -> Result<Self, CredentialsError> {
        Self::try_from_parts(
            form.get("email").unwrap_or_default(),
            form.get("password").unwrap_or_default(),
        )
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_email_and_keeps_password() {
        let credentials =
            Credentials::try_from_parts("  user@nextmail.com ", " 123456 ").expect("valid");
        assert_eq!(credentials.email(), "user@nextmail.com");
        assert_eq!(credentials.password(), " 123456 ");
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            Credentials::try_from_parts("nope", "123456"),
            Err(CredentialsError::InvalidEmail)
        );
        assert_eq!(
            Credentials::try_from_parts("user@nextmail.com", "12345"),
            Err(CredentialsError::ShortPassword)
        );
        assert_eq!(
            Credentials::from_form(&RawForm::new()),
            Err(CredentialsError::InvalidEmail)
        );
    }

    #[test]
    fn debug_output_hides_password() {
        let credentials = Credentials::try_from_parts("user@nextmail.com", "hunter22").expect("valid");
        assert!(!format!("{credentials:?}").contains("hunter22"));
    }
}
