//! Declarative field rules and the accumulator that applies them.
//!
//! A schema reads every declared field from a [`RawForm`], records one message
//! per failing rule, and only yields a typed record when no field failed.

use std::str::FromStr;
use std::sync::LazyLock;

use regex_lite::Regex;
use thiserror::Error;

use crate::form::{Entity, FieldErrors, FormState, Operation, RawForm};

static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

static IMAGE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9_]+$").expect("image path pattern compiles"));

/// Rule applied to a string field that was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    NonEmpty,
    Email,
    ImagePath,
}

impl Check {
    pub fn accepts(self, value: &str) -> bool {
        match self {
            Self::NonEmpty => !value.is_empty(),
            Self::Email => is_email(value),
            Self::ImagePath => IMAGE_PATH.is_match(value),
        }
    }
}

/// Returns `true` when `value` is a syntactically valid email address.
///
/// The local part may not start with a dot and no two dots may be adjacent;
/// the domain needs at least one dot and an alphabetic top-level label.
pub fn is_email(value: &str) -> bool {
    !value.starts_with('.') && !value.contains("..") && EMAIL_ADDRESS.is_match(value)
}

/// Declaration of a string field: the message used when it is absent and the
/// checks (with their messages) applied when it is present.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub missing: &'static str,
    pub checks: &'static [(Check, &'static str)],
}

/// Collects field errors while a record is being parsed.
pub struct Schema<'f> {
    form: &'f RawForm,
    errors: FieldErrors,
}

impl<'f> Schema<'f> {
    pub fn new(form: &'f RawForm) -> Self {
        Self {
            form,
            errors: FieldErrors::new(),
        }
    }

    /// Applies a [`FieldSpec`]. Every failing check adds its own message.
    pub fn text(&mut self, spec: &FieldSpec) -> Option<String> {
        let Some(raw) = self.form.get(spec.name) else {
            self.errors.push(spec.name, spec.missing);
            return None;
        };

        let mut accepted = true;
        for (check, message) in spec.checks {
            if !check.accepts(raw) {
                self.errors.push(spec.name, *message);
                accepted = false;
            }
        }
        accepted.then(|| raw.to_string())
    }

    /// Converts the raw value with `coerce`; `None` from the coercion records `message`.
    pub fn coerce<T>(
        &mut self,
        name: &'static str,
        message: &'static str,
        coerce: impl FnOnce(Option<&str>) -> Option<T>,
    ) -> Option<T> {
        let value = coerce(self.form.get(name));
        if value.is_none() {
            self.errors.push(name, message);
        }
        value
    }

    /// Parses the raw value as one of the variants of `T`.
    pub fn choice<T: FromStr>(&mut self, name: &'static str, message: &'static str) -> Option<T> {
        self.coerce(name, message, |raw| raw.and_then(|value| value.parse().ok()))
    }

    /// Yields the record if no field failed, otherwise every collected error.
    pub fn finish<T>(self, record: Option<T>) -> Result<T, ValidationFailure> {
        match record {
            Some(record) if self.errors.is_empty() => Ok(record),
            _ => Err(ValidationFailure {
                field_errors: self.errors,
            }),
        }
    }
}

/// Field-scoped validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} field(s) failed validation", .field_errors.len())]
pub struct ValidationFailure {
    pub field_errors: FieldErrors,
}

impl ValidationFailure {
    pub fn into_form_state(self, entity: Entity, operation: Operation) -> FormState {
        FormState::invalid(entity, operation, self.field_errors)
    }
}
