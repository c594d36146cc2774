//! Presentation state for a form view.
//!
//! The view only tracks whether a submission is outstanding and what the last
//! response said. Validation and persistence stay on the server pipeline; the
//! presenter never keeps a copy of the field values.

use thiserror::Error;

use crate::form::{Entity, FieldErrors, FormState, Operation};

/// Outcome of a submission as reported back to the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    /// The server navigated to a listing route.
    Navigated(String),
    /// The mutation succeeded without navigation (delete).
    Completed,
    /// The server answered with a form state to render.
    Rejected(FormState),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PresenterState {
    #[default]
    Idle,
    Submitting,
    Succeeded {
        route: Option<String>,
    },
    FieldErrors(FormState),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PresenterError {
    #[error("a submission is already in progress")]
    AlreadySubmitting,
    #[error("no submission is in progress")]
    NotSubmitting,
}

/// Generic banner shown when a submission fails for an unexpected reason.
pub fn unexpected_error_message(entity: Entity, operation: Operation) -> String {
    let gerund = match operation {
        Operation::Create => "creating",
        Operation::Update => "updating",
        Operation::Delete => "deleting",
    };
    format!("An error occurred while {gerund} the {}.", entity.as_str())
}

#[derive(Debug, Clone)]
pub struct FormPresenter {
    entity: Entity,
    operation: Operation,
    state: PresenterState,
}

impl FormPresenter {
    pub fn new(entity: Entity, operation: Operation) -> Self {
        Self {
            entity,
            operation,
            state: PresenterState::Idle,
        }
    }

    pub fn state(&self) -> &PresenterState {
        &self.state
    }

    /// `true` while a submission is outstanding; the view disables its submit button.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, PresenterState::Submitting)
    }

    /// Starts a submission and clears the previous errors.
    pub fn begin_submit(&mut self) -> Result<(), PresenterError> {
        if self.is_pending() {
            return Err(PresenterError::AlreadySubmitting);
        }
        self.state = PresenterState::Submitting;
        Ok(())
    }

    pub fn complete(&mut self, result: SubmissionResult) -> Result<(), PresenterError> {
        if !self.is_pending() {
            return Err(PresenterError::NotSubmitting);
        }
        self.state = match result {
            SubmissionResult::Navigated(route) => PresenterState::Succeeded { route: Some(route) },
            SubmissionResult::Completed => PresenterState::Succeeded { route: None },
            SubmissionResult::Rejected(state) if state.has_field_errors() => {
                PresenterState::FieldErrors(state)
            }
            SubmissionResult::Rejected(state) => PresenterState::Failed(
                state
                    .message
                    .unwrap_or_else(|| unexpected_error_message(self.entity, self.operation)),
            ),
        };
        Ok(())
    }

    /// Records a failure that produced no form state, such as a dropped connection.
    pub fn fail(&mut self) -> Result<(), PresenterError> {
        if !self.is_pending() {
            return Err(PresenterError::NotSubmitting);
        }
        self.state = PresenterState::Failed(unexpected_error_message(self.entity, self.operation));
        Ok(())
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match &self.state {
            PresenterState::FieldErrors(state) => Some(&state.errors),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.state {
            PresenterState::FieldErrors(state) => state.message.as_deref(),
            PresenterState::Failed(message) => Some(message),
            _ => None,
        }
    }
}
