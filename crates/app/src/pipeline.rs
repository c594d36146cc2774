//! Validated mutation pipeline: validate, execute one statement, then apply effects.
//!
//! Every stage short-circuits with a [`FormState`]; only a successful
//! execution reaches the effects coordinator.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use metrics::counter;
use tracing::{debug, info};

use payboard_core::{
    CustomerDraft, Entity, FormState, InvoiceDraft, Operation, RawForm, ValidationFailure,
};

use crate::effects::{Effect, EffectsCoordinator};
use crate::executor::{Mutation, MutationError, MutationExecutor};

/// Result of a form action as returned to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Navigate(&'static str),
    Completed,
    Rejected { status: StatusCode, state: FormState },
}

impl IntoResponse for ActionOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Navigate(route) => Redirect::to(route).into_response(),
            Self::Completed => StatusCode::NO_CONTENT.into_response(),
            Self::Rejected { status, state } => (status, Json(state)).into_response(),
        }
    }
}

#[derive(Clone)]
pub struct MutationPipeline {
    executor: MutationExecutor,
    effects: EffectsCoordinator,
}

impl MutationPipeline {
    pub fn new(executor: MutationExecutor, effects: EffectsCoordinator) -> Self {
        Self { executor, effects }
    }

    pub async fn create_invoice(&self, form: &RawForm) -> ActionOutcome {
        let parsed = InvoiceDraft::parse(form).map(Mutation::CreateInvoice);
        self.run(Entity::Invoice, Operation::Create, parsed).await
    }

    pub async fn update_invoice(&self, id: &str, form: &RawForm) -> ActionOutcome {
        let parsed = InvoiceDraft::parse(form).map(|draft| Mutation::UpdateInvoice {
            id: id.to_string(),
            draft,
        });
        self.run(Entity::Invoice, Operation::Update, parsed).await
    }

    pub async fn delete_invoice(&self, id: &str) -> ActionOutcome {
        let mutation = Mutation::DeleteInvoice { id: id.to_string() };
        self.run(Entity::Invoice, Operation::Delete, Ok(mutation))
            .await
    }

    pub async fn create_customer(&self, form: &RawForm) -> ActionOutcome {
        let parsed = CustomerDraft::parse(form).map(Mutation::CreateCustomer);
        self.run(Entity::Customer, Operation::Create, parsed).await
    }

    async fn run(
        &self,
        entity: Entity,
        operation: Operation,
        parsed: Result<Mutation, ValidationFailure>,
    ) -> ActionOutcome {
        let mutation = match parsed {
            Ok(mutation) => mutation,
            Err(failure) => {
                debug!(
                    stage = "validator",
                    entity = entity.as_str(),
                    operation = operation.as_str(),
                    fields = ?failure.field_errors.fields().collect::<Vec<_>>(),
                    "submission failed validation"
                );
                record(entity, operation, "invalid");
                return ActionOutcome::Rejected {
                    status: StatusCode::UNPROCESSABLE_ENTITY,
                    state: failure.into_form_state(entity, operation),
                };
            }
        };

        match self.executor.execute(&mutation).await {
            Ok(receipt) => {
                record(entity, operation, "ok");
                info!(
                    stage = "executor",
                    entity = entity.as_str(),
                    operation = operation.as_str(),
                    id = %receipt.id,
                    rows = receipt.rows_affected,
                    "mutation applied"
                );
                match self.effects.apply(&receipt) {
                    Effect::Navigate(route) => ActionOutcome::Navigate(route),
                    Effect::Stay => ActionOutcome::Completed,
                }
            }
            Err(err) => {
                let (status, outcome) = match &err {
                    MutationError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                    MutationError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "db_error"),
                };
                record(entity, operation, outcome);
                ActionOutcome::Rejected {
                    status,
                    state: err.form_state(entity, operation),
                }
            }
        }
    }
}

fn record(entity: Entity, operation: Operation, outcome: &'static str) {
    counter!(
        "form_submissions_total",
        "entity" => entity.as_str(),
        "operation" => operation.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
