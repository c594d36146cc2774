use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use payboard_core::{CustomerDraft, Entity, FormState, InvoiceDraft, Operation};
use payboard_storage::{
    customers, invoices, InvoiceChanges, NewCustomer, NewInvoice, Statement, StatementExecutor,
    StorageError,
};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A validated change requested by a form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateInvoice(InvoiceDraft),
    UpdateInvoice { id: String, draft: InvoiceDraft },
    DeleteInvoice { id: String },
    CreateCustomer(CustomerDraft),
}

impl Mutation {
    pub fn entity(&self) -> Entity {
        match self {
            Self::CreateInvoice(_) | Self::UpdateInvoice { .. } | Self::DeleteInvoice { .. } => {
                Entity::Invoice
            }
            Self::CreateCustomer(_) => Entity::Customer,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateInvoice(_) | Self::CreateCustomer(_) => Operation::Create,
            Self::UpdateInvoice { .. } => Operation::Update,
            Self::DeleteInvoice { .. } => Operation::Delete,
        }
    }
}

/// Record of a mutation that reached persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
    pub entity: Entity,
    pub operation: Operation,
    pub id: String,
    pub rows_affected: u64,
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("statement failed: {0}")]
    Storage(#[from] StorageError),
    #[error("no {} with id {id}", .entity.as_str())]
    NotFound { entity: Entity, id: String },
}

impl MutationError {
    /// Banner shown to the operator; storage details stay in the logs.
    pub fn form_state(&self, entity: Entity, operation: Operation) -> FormState {
        match self {
            Self::Storage(_) => FormState::database_error(entity, operation),
            Self::NotFound { .. } => FormState::not_found(entity, operation),
        }
    }
}

/// Turns a [`Mutation`] into exactly one parameterized statement and runs it.
#[derive(Clone)]
pub struct MutationExecutor {
    store: Arc<dyn StatementExecutor>,
    clock: Clock,
}

impl MutationExecutor {
    pub fn new(store: Arc<dyn StatementExecutor>, clock: Clock) -> Self {
        Self { store, clock }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub async fn execute(&self, mutation: &Mutation) -> Result<MutationReceipt, MutationError> {
        let entity = mutation.entity();
        let operation = mutation.operation();
        let (id, statement) = self.statement_for(mutation);

        let rows_affected = match self.store.execute(&statement).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(
                    stage = "executor",
                    entity = entity.as_str(),
                    operation = operation.as_str(),
                    %id,
                    error = %err,
                    "mutation statement failed"
                );
                return Err(MutationError::Storage(err));
            }
        };

        if rows_affected == 0 && operation != Operation::Create {
            return Err(MutationError::NotFound { entity, id });
        }

        Ok(MutationReceipt {
            entity,
            operation,
            id,
            rows_affected,
        })
    }

    fn statement_for(&self, mutation: &Mutation) -> (String, Statement) {
        match mutation {
            Mutation::CreateInvoice(draft) => {
                let id = Uuid::new_v4().to_string();
                let date = self.now().date_naive().format("%Y-%m-%d").to_string();
                let statement = invoices::insert_statement(&NewInvoice {
                    id: &id,
                    customer_id: &draft.customer_id,
                    amount_cents: draft.amount.cents(),
                    status: draft.status,
                    date: &date,
                });
                (id, statement)
            }
            Mutation::UpdateInvoice { id, draft } => {
                let statement = invoices::update_statement(
                    id,
                    &InvoiceChanges {
                        customer_id: &draft.customer_id,
                        amount_cents: draft.amount.cents(),
                        status: draft.status,
                    },
                );
                (id.clone(), statement)
            }
            Mutation::DeleteInvoice { id } => (id.clone(), invoices::delete_statement(id)),
            Mutation::CreateCustomer(draft) => {
                let id = Uuid::new_v4().to_string();
                let statement = customers::insert_statement(&NewCustomer {
                    id: &id,
                    name: &draft.name,
                    email: &draft.email,
                    image_url: &draft.image_url,
                });
                (id, statement)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use payboard_storage::{Statement, StatementExecutor, StorageError};

    /// Records every statement and answers with a fixed result.
    pub struct RecordingExecutor {
        rows: Option<u64>,
        pub statements: Mutex<Vec<Statement>>,
    }

    impl RecordingExecutor {
        pub fn affecting(rows: u64) -> Self {
            Self {
                rows: Some(rows),
                statements: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                rows: None,
                statements: Mutex::new(Vec::new()),
            }
        }

        pub fn recorded(&self) -> Vec<Statement> {
            self.statements.lock().expect("statements lock").clone()
        }
    }

    #[async_trait]
    impl StatementExecutor for RecordingExecutor {
        async fn execute(&self, statement: &Statement) -> Result<u64, StorageError> {
            self.statements
                .lock()
                .expect("statements lock")
                .push(statement.clone());
            self.rows
                .ok_or_else(|| StorageError::Database(sqlx::Error::PoolTimedOut))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingExecutor;
    use super::*;
    use chrono::TimeZone;
    use payboard_core::{Amount, InvoiceStatus};
    use payboard_storage::Param;

    fn fixed_clock() -> Clock {
        Arc::new(|| Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap())
    }

    fn draft() -> InvoiceDraft {
        InvoiceDraft {
            customer_id: "c1".into(),
            amount: Amount::parse("19.99").expect("amount"),
            status: InvoiceStatus::Pending,
        }
    }

    #[tokio::test]
    async fn create_invoice_binds_cents_and_server_date() {
        let store = Arc::new(RecordingExecutor::affecting(1));
        let executor = MutationExecutor::new(store.clone(), fixed_clock());

        let receipt = executor
            .execute(&Mutation::CreateInvoice(draft()))
            .await
            .expect("create succeeds");
        assert_eq!(receipt.entity, Entity::Invoice);
        assert_eq!(receipt.operation, Operation::Create);

        let statements = store.recorded();
        assert_eq!(statements.len(), 1);
        let params = statements[0].params();
        assert_eq!(params[0], Param::Text(receipt.id.clone()));
        assert_eq!(params[1], Param::Text("c1".into()));
        assert_eq!(params[2], Param::Integer(1999));
        assert_eq!(params[3], Param::Text("pending".into()));
        assert_eq!(params[4], Param::Text("2024-06-01".into()));
    }

    #[tokio::test]
    async fn update_matching_no_row_is_not_found() {
        let store = Arc::new(RecordingExecutor::affecting(0));
        let executor = MutationExecutor::new(store.clone(), fixed_clock());

        let err = executor
            .execute(&Mutation::UpdateInvoice {
                id: "missing".into(),
                draft: draft(),
            })
            .await
            .expect_err("no row updated");
        assert!(matches!(err, MutationError::NotFound { .. }));
        assert_eq!(
            err.form_state(Entity::Invoice, Operation::Update).message.as_deref(),
            Some("Invoice not found. Failed to Update Invoice.")
        );
        assert_eq!(store.recorded().len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_maps_to_database_error_banner() {
        let store = Arc::new(RecordingExecutor::failing());
        let executor = MutationExecutor::new(store, fixed_clock());

        let err = executor
            .execute(&Mutation::DeleteInvoice { id: "inv-1".into() })
            .await
            .expect_err("store fails");
        assert!(matches!(err, MutationError::Storage(_)));
        assert_eq!(
            err.form_state(Entity::Invoice, Operation::Delete).message.as_deref(),
            Some("Database Error: Failed to Delete Invoice.")
        );
    }

    #[tokio::test]
    async fn create_customer_generates_distinct_ids() {
        let store = Arc::new(RecordingExecutor::affecting(1));
        let executor = MutationExecutor::new(store.clone(), fixed_clock());
        let mutation = Mutation::CreateCustomer(CustomerDraft {
            name: "Evil Rabbit".into(),
            email: "evil@rabbit.com".into(),
            image_url: "/evil_rabbit".into(),
        });

        let first = executor.execute(&mutation).await.expect("first");
        let second = executor.execute(&mutation).await.expect("second");
        assert_ne!(first.id, second.id);
        assert_eq!(first.entity, Entity::Customer);
    }
}
