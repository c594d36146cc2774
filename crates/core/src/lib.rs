//! Domain layer of the dashboard: form input, declarative validation and the
//! records it produces. Nothing in this crate performs I/O.

pub mod credentials;
pub mod customer;
pub mod form;
pub mod invoice;
pub mod presentation;
pub mod schema;

pub use credentials::{Credentials, CredentialsError};
pub use customer::{Customer, CustomerDraft};
pub use form::{Entity, FieldErrors, FormState, Operation, RawForm};
pub use invoice::{Amount, Invoice, InvoiceDraft, InvoiceStatus};
pub use schema::ValidationFailure;
