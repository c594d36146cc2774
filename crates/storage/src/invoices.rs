use payboard_core::{Invoice, InvoiceStatus};
use sqlx::SqlitePool;

use crate::statement::Statement;
use crate::StorageError;

/// Values for a new `invoices` row.
#[derive(Debug, Clone)]
pub struct NewInvoice<'a> {
    pub id: &'a str,
    pub customer_id: &'a str,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
    pub date: &'a str,
}

/// Columns an update may change; `id` and `date` are fixed once created.
#[derive(Debug, Clone)]
pub struct InvoiceChanges<'a> {
    pub customer_id: &'a str,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
}

pub fn insert_statement(invoice: &NewInvoice<'_>) -> Statement {
    Statement::new(
        "INSERT INTO invoices (id, customer_id, amount, status, date) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(invoice.id)
    .bind(invoice.customer_id)
    .bind(invoice.amount_cents)
    .bind(invoice.status.as_str())
    .bind(invoice.date)
}

pub fn update_statement(id: &str, changes: &InvoiceChanges<'_>) -> Statement {
    Statement::new("UPDATE invoices SET customer_id = ?, amount = ?, status = ? WHERE id = ?")
        .bind(changes.customer_id)
        .bind(changes.amount_cents)
        .bind(changes.status.as_str())
        .bind(id)
}

pub fn delete_statement(id: &str) -> Statement {
    Statement::new("DELETE FROM invoices WHERE id = ?").bind(id)
}

/// Read access to invoices by id.
#[derive(Clone)]
pub struct InvoiceRepository {
    pub(crate) pool: SqlitePool,
}

impl InvoiceRepository {
    pub async fn find(&self, id: &str) -> Result<Option<Invoice>, StorageError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "SELECT id, customer_id, amount, status, date FROM invoices WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(InvoiceRow::into_domain).transpose()
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    customer_id: String,
    amount: i64,
    status: String,
    date: String,
}

impl InvoiceRow {
    fn into_domain(self) -> Result<Invoice, StorageError> {
        let status = self
            .status
            .parse::<InvoiceStatus>()
            .map_err(|_| StorageError::Decode(format!("unknown invoice status '{}'", self.status)))?;
        Ok(Invoice {
            id: self.id,
            customer_id: self.customer_id,
            amount_cents: self.amount,
            status,
            date: self.date,
        })
    }
}
