use payboard_core::Customer;
use sqlx::SqlitePool;

use crate::statement::Statement;
use crate::StorageError;

/// Values for a new `customers` row.
#[derive(Debug, Clone)]
pub struct NewCustomer<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub image_url: &'a str,
}

pub fn insert_statement(customer: &NewCustomer<'_>) -> Statement {
    Statement::new("INSERT INTO customers (id, name, email, image_url) VALUES (?, ?, ?, ?)")
        .bind(customer.id)
        .bind(customer.name)
        .bind(customer.email)
        .bind(customer.image_url)
}

/// Read access to customers by id.
#[derive(Clone)]
pub struct CustomerRepository {
    pub(crate) pool: SqlitePool,
}

impl CustomerRepository {
    pub async fn find(&self, id: &str) -> Result<Option<Customer>, StorageError> {
        let customer = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, email, image_url FROM customers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| Customer {
            id: row.id,
            name: row.name,
            email: row.email,
            image_url: row.image_url,
        });
        Ok(customer)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    email: String,
    image_url: String,
}
