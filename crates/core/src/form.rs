use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Untrusted form submission: field name to the raw submitted string.
///
/// Fields that were not submitted at all are absent, which the schema treats
/// differently from an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawForm {
    fields: HashMap<String, String>,
}

impl RawForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful in tests.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Stores a field value. A repeated key replaces the earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<HashMap<String, String>> for RawForm {
    fn from(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawForm {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut form = Self::new();
        for (name, value) in iter {
            form.insert(name, value);
        }
        form
    }
}

/// Record collections managed through the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Invoice,
    Customer,
}

impl Entity {
    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Customer => "customer",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::Customer => "Customer",
        }
    }

    /// Route of the listing view that shows this collection.
    pub fn listing_route(self) -> &'static str {
        match self {
            Self::Invoice => "/dashboard/invoices",
            Self::Customer => "/dashboard/customers",
        }
    }
}

/// Kind of mutation requested by a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

/// Top-level message attached to a submission that failed field validation.
pub fn missing_fields_message(entity: Entity, operation: Operation) -> String {
    format!(
        "Missing Fields. Failed to {} {}.",
        operation.verb(),
        entity.title()
    )
}

/// Top-level message attached to a submission whose statement failed.
pub fn database_error_message(entity: Entity, operation: Operation) -> String {
    format!(
        "Database Error: Failed to {} {}.",
        operation.verb(),
        entity.title()
    )
}

/// Top-level message for an update or delete that matched no row.
pub fn not_found_message(entity: Entity, operation: Operation) -> String {
    format!(
        "{title} not found. Failed to {verb} {title}.",
        title = entity.title(),
        verb = operation.verb()
    )
}

/// Field name to the ordered validation messages raised for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Result of a single submission attempt, rendered next to the form inputs
/// and in the top-level banner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormState {
    #[serde(default, skip_serializing_if = "FieldErrors::is_empty")]
    pub errors: FieldErrors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FormState {
    /// Field errors plus the fixed "Missing Fields" banner.
    pub fn invalid(entity: Entity, operation: Operation, errors: FieldErrors) -> Self {
        Self {
            errors,
            message: Some(missing_fields_message(entity, operation)),
        }
    }

    /// A banner-only state with no field errors.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            errors: FieldErrors::new(),
            message: Some(message.into()),
        }
    }

    pub fn database_error(entity: Entity, operation: Operation) -> Self {
        Self::with_message(database_error_message(entity, operation))
    }

    pub fn not_found(entity: Entity, operation: Operation) -> Self {
        Self::with_message(not_found_message(entity, operation))
    }

    pub fn has_field_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
