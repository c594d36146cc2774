use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::form::RawForm;
use crate::schema::{Check, FieldSpec, Schema, ValidationFailure};

pub const CUSTOMER_MESSAGE: &str = "Please select a customer.";
pub const AMOUNT_MESSAGE: &str = "Please enter an amount greater than $0.";
pub const STATUS_MESSAGE: &str = "Please select an invoice status.";

const CUSTOMER_ID: FieldSpec = FieldSpec {
    name: "customerId",
    missing: CUSTOMER_MESSAGE,
    checks: &[(Check::NonEmpty, CUSTOMER_MESSAGE)],
};

/// Positive monetary amount stored as whole cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount {
    cents: i64,
}

impl Amount {
    pub fn from_cents(cents: i64) -> Option<Self> {
        (cents > 0).then_some(Self { cents })
    }

    /// Parses a decimal string such as `"19.99"` or `"1.5e1"` into cents.
    ///
    /// Digits past the second decimal place are truncated. The arithmetic is
    /// exact, so `"19.99"` is always 1999 cents. Accepts an optional leading
    /// `+`, an optional `e`/`E` exponent and surrounding whitespace; rejects
    /// negative values and values that round down to zero cents.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(at) => (&unsigned[..at], parse_exponent(&unsigned[at + 1..])?),
            None => (unsigned, 0),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));

        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        // The value is `digits * 10^scale` cents.
        let digits = format!("{whole}{fraction}");
        let scale = exponent
            .checked_add(2)?
            .checked_sub(i64::try_from(fraction.len()).ok()?)?;
        let kept = if scale < 0 {
            let dropped = usize::try_from(scale.unsigned_abs()).unwrap_or(usize::MAX);
            &digits[..digits.len().saturating_sub(dropped)]
        } else {
            digits.as_str()
        };

        let mut cents: i64 = 0;
        for digit in kept.bytes() {
            cents = cents.checked_mul(10)?.checked_add(i64::from(digit - b'0'))?;
        }
        if cents == 0 {
            return None;
        }
        for _ in 0..scale.max(0) {
            cents = cents.checked_mul(10)?;
        }

        Self::from_cents(cents)
    }

    pub fn cents(self) -> i64 {
        self.cents
    }
}

fn parse_exponent(raw: &str) -> Option<i64> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

/// Payment state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            _ => Err(UnknownStatus),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownStatus;

/// Validated invoice fields shared by the create and update forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub customer_id: String,
    pub amount: Amount,
    pub status: InvoiceStatus,
}

impl InvoiceDraft {
    /// Validates `customerId`, `amount` and `status`. A submitted `date` is
    /// ignored: the server decides the date on create and keeps it on update.
    pub fn parse(form: &RawForm) -> Result<Self, ValidationFailure> {
        let mut schema = Schema::new(form);
        let customer_id = schema.text(&CUSTOMER_ID);
        let amount = schema.coerce("amount", AMOUNT_MESSAGE, |raw| {
            Amount::parse(raw.unwrap_or_default())
        });
        let status = schema.choice::<InvoiceStatus>("status", STATUS_MESSAGE);

        let draft = match (customer_id, amount, status) {
            (Some(customer_id), Some(amount), Some(status)) => Some(Self {
                customer_id,
                amount,
                status,
            }),
            _ => None,
        };
        schema.finish(draft)
    }
}

/// Persisted invoice row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
    pub date: String,
}
