use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::amount::{option_wei_string, wei_string, Wei};
use super::category::{optional_category, Category};
use crate::utils::same_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    // Older ledgers recorded freshly submitted transfers as "Sent"
    #[serde(alias = "Sent", alias = "sent")]
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Confirmed => write!(f, "confirmed"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Final state reported by the provider for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Confirmed,
    Failed,
}

impl From<ConfirmationStatus> for TransactionStatus {
    fn from(status: ConfirmationStatus) -> Self {
        match status {
            ConfirmationStatus::Confirmed => TransactionStatus::Confirmed,
            ConfirmationStatus::Failed => TransactionStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub status: ConfirmationStatus,
    pub gas_used: Option<Wei>,
    pub gas_price: Option<Wei>,
}

impl ConfirmationOutcome {
    pub fn confirmed() -> Self {
        Self {
            status: ConfirmationStatus::Confirmed,
            gas_used: None,
            gas_price: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: ConfirmationStatus::Failed,
            gas_used: None,
            gas_price: None,
        }
    }

    pub fn with_gas(mut self, gas_used: Wei, gas_price: Wei) -> Self {
        self.gas_used = Some(gas_used);
        self.gas_price = Some(gas_price);
        self
    }
}

/// A transfer accepted by the wallet: its hash and the account it was sent from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    pub from: String,
}

/// User supplied changes to a ledger entry.
///
/// `note: Some("")` clears the note, `category: Some(None)` clears the category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub note: Option<String>,
    pub category: Option<Option<Category>>,
}

impl Annotation {
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(Some(category));
        self
    }

    pub fn without_category(mut self) -> Self {
        self.category = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.note.is_none() && self.category.is_none()
    }
}

/// A single ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Transaction hash assigned by the provider.
    #[serde(rename = "hash")]
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(with = "wei_string")]
    pub value: Wei,
    /// Seconds since epoch at the time the transfer was recorded.
    pub timestamp: u64,
    pub status: TransactionStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_note"
    )]
    pub note: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_category"
    )]
    pub category: Option<Category>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_wei_string"
    )]
    pub gas_used: Option<Wei>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_wei_string"
    )]
    pub gas_price: Option<Wei>,
}

impl TransactionRecord {
    pub fn pending(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        value: Wei,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            value,
            timestamp,
            status: TransactionStatus::Pending,
            note: None,
            category: None,
            gas_used: None,
            gas_price: None,
        }
    }

    pub fn with_annotation(mut self, annotation: &Annotation) -> Self {
        self.annotate(annotation);
        self
    }

    pub fn involves(&self, address: &str) -> bool {
        same_address(&self.from, address) || same_address(&self.to, address)
    }

    pub fn is_sent_by(&self, owner: &str) -> bool {
        same_address(&self.from, owner)
    }

    /// `gas_used * gas_price` once both are known.
    pub fn gas_fee(&self) -> Option<Wei> {
        match (self.gas_used, self.gas_price) {
            (Some(used), Some(price)) => Some(used.saturating_mul(price)),
            _ => None,
        }
    }

    pub fn set_note(&mut self, note: &str) {
        self.note = if note.trim().is_empty() {
            None
        } else {
            Some(note.to_string())
        };
    }

    pub fn annotate(&mut self, annotation: &Annotation) {
        if let Some(note) = &annotation.note {
            self.set_note(note);
        }
        if let Some(category) = &annotation.category {
            self.category = category.clone();
        }
    }

    /// Moves a pending record to its final status.
    ///
    /// Returns false when nothing changed: the record already carries a final
    /// status, in which case the outcome is ignored.
    pub fn apply_outcome(&mut self, outcome: &ConfirmationOutcome) -> bool {
        if self.status.is_final() {
            return false;
        }
        self.status = outcome.status.into();
        if self.gas_used.is_none() {
            self.gas_used = outcome.gas_used;
        }
        if self.gas_price.is_none() {
            self.gas_price = outcome.gas_price;
        }
        true
    }
}

fn optional_note<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|note| !note.trim().is_empty()))
}
