use anyhow::Result;
use chrono::{DateTime, Utc};
use std::io::{Stdout, Write};

use super::TextOutput;
use crate::entity::{Category, NetworkConfig, TransactionRecord, TransactionStatus};
use crate::sync::LedgerSnapshot;
use crate::utils::{format_amount, shorten_address};

const AMOUNT_PLACES: u32 = 4;

/// Display label of a transaction status.
pub fn status_label(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Pending => "Pending",
        TransactionStatus::Confirmed => "Confirmed",
        TransactionStatus::Failed => "Failed",
    }
}

pub trait HistoryView: Send + Sync {
    fn display_history(&self, snapshot: &LedgerSnapshot, network: &NetworkConfig) -> Result<()>;
    fn display_annotated(&self, record: &TransactionRecord) -> Result<()>;
    fn display_migrated_notes(&self, migrated: usize) -> Result<()>;
}

pub struct TerminalHistoryView<W: Write + Send = Stdout> {
    output: TextOutput<W>,
}

impl TerminalHistoryView<Stdout> {
    pub fn stdout() -> Self {
        Self::new(TextOutput::stdout())
    }
}

impl<W: Write + Send> TerminalHistoryView<W> {
    pub fn new(output: TextOutput<W>) -> Self {
        Self { output }
    }

    pub fn into_output(self) -> TextOutput<W> {
        self.output
    }

    fn format_record(record: &TransactionRecord, owner: &str, network: &NetworkConfig) -> String {
        let date = DateTime::<Utc>::from_timestamp(record.timestamp as i64, 0)
            .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| record.timestamp.to_string());
        let (direction, counterparty) = if record.is_sent_by(owner) {
            ("Sent to", &record.to)
        } else {
            ("Received from", &record.from)
        };

        let mut text = format!(
            "{}  {} {}  {} {}  [{}]\n  {}",
            date,
            direction,
            shorten_address(counterparty),
            format_amount(record.value, network.decimals(), AMOUNT_PLACES),
            network.symbol(),
            status_label(record.status),
            record.id
        );
        text.push_str(&format!(
            "\n  Category: {}",
            Category::bucket_label(record.category.as_ref())
        ));
        if let Some(note) = &record.note {
            text.push_str(&format!("\n  Note: {}", note));
        }
        text
    }
}

impl<W: Write + Send> HistoryView for TerminalHistoryView<W> {
    fn display_history(&self, snapshot: &LedgerSnapshot, network: &NetworkConfig) -> Result<()> {
        let owner = match &snapshot.address {
            Some(owner) => owner,
            None => {
                return self
                    .output
                    .write_text("Please connect your wallet to view transaction history.")
            }
        };

        let mut text = format!("Transaction history for {}\n", owner);
        if let Some(error) = &snapshot.error {
            text.push_str(&format!("Error: {}\n", error));
        }
        if snapshot.transactions.is_empty() {
            text.push_str("No transactions found");
        } else {
            let lines: Vec<String> = snapshot
                .transactions
                .iter()
                .map(|record| Self::format_record(record, owner, network))
                .collect();
            text.push_str(&lines.join("\n\n"));
        }
        self.output.write_text(&text)
    }

    fn display_annotated(&self, record: &TransactionRecord) -> Result<()> {
        self.output.write_text(&format!(
            "Updated {}\n  Category: {}\n  Note: {}",
            record.id,
            Category::bucket_label(record.category.as_ref()),
            record.note.as_deref().unwrap_or("-")
        ))
    }

    fn display_migrated_notes(&self, migrated: usize) -> Result<()> {
        self.output
            .write_text(&format!("Migrated {} legacy notes", migrated))
    }
}
