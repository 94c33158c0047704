//! Spending analytics over a ledger slice.
//!
//! Everything here is a pure function of the records and the owner address.
//! Amounts stay in wei, conversion to display units is left to the views.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::entity::{wei_string, Category, TransactionRecord, Wei};

pub const GAS_FEES_LABEL: &str = "Gas Fees";
pub const WALLET_LABEL: &str = "Wallet";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub count: usize,
    #[serde(with = "wei_string")]
    pub value: Wei,
    #[serde(with = "wei_string")]
    pub gas_fees: Wei,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    #[serde(with = "wei_string")]
    pub total_sent: Wei,
    #[serde(with = "wei_string")]
    pub total_received: Wei,
    #[serde(with = "wei_string")]
    pub total_gas_fees: Wei,
    pub tx_count: usize,
    pub category_breakdown: BTreeMap<String, CategoryStats>,
}

/// One slice of the spending pie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSlice {
    pub label: String,
    #[serde(with = "wei_string")]
    pub value: Wei,
}

/// One edge of the spending flow: wallet to category, category to gas fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowLink {
    pub source: String,
    pub target: String,
    #[serde(with = "wei_string")]
    pub value: Wei,
}

/// Totals and per-category breakdown of `transactions` from `owner`'s point of view.
///
/// A record is sent when its `from` is the owner, received otherwise. Every
/// record counts in its category bucket but only sent records add value and
/// gas fees to it.
pub fn aggregate(transactions: &[TransactionRecord], owner: &str) -> AnalyticsSummary {
    let mut summary = AnalyticsSummary::default();

    for tx in transactions {
        let label = Category::bucket_label(tx.category.as_ref()).to_string();
        let bucket = summary.category_breakdown.entry(label).or_default();
        bucket.count += 1;
        summary.tx_count += 1;

        if tx.is_sent_by(owner) {
            let gas_fees = tx.gas_fee().unwrap_or_default();
            summary.total_sent = summary.total_sent.saturating_add(tx.value);
            summary.total_gas_fees = summary.total_gas_fees.saturating_add(gas_fees);
            bucket.value = bucket.value.saturating_add(tx.value);
            bucket.gas_fees = bucket.gas_fees.saturating_add(gas_fees);
        } else {
            summary.total_received = summary.total_received.saturating_add(tx.value);
        }
    }

    summary
}

/// Pie slices of the sent value per category, plus a gas fee slice when any
/// fees were paid.
pub fn category_distribution(summary: &AnalyticsSummary) -> Vec<ChartSlice> {
    let mut slices: Vec<ChartSlice> = summary
        .category_breakdown
        .iter()
        .filter(|(_, stats)| !stats.value.is_zero())
        .map(|(label, stats)| ChartSlice {
            label: label.clone(),
            value: stats.value,
        })
        .collect();

    if !summary.total_gas_fees.is_zero() {
        slices.push(ChartSlice {
            label: GAS_FEES_LABEL.to_string(),
            value: summary.total_gas_fees,
        });
    }
    slices
}

pub fn category_flows(summary: &AnalyticsSummary) -> Vec<FlowLink> {
    let spending = summary
        .category_breakdown
        .iter()
        .filter(|(_, stats)| !stats.value.is_zero())
        .map(|(label, stats)| FlowLink {
            source: WALLET_LABEL.to_string(),
            target: label.clone(),
            value: stats.value,
        });
    let fees = summary
        .category_breakdown
        .iter()
        .filter(|(_, stats)| !stats.gas_fees.is_zero())
        .map(|(label, stats)| FlowLink {
            source: label.clone(),
            target: GAS_FEES_LABEL.to_string(),
            value: stats.gas_fees,
        });
    spending.chain(fees).collect()
}
