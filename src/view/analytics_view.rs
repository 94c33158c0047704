use anyhow::Result;
use std::io::{Stdout, Write};

use super::TextOutput;
use crate::analytics::{category_distribution, AnalyticsSummary};
use crate::entity::{NetworkConfig, Wei};
use crate::utils::format_amount;

const TOTAL_PLACES: u32 = 1;
const DETAIL_PLACES: u32 = 4;

pub trait AnalyticsView: Send + Sync {
    fn display_analytics(&self, summary: &AnalyticsSummary, network: &NetworkConfig) -> Result<()>;
    fn display_no_wallet(&self) -> Result<()>;
}

pub struct TerminalAnalyticsView<W: Write + Send = Stdout> {
    output: TextOutput<W>,
}

impl TerminalAnalyticsView<Stdout> {
    pub fn stdout() -> Self {
        Self::new(TextOutput::stdout())
    }
}

impl<W: Write + Send> TerminalAnalyticsView<W> {
    pub fn new(output: TextOutput<W>) -> Self {
        Self { output }
    }

    pub fn into_output(self) -> TextOutput<W> {
        self.output
    }

    // Share of `part` in `total` with one decimal, computed in integers
    fn percentage(part: Wei, total: Wei) -> String {
        if total.is_zero() {
            return "0.0".to_string();
        }
        let permille = part.saturating_mul(Wei::from(1000u64)) / total;
        let permille = permille.low_u64();
        format!("{}.{}", permille / 10, permille % 10)
    }
}

impl<W: Write + Send> AnalyticsView for TerminalAnalyticsView<W> {
    fn display_analytics(&self, summary: &AnalyticsSummary, network: &NetworkConfig) -> Result<()> {
        let decimals = network.decimals();
        let symbol = network.symbol();
        let mut text = format!(
            "Total Sent: {} {}\nTotal Received: {} {}\nTotal Transactions: {}\nGas Fees: {} {}",
            format_amount(summary.total_sent, decimals, TOTAL_PLACES),
            symbol,
            format_amount(summary.total_received, decimals, TOTAL_PLACES),
            symbol,
            summary.tx_count,
            format_amount(summary.total_gas_fees, decimals, DETAIL_PLACES),
            symbol
        );

        if summary.tx_count == 0 {
            text.push_str("\n\nNo transactions yet. Start making transactions to see analytics.");
            return self.output.write_text(&text);
        }

        text.push_str("\n\nCategory Breakdown");
        for (label, stats) in &summary.category_breakdown {
            text.push_str(&format!(
                "\n  {}: {} transactions, {} {} spent, {} {} gas",
                label,
                stats.count,
                format_amount(stats.value, decimals, DETAIL_PLACES),
                symbol,
                format_amount(stats.gas_fees, decimals, DETAIL_PLACES),
                symbol
            ));
        }

        let slices = category_distribution(summary);
        if !slices.is_empty() {
            let total = slices
                .iter()
                .fold(Wei::zero(), |acc, slice| acc.saturating_add(slice.value));
            text.push_str("\n\nSpending Distribution");
            for slice in &slices {
                text.push_str(&format!(
                    "\n  {}: {}%",
                    slice.label,
                    Self::percentage(slice.value, total)
                ));
            }
        }

        self.output.write_text(&text)
    }

    fn display_no_wallet(&self) -> Result<()> {
        self.output
            .write_text("Please connect your wallet to view analytics.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::aggregate;
    use crate::entity::{Category, TransactionRecord};

    fn render(summary: &AnalyticsSummary) -> String {
        let view = TerminalAnalyticsView::new(TextOutput::new(Vec::new()));
        view.display_analytics(summary, &NetworkConfig::shardeum())
            .unwrap();
        String::from_utf8(view.into_output().into_inner()).unwrap()
    }

    #[test]
    fn test_summary_and_distribution() {
        let three = Wei::exp10(18) * Wei::from(3u64);
        let mut rent = TransactionRecord::pending("0x1", "0xAA", "0xBB", three, 1);
        rent.category = Some(Category::Utilities);
        let games = TransactionRecord::pending("0x2", "0xAA", "0xCC", Wei::exp10(18), 2);
        let summary = aggregate(&[rent, games], "0xaa");

        let text = render(&summary);
        assert!(text.contains("Total Sent: 4.0 SHM"));
        assert!(text.contains("Total Transactions: 2"));
        assert!(text.contains("Utilities: 1 transactions, 3.0000 SHM spent"));
        assert!(text.contains("Utilities: 75.0%"));
        assert!(text.contains("Uncategorized: 25.0%"));
    }

    #[test]
    fn test_empty_summary() {
        let text = render(&AnalyticsSummary::default());
        assert!(text.contains("Total Sent: 0.0 SHM"));
        assert!(text.contains("No transactions yet"));
    }
}
