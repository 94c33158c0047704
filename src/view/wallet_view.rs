use anyhow::Result;
use std::io::{Stdout, Write};

use super::TextOutput;
use crate::entity::{FeeEstimate, NetworkConfig, WalletUser, Wei};
use crate::utils::{format_amount, format_units};

const BALANCE_PLACES: u32 = 4;
const GWEI_DECIMALS: u32 = 9;

pub trait WalletView: Send + Sync {
    fn display_connected(&self, user: &WalletUser, network: &NetworkConfig) -> Result<()>;
    fn display_balance(&self, address: &str, balance: Wei, network: &NetworkConfig) -> Result<()>;
    fn display_fee_estimate(&self, estimate: &FeeEstimate, network: &NetworkConfig) -> Result<()>;
    fn display_sent(&self, id: &str) -> Result<()>;
    fn display_not_connected(&self) -> Result<()>;
    fn display_error(&self, error_message: &str) -> Result<()>;
}

pub struct TerminalWalletView<W: Write + Send = Stdout> {
    output: TextOutput<W>,
}

impl TerminalWalletView<Stdout> {
    pub fn stdout() -> Self {
        Self::new(TextOutput::stdout())
    }
}

impl<W: Write + Send> TerminalWalletView<W> {
    pub fn new(output: TextOutput<W>) -> Self {
        Self { output }
    }

    pub fn into_output(self) -> TextOutput<W> {
        self.output
    }

    fn format_balance(balance: Wei, network: &NetworkConfig) -> String {
        format!(
            "{} {}",
            format_amount(balance, network.decimals(), BALANCE_PLACES),
            network.symbol()
        )
    }
}

impl<W: Write + Send> WalletView for TerminalWalletView<W> {
    fn display_connected(&self, user: &WalletUser, network: &NetworkConfig) -> Result<()> {
        self.output.write_text(&format!(
            "Connected: {}\nNetwork: {} ({})\nBalance: {}",
            user.address,
            user.network,
            user.chain_id,
            Self::format_balance(user.balance, network)
        ))
    }

    fn display_balance(&self, address: &str, balance: Wei, network: &NetworkConfig) -> Result<()> {
        self.output.write_text(&format!(
            "{}: {}",
            address,
            Self::format_balance(balance, network)
        ))
    }

    fn display_fee_estimate(&self, estimate: &FeeEstimate, network: &NetworkConfig) -> Result<()> {
        self.output.write_text(&format!(
            "Gas limit: {}\nGas price: {} gwei\nEstimated cost: {} {}",
            estimate.gas_limit,
            format_units(estimate.gas_price, GWEI_DECIMALS),
            format_units(estimate.estimated_cost, network.decimals()),
            network.symbol()
        ))
    }

    fn display_sent(&self, id: &str) -> Result<()> {
        self.output
            .write_text(&format!("Transaction submitted: {}\nStatus: Pending", id))
    }

    fn display_not_connected(&self) -> Result<()> {
        self.output
            .write_text("Wallet not connected. Run `connect` first.")
    }

    fn display_error(&self, error_message: &str) -> Result<()> {
        self.output.write_text(&format!("Error: {}", error_message))
    }
}
