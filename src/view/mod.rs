use anyhow::{anyhow, Result};
use std::io::{Stdout, Write};
use std::sync::Mutex;

pub mod analytics_view;
pub mod history_view;
pub mod wallet_view;

pub use analytics_view::{AnalyticsView, TerminalAnalyticsView};
pub use history_view::{status_label, HistoryView, TerminalHistoryView};
pub use wallet_view::{TerminalWalletView, WalletView};

/// Plain text sink shared by the terminal views.
pub struct TextOutput<W: Write + Send = Stdout> {
    out: Mutex<W>,
}

impl TextOutput<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TextOutput<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write_text(&self, text: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("output lock poisoned"))?;
        writeln!(out, "{}", text)?;
        out.flush()?;
        Ok(())
    }
}
