use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::entity::{FeeEstimate, LedgerError};
use crate::provider::WalletService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeEstimateState {
    Idle,
    Pending,
    Ready(FeeEstimate),
    Failed(String),
}

/// Debounced fee estimation for the send form.
///
/// Every [`FeeEstimator::request`] restarts the timer, only input left
/// untouched for the whole debounce period reaches the wallet.
pub struct FeeEstimator {
    wallet: Arc<WalletService>,
    debounce: Duration,
    state: Arc<watch::Sender<FeeEstimateState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl FeeEstimator {
    pub fn new(wallet: Arc<WalletService>, debounce: Duration) -> Self {
        Self {
            wallet,
            debounce,
            state: Arc::new(watch::channel(FeeEstimateState::Idle).0),
            timer: Mutex::new(None),
        }
    }

    pub fn request(&self, to: &str, amount_text: &str) {
        let wallet = self.wallet.clone();
        let state = self.state.clone();
        let debounce = self.debounce;
        let to = to.to_string();
        let amount_text = amount_text.to_string();

        let mut timer = self.timer();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            sleep(debounce).await;

            state.send_replace(FeeEstimateState::Pending);
            let next = match wallet.estimate_fee(&to, &amount_text).await {
                Ok(estimate) => FeeEstimateState::Ready(estimate),
                Err(LedgerError::Validation(reason)) => {
                    debug!("Skipping fee estimate: {}", reason);
                    FeeEstimateState::Idle
                }
                Err(e) => {
                    warn!("Gas estimation error: {}", e);
                    FeeEstimateState::Failed(e.to_string())
                }
            };
            state.send_replace(next);
        }));
    }

    /// Drops any scheduled estimate and clears the current one.
    pub fn cancel(&self) {
        if let Some(previous) = self.timer().take() {
            previous.abort();
        }
        self.state.send_replace(FeeEstimateState::Idle);
    }

    pub fn state(&self) -> FeeEstimateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeeEstimateState> {
        self.state.subscribe()
    }

    fn timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for FeeEstimator {
    fn drop(&mut self) {
        if let Some(timer) = self.timer().take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{NetworkConfig, Wei};
    use crate::provider::SimulatedProvider;

    const ALICE: &str = "0xAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAa";
    const BOB: &str = "0xBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBb";
    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn estimator() -> (Arc<SimulatedProvider>, FeeEstimator) {
        let provider = Arc::new(
            SimulatedProvider::new()
                .with_account(ALICE, Wei::exp10(18))
                .with_gas(Wei::from(21_000u64), Wei::from(3u64))
                .authorized(),
        );
        let wallet = Arc::new(WalletService::new(provider.clone(), NetworkConfig::shardeum()));
        (provider, FeeEstimator::new(wallet, DEBOUNCE))
    }

    /// Waits for the next estimate to finish.
    async fn settle(estimator: &FeeEstimator) -> FeeEstimateState {
        let mut states = estimator.subscribe();
        loop {
            states.changed().await.unwrap();
            let state = states.borrow_and_update().clone();
            if state != FeeEstimateState::Pending && state != FeeEstimateState::Idle {
                return state;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_input_is_estimated() {
        let (provider, estimator) = estimator();
        // Consumed by the first estimate that reaches the wallet
        provider.fail_next(LedgerError::Unknown("estimate reached wallet".to_string()));

        estimator.request(BOB, "0.1");
        sleep(Duration::from_millis(200)).await;
        estimator.request(BOB, "0.2");
        sleep(Duration::from_millis(499)).await;
        assert_eq!(estimator.state(), FeeEstimateState::Idle);

        assert_eq!(
            settle(&estimator).await,
            FeeEstimateState::Failed("estimate reached wallet".to_string())
        );

        estimator.request(BOB, "0.3");
        assert_eq!(
            settle(&estimator).await,
            FeeEstimateState::Ready(FeeEstimate::new(Wei::from(21_000u64), Wei::from(3u64)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_clears_estimate() {
        let (_provider, estimator) = estimator();
        estimator.request(BOB, "1");
        settle(&estimator).await;

        estimator.request("", "1");
        sleep(DEBOUNCE * 2).await;
        assert_eq!(estimator.state(), FeeEstimateState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (_provider, estimator) = estimator();
        estimator.request(BOB, "1");
        estimator.cancel();
        sleep(DEBOUNCE * 2).await;
        assert_eq!(estimator.state(), FeeEstimateState::Idle);
    }
}
