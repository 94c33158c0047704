use serde::{Deserialize, Serialize};

use super::amount::{wei_string, Wei};

/// Connected wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletUser {
    pub address: String,
    #[serde(with = "wei_string")]
    pub balance: Wei,
    pub connected: bool,
    pub chain_id: String,
    pub network: String,
}
