use serde::{Deserialize, Serialize};

use super::amount::{wei_string, Wei};

/// Provider-reported cost prediction for a prospective transfer. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    #[serde(with = "wei_string")]
    pub gas_limit: Wei,
    #[serde(with = "wei_string")]
    pub gas_price: Wei,
    #[serde(with = "wei_string")]
    pub estimated_cost: Wei,
}

impl FeeEstimate {
    pub fn new(gas_limit: Wei, gas_price: Wei) -> Self {
        Self {
            gas_limit,
            gas_price,
            estimated_cost: gas_limit.saturating_mul(gas_price),
        }
    }
}
