use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

/// Chain parameters in the shape wallets expect for `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl NetworkConfig {
    /// Shardeum testnet, chain 8083.
    pub fn shardeum() -> Self {
        Self {
            chain_id: "0x1F93".to_string(),
            chain_name: "Shardeum Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "Shardeum".to_string(),
                symbol: "SHM".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://api-testnet.shardeum.org".to_string()],
            block_explorer_urls: vec!["https://explorer-testnet.shardeum.org/".to_string()],
        }
    }

    pub fn symbol(&self) -> &str {
        &self.native_currency.symbol
    }

    pub fn decimals(&self) -> u32 {
        self.native_currency.decimals
    }

    /// Compares chain ids numerically, so `0x1F93` matches `0x1f93`.
    pub fn is_chain(&self, chain_id: &str) -> bool {
        match (parse_chain_id(&self.chain_id), parse_chain_id(chain_id)) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => self.chain_id.eq_ignore_ascii_case(chain_id),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::shardeum()
    }
}

fn parse_chain_id(chain_id: &str) -> Option<u64> {
    let chain_id = chain_id.trim();
    match chain_id
        .strip_prefix("0x")
        .or_else(|| chain_id.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => chain_id.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_comparison() {
        let network = NetworkConfig::shardeum();
        assert!(network.is_chain("0x1f93"));
        assert!(network.is_chain("8083"));
        assert!(!network.is_chain("0x1"));
    }

    #[test]
    fn test_add_chain_payload_uses_camel_case() {
        let value = serde_json::to_value(NetworkConfig::shardeum()).unwrap();
        assert_eq!(value["chainId"], "0x1F93");
        assert_eq!(value["nativeCurrency"]["decimals"], 18);
        assert!(value["blockExplorerUrls"].is_array());
    }
}
