use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::LedgerError;

/// Label used for transactions without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Expense category attached to a ledger entry.
///
/// Labels outside the fixed set can only come from previously stored data;
/// they are kept as [`Category::Custom`] instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    P2pTransfer,
    DefiTrading,
    NftPurchases,
    Gaming,
    Utilities,
    Transfer,
    Purchase,
    Sale,
    Fee,
    Exchange,
    Other,
    Custom(String),
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::P2pTransfer,
        Category::DefiTrading,
        Category::NftPurchases,
        Category::Gaming,
        Category::Utilities,
        Category::Transfer,
        Category::Purchase,
        Category::Sale,
        Category::Fee,
        Category::Exchange,
        Category::Other,
    ];

    pub fn label(&self) -> &str {
        match self {
            Category::P2pTransfer => "P2P Transfer",
            Category::DefiTrading => "DeFi Trading",
            Category::NftPurchases => "NFT Purchases",
            Category::Gaming => "Gaming",
            Category::Utilities => "Utilities",
            Category::Transfer => "Transfer",
            Category::Purchase => "Purchase",
            Category::Sale => "Sale",
            Category::Fee => "Fee",
            Category::Exchange => "Exchange",
            Category::Other => "Other",
            Category::Custom(label) => label,
        }
    }

    /// Lenient conversion used for stored data: empty means no category.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        Some(
            Self::known(label).unwrap_or_else(|| Category::Custom(label.to_string())),
        )
    }

    /// Label to group by in analytics, defaulting to [`UNCATEGORIZED`].
    pub fn bucket_label(category: Option<&Category>) -> &str {
        category.map(Category::label).unwrap_or(UNCATEGORIZED)
    }

    fn known(label: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|category| category.label().eq_ignore_ascii_case(label))
            .cloned()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Strict conversion for user input: only the fixed set is accepted.
impl FromStr for Category {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::known(s.trim()).ok_or_else(|| {
            let labels: Vec<&str> = Self::ALL.iter().map(Category::label).collect();
            LedgerError::validation(format!(
                "Unknown category '{}'. Expected one of: {}",
                s.trim(),
                labels.join(", ")
            ))
        })
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label).unwrap_or(Category::Custom(label)))
    }
}

/// Deserializes an optional category where legacy data stored `""` for none.
pub(crate) fn optional_category<'de, D>(deserializer: D) -> Result<Option<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .as_deref()
        .and_then(Category::from_label))
}
