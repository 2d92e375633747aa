use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{csv_entry::CsvEntry, wallet::WalletAddress};

/// One redeemable POAP claim slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintLink {
    /// Short code of the link, unique within its pool
    pub id: String,
    /// Redemption url handed to the claimant
    pub url: String,
    /// Whether the link has been handed out
    pub claimed: bool,
    /// Wallet the link was handed to
    pub claimed_by: Option<WalletAddress>,
    /// When the link was handed out
    pub claimed_at: Option<DateTime<Utc>>,
}

impl MintLink {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            claimed: false,
            claimed_by: None,
            claimed_at: None,
        }
    }

    pub fn is_claimed_by(&self, wallet: &WalletAddress) -> bool {
        self.claimed_by.as_ref() == Some(wallet)
    }

    /// `claimed`, `claimed_by` and `claimed_at` are either all set or all unset.
    pub fn is_consistent(&self) -> bool {
        self.claimed == self.claimed_by.is_some() && self.claimed == self.claimed_at.is_some()
    }

    pub(crate) fn mark_claimed(&mut self, wallet: &WalletAddress, at: DateTime<Utc>) {
        self.claimed = true;
        self.claimed_by = Some(wallet.clone());
        self.claimed_at = Some(at);
    }
}

impl From<CsvEntry> for MintLink {
    fn from(entry: CsvEntry) -> Self {
        Self::new(entry.id, entry.url)
    }
}
