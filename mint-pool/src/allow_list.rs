use std::{collections::HashSet, path::Path, result};

use crate::{csv_entry::WalletEntry, error::MintPoolError, wallet::WalletAddress};

pub type Result<T> = result::Result<T, MintPoolError>;

/// Wallets permitted to attempt a claim. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    wallets: HashSet<WalletAddress>,
}

impl AllowList {
    pub fn new(wallets: impl IntoIterator<Item = WalletAddress>) -> Self {
        Self {
            wallets: wallets.into_iter().collect(),
        }
    }

    pub fn new_from_csv(path: &Path) -> Result<Self> {
        Ok(Self::new(WalletEntry::new_from_file(path)?))
    }

    pub fn contains(&self, wallet: &WalletAddress) -> bool {
        self.wallets.contains(wallet)
    }

    /// Merge `wallets` into the list, returning how many were new
    pub fn extend(&mut self, wallets: impl IntoIterator<Item = WalletAddress>) -> usize {
        let before = self.wallets.len();
        self.wallets.extend(wallets);
        self.wallets.len() - before
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

impl FromIterator<WalletAddress> for AllowList {
    fn from_iter<I: IntoIterator<Item = WalletAddress>>(iter: I) -> Self {
        Self::new(iter)
    }
}
