use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::MintPoolError;

/// Number of hex digits after the `0x` prefix.
pub const ADDRESS_HEX_LEN: usize = 40;

/// An EVM wallet address, always held in lower-case form.
///
/// Every comparison the pool makes (allow-list membership, assigned link lookup,
/// claim) goes through this type, so two spellings of the same address that only
/// differ in checksum casing are the same wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WalletAddress {
    type Err = MintPoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .ok_or_else(|| MintPoolError::InvalidWalletAddress(s.to_string()))?;

        if hex.len() != ADDRESS_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(MintPoolError::InvalidWalletAddress(s.to_string()));
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = MintPoolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletAddress> for String {
    fn from(wallet: WalletAddress) -> Self {
        wallet.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
