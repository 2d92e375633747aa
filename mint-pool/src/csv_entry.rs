use std::{fs::File, path::Path, result};

use serde::{Deserialize, Serialize};

use crate::{error::MintPoolError, wallet::WalletAddress};

pub type Result<T> = result::Result<T, MintPoolError>;

/// Represents a single mint link row in a seed CSV
#[derive(Debug, Clone, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct CsvEntry {
    /// Short code of the mint link
    pub id: String,
    /// Redemption url
    pub url: String,
}

impl CsvEntry {
    pub fn new_from_file(path: &Path) -> Result<Vec<Self>> {
        let file = File::open(path)?;
        let mut rdr = csv::Reader::from_reader(file);

        let mut entries = Vec::new();
        for result in rdr.deserialize() {
            let record: CsvEntry = result?;
            entries.push(record);
        }

        Ok(entries)
    }

    pub fn write_to_file(entries: &[Self], path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        for entry in entries {
            wtr.serialize(entry)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Represents a single row in an allow-list CSV
#[derive(Debug, Clone, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub wallet: String,
}

impl WalletEntry {
    /// Read wallets from a CSV with a `wallet` column. Any malformed address fails the whole file.
    pub fn new_from_file(path: &Path) -> Result<Vec<WalletAddress>> {
        let file = File::open(path)?;
        let mut rdr = csv::Reader::from_reader(file);

        let mut wallets = Vec::new();
        for result in rdr.deserialize() {
            let record: WalletEntry = result?;
            wallets.push(record.wallet.trim().parse::<WalletAddress>()?);
        }

        Ok(wallets)
    }
}
