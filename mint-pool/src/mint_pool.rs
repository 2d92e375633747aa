use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufReader, Write},
    path::Path,
    result,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    csv_entry::CsvEntry,
    error::{MintPoolError, MintPoolError::PoolValidationError},
    mint_link::MintLink,
    wallet::WalletAddress,
};

pub type Result<T> = result::Result<T, MintPoolError>;

/// Ordered, fixed-size collection of mint links for one campaign.
///
/// This is also the persisted record: it serializes as `{"mintLinks": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintPool {
    pub mint_links: Vec<MintLink>,
}

impl MintPool {
    pub fn new(mint_links: Vec<MintLink>) -> Result<Self> {
        let pool = MintPool { mint_links };
        pool.validate()?;
        Ok(pool)
    }

    /// Load an unclaimed pool from a csv path
    pub fn new_from_csv(path: &Path) -> Result<Self> {
        let csv_entries = CsvEntry::new_from_file(path)?;
        let mint_links: Vec<MintLink> = csv_entries.into_iter().map(MintLink::from).collect();
        Self::new(mint_links)
    }

    /// Load a serialized pool from file path
    pub fn new_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let pool: MintPool = serde_json::from_reader(reader)?;
        pool.validate()?;

        Ok(pool)
    }

    /// Write the pool to a filepath. The file is replaced in a single rename so a
    /// reader never observes a half-written pool. Each write stages its own temp
    /// file, concurrent writers never share one.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let serialized = serde_json::to_string_pretty(&self)?;
        let mut tmp_path = path.as_os_str().to_owned();
        tmp_path.push(format!(".{:016x}.tmp", rand::random::<u64>()));

        let staged = File::create(&tmp_path).and_then(|mut file| {
            file.write_all(serialized.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = staged.and_then(|_| fs::rename(&tmp_path, path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        Ok(())
    }

    pub fn total_count(&self) -> usize {
        self.mint_links.len()
    }

    pub fn available_count(&self) -> usize {
        self.mint_links.iter().filter(|link| !link.claimed).count()
    }

    pub fn assigned_link(&self, wallet: &WalletAddress) -> Option<&MintLink> {
        self.mint_links.iter().find(|link| link.is_claimed_by(wallet))
    }

    /// Index of the lowest-positioned unclaimed link
    pub fn first_unclaimed(&self) -> Option<usize> {
        self.mint_links.iter().position(|link| !link.claimed)
    }

    /// Same links in the same order, all unclaimed
    pub fn unclaimed(&self) -> Self {
        Self {
            mint_links: self
                .mint_links
                .iter()
                .map(|link| MintLink::new(link.id.clone(), link.url.clone()))
                .collect(),
        }
    }

    /// Returns a copy of the pool with the link at `index` handed to `wallet`.
    /// `self` is left untouched so callers can persist the result before adopting it.
    pub fn with_assignment(
        &self,
        index: usize,
        wallet: &WalletAddress,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        let link = self
            .mint_links
            .get(index)
            .ok_or_else(|| MintPoolError::LinkNotFound(format!("#{index}")))?;

        if link.claimed {
            return Err(MintPoolError::LinkAlreadyClaimed(link.id.clone()));
        }
        if let Some(held) = self.assigned_link(wallet) {
            return Err(MintPoolError::WalletAlreadyAssigned(
                wallet.clone(),
                held.id.clone(),
            ));
        }

        let mut next = self.clone();
        next.mint_links[index].mark_claimed(wallet, at);
        Ok(next)
    }

    fn validate(&self) -> Result<()> {
        if self.mint_links.is_empty() {
            return Err(PoolValidationError(
                "Mint pool must contain at least one link".to_string(),
            ));
        }

        // validate that there are no duplicate ids
        let unique_ids: HashSet<_> = self.mint_links.iter().map(|l| l.id.as_str()).collect();
        if unique_ids.len() != self.mint_links.len() {
            return Err(PoolValidationError("Duplicate link ids found".to_string()));
        }

        if let Some(link) = self.mint_links.iter().find(|l| !l.is_consistent()) {
            return Err(PoolValidationError(format!(
                "Link {} has inconsistent claim fields",
                link.id
            )));
        }

        // validate that no wallet holds two links
        let claimants: Vec<_> = self
            .mint_links
            .iter()
            .filter_map(|l| l.claimed_by.as_ref())
            .collect();
        let unique_claimants: HashSet<_> = claimants.iter().collect();
        if unique_claimants.len() != claimants.len() {
            return Err(PoolValidationError(
                "Duplicate claimants found".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::utils::default_seed_links;

    fn wallet(n: u8) -> WalletAddress {
        format!("0x{}", format!("{n:02x}").repeat(20)).parse().unwrap()
    }

    #[test]
    fn test_new_from_csv() {
        let pool = MintPool::new_from_csv(&PathBuf::from("./test_fixtures/mint_links.csv")).unwrap();
        assert_eq!(pool.total_count(), 3);
        assert_eq!(pool.available_count(), 3);
        assert_eq!(pool.first_unclaimed(), Some(0));
    }

    #[test]
    fn test_unclaimed_keeps_order() {
        let pool = MintPool::new(default_seed_links()).unwrap();
        let claimed = pool.with_assignment(2, &wallet(1), Utc::now()).unwrap();
        assert_eq!(claimed.available_count(), 8);

        let cleared = claimed.unclaimed();
        assert_eq!(cleared, pool);
    }

    #[test]
    fn test_reject_duplicate_ids() {
        let err = MintPool::new(vec![
            MintLink::new("nq1ez5", "https://poap.xyz/mint/nq1ez5"),
            MintLink::new("nq1ez5", "https://poap.xyz/mint/other"),
        ])
        .unwrap_err();
        assert!(matches!(err, PoolValidationError(_)));
    }

    #[test]
    fn test_reject_empty_pool() {
        assert!(matches!(
            MintPool::new(vec![]).unwrap_err(),
            PoolValidationError(_)
        ));
    }

    #[test]
    fn test_reject_duplicate_claimants() {
        let mut links = default_seed_links();
        links[0].mark_claimed(&wallet(1), Utc::now());
        links[3].mark_claimed(&wallet(1), Utc::now());

        assert!(matches!(
            MintPool::new(links).unwrap_err(),
            PoolValidationError(_)
        ));
    }

    #[test]
    fn test_reject_inconsistent_link() {
        let mut links = default_seed_links();
        links[2].claimed = true;

        assert!(matches!(
            MintPool::new(links).unwrap_err(),
            PoolValidationError(_)
        ));
    }

    #[test]
    fn test_with_assignment_leaves_original_untouched() {
        let pool = MintPool::new(default_seed_links()).unwrap();
        let next = pool.with_assignment(0, &wallet(7), Utc::now()).unwrap();

        assert_eq!(pool.available_count(), pool.total_count());
        assert_eq!(next.available_count(), next.total_count() - 1);
        assert_eq!(next.assigned_link(&wallet(7)).unwrap().id, "nq1ez5");
        assert_eq!(next.first_unclaimed(), Some(1));
    }

    #[test]
    fn test_with_assignment_refuses_double_allocation() {
        let pool = MintPool::new(default_seed_links())
            .unwrap()
            .with_assignment(0, &wallet(1), Utc::now())
            .unwrap();

        assert!(matches!(
            pool.with_assignment(0, &wallet(2), Utc::now()),
            Err(MintPoolError::LinkAlreadyClaimed(id)) if id == "nq1ez5"
        ));
        assert!(matches!(
            pool.with_assignment(1, &wallet(1), Utc::now()),
            Err(MintPoolError::WalletAlreadyAssigned(_, id)) if id == "nq1ez5"
        ));
        assert!(matches!(
            pool.with_assignment(99, &wallet(3), Utc::now()),
            Err(MintPoolError::LinkNotFound(_))
        ));
    }

    #[test]
    fn test_write_then_read_pool() {
        let pool = MintPool::new(default_seed_links())
            .unwrap()
            .with_assignment(0, &wallet(1), Utc::now())
            .unwrap()
            .with_assignment(1, &wallet(2), Utc::now())
            .unwrap();

        let path = std::env::temp_dir()
            .join(format!("mint_pool_{}", rand::random::<u64>()))
            .join("poap-storage.json");
        pool.write_to_file(&path).unwrap();

        let read = MintPool::new_from_file(&path).unwrap();
        assert_eq!(read, pool);

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
