use std::{
    result,
    sync::{Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    allow_list::AllowList, error::MintPoolError, mint_link::MintLink, mint_pool::MintPool,
    store::PoolStore, wallet::WalletAddress,
};

pub type Result<T> = result::Result<T, MintPoolError>;

/// How many times a claim re-reads the persisted pool after losing a write race
/// before giving up.
pub const MAX_COMMIT_ATTEMPTS: usize = 5;

pub const NO_LINKS_AVAILABLE: &str = "no links available";

/// Artificial delays inside [`MintLinkAllocator::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClaimLatency {
    /// Fixed wait before checking availability
    pub availability_check: Duration,
    /// Upper bound of the random wait added to `availability_check`
    pub jitter: Duration,
    /// Wait between choosing a link and committing it
    pub assignment: Duration,
}

impl ClaimLatency {
    pub const NONE: ClaimLatency = ClaimLatency {
        availability_check: Duration::ZERO,
        jitter: Duration::ZERO,
        assignment: Duration::ZERO,
    };

    /// The delays the public claim page runs with: 1-3s, then 500ms.
    pub fn simulated() -> Self {
        Self {
            availability_check: Duration::from_millis(1000),
            jitter: Duration::from_millis(2000),
            assignment: Duration::from_millis(500),
        }
    }

    fn availability_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.availability_check;
        }
        self.availability_check + self.jitter.mul_f64(rand::thread_rng().gen::<f64>())
    }
}

/// Result of a claim that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// A fresh link was handed to the wallet
    Assigned(MintLink),
    /// The wallet already held this link
    Existing(MintLink),
    /// Every link in the pool is taken
    Exhausted,
}

impl ClaimOutcome {
    pub fn link(&self) -> Option<&MintLink> {
        match self {
            ClaimOutcome::Assigned(link) | ClaimOutcome::Existing(link) => Some(link),
            ClaimOutcome::Exhausted => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.link().is_some()
    }
}

/// Wire form of a claim attempt: `{success, link?, error?, isExisting?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<MintLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_existing: Option<bool>,
}

impl From<ClaimOutcome> for ClaimResponse {
    fn from(outcome: ClaimOutcome) -> Self {
        match outcome {
            ClaimOutcome::Assigned(link) => ClaimResponse {
                success: true,
                link: Some(link),
                error: None,
                is_existing: Some(false),
            },
            ClaimOutcome::Existing(link) => ClaimResponse {
                success: true,
                link: Some(link),
                error: None,
                is_existing: Some(true),
            },
            ClaimOutcome::Exhausted => ClaimResponse {
                success: false,
                link: None,
                error: Some(NO_LINKS_AVAILABLE.to_string()),
                is_existing: None,
            },
        }
    }
}

/// Hands out mint links first-come-first-served, at most one per wallet.
///
/// The allocator never looks at the allow-list while claiming: callers are
/// expected to run the eligibility gate first. It only guarantees that a wallet
/// gets a single, stable link and that no link goes to two wallets.
pub struct MintLinkAllocator<S> {
    seed: MintPool,
    pool: Mutex<MintPool>,
    allow_list: RwLock<AllowList>,
    store: S,
    latency: ClaimLatency,
}

impl<S: PoolStore> MintLinkAllocator<S> {
    /// Restore the pool from `store`, or persist `seed` if the store is empty.
    pub fn new(seed: MintPool, allow_list: AllowList, store: S) -> Result<Self> {
        let pool = match store.load()? {
            Some(pool) => {
                info!(
                    "restored mint pool with {} of {} links available",
                    pool.available_count(),
                    pool.total_count()
                );
                pool
            }
            None => {
                store.save(&seed)?;
                info!("initialized mint pool with {} seed links", seed.total_count());
                seed.clone()
            }
        };

        Ok(Self {
            seed,
            pool: Mutex::new(pool),
            allow_list: RwLock::new(allow_list),
            store,
            latency: ClaimLatency::NONE,
        })
    }

    pub fn with_latency(mut self, latency: ClaimLatency) -> Self {
        self.latency = latency;
        self
    }

    pub fn is_whitelisted(&self, wallet: &WalletAddress) -> bool {
        self.allow_list
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(wallet)
    }

    /// Merge wallets into the allow-list, returning how many were new
    pub fn extend_allow_list(&self, wallets: impl IntoIterator<Item = WalletAddress>) -> usize {
        self.allow_list
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(wallets)
    }

    pub fn assigned_link(&self, wallet: &WalletAddress) -> Option<MintLink> {
        self.lock_pool().assigned_link(wallet).cloned()
    }

    pub fn is_already_claimed(&self, wallet: &WalletAddress) -> bool {
        self.assigned_link(wallet).is_some()
    }

    pub fn available_count(&self) -> usize {
        self.lock_pool().available_count()
    }

    pub fn total_count(&self) -> usize {
        self.lock_pool().total_count()
    }

    pub fn snapshot(&self) -> MintPool {
        self.lock_pool().clone()
    }

    /// Hand the lowest-positioned unclaimed link to `wallet`, or return the link
    /// it already holds.
    ///
    /// Both waits happen outside the pool lock. Whatever was observed before the
    /// second wait is re-validated under the lock, so interleaved claims can only
    /// change which link is picked, never hand one link out twice.
    #[instrument(skip_all, fields(wallet = %wallet))]
    pub async fn claim(&self, wallet: &WalletAddress) -> Result<ClaimOutcome> {
        tokio::time::sleep(self.latency.availability_delay()).await;

        let candidate = {
            let pool = self.lock_pool();
            if let Some(link) = pool.assigned_link(wallet) {
                debug!("wallet already holds {}", link.id);
                return Ok(ClaimOutcome::Existing(link.clone()));
            }
            match pool.first_unclaimed() {
                Some(index) => pool.mint_links[index].id.clone(),
                None => {
                    info!("no links available");
                    return Ok(ClaimOutcome::Exhausted);
                }
            }
        };
        debug!("selected candidate link {}", candidate);

        tokio::time::sleep(self.latency.assignment).await;

        self.commit(wallet, &candidate)
    }

    /// Critical section of a claim. Must not await.
    fn commit(&self, wallet: &WalletAddress, candidate: &str) -> Result<ClaimOutcome> {
        let mut pool = self.lock_pool();

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            if let Some(link) = pool.assigned_link(wallet) {
                debug!("wallet was assigned {} while waiting", link.id);
                return Ok(ClaimOutcome::Existing(link.clone()));
            }

            let Some(index) = pool.first_unclaimed() else {
                info!("pool ran out while waiting");
                return Ok(ClaimOutcome::Exhausted);
            };
            if pool.mint_links[index].id != candidate {
                debug!(
                    "candidate {} was taken, reselected {}",
                    candidate, pool.mint_links[index].id
                );
            }

            let next = pool.with_assignment(index, wallet, Utc::now())?;
            match self.store.compare_and_swap(&pool, &next) {
                Ok(()) => {
                    let link = next.mint_links[index].clone();
                    *pool = next;
                    info!(
                        "assigned {} ({} of {} left)",
                        link.id,
                        pool.available_count(),
                        pool.total_count()
                    );
                    return Ok(ClaimOutcome::Assigned(link));
                }
                Err(MintPoolError::StoreConflict) => {
                    warn!(attempt, "persisted pool changed underneath, reloading");
                    if let Some(persisted) = self.store.load()? {
                        *pool = persisted;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(MintPoolError::CommitConflict(
            wallet.clone(),
            MAX_COMMIT_ATTEMPTS,
        ))
    }

    /// Put every seed link back to unclaimed. Privileged: callers must gate this.
    pub fn reset(&self) -> Result<()> {
        let mut pool = self.lock_pool();
        self.store.save(&self.seed)?;
        *pool = self.seed.clone();
        warn!("mint pool reset to {} seed links", self.seed.total_count());
        Ok(())
    }

    fn lock_pool(&self) -> MutexGuard<'_, MintPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::{
        store::{JsonFileStore, MemoryStore},
        utils::{default_allow_list, default_seed_links},
    };

    fn wallet(n: u8) -> WalletAddress {
        format!("0x{}", format!("{n:02x}").repeat(20)).parse().unwrap()
    }

    fn seed_pool() -> MintPool {
        MintPool::new(default_seed_links()).unwrap()
    }

    fn new_allocator(seed: MintPool) -> MintLinkAllocator<MemoryStore> {
        MintLinkAllocator::new(seed, AllowList::default(), MemoryStore::new()).unwrap()
    }

    /// Store that rejects every write while `fail` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    impl PoolStore for FlakyStore {
        fn load(&self) -> Result<Option<MintPool>> {
            self.inner.load()
        }

        fn save(&self, pool: &MintPool) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.save(pool)
        }

        fn compare_and_swap(&self, expected: &MintPool, new: &MintPool) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.compare_and_swap(expected, new)
        }
    }

    /// Store whose first `conflicts` compare-and-swaps lose to another writer. The
    /// first lost race hands the first free link to `rival`.
    struct ContendedStore {
        inner: MemoryStore,
        conflicts: AtomicUsize,
        rival: WalletAddress,
    }

    impl PoolStore for ContendedStore {
        fn load(&self) -> Result<Option<MintPool>> {
            self.inner.load()
        }

        fn save(&self, pool: &MintPool) -> Result<()> {
            self.inner.save(pool)
        }

        fn compare_and_swap(&self, expected: &MintPool, new: &MintPool) -> Result<()> {
            if self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                let current = self.inner.load()?.unwrap_or_else(|| expected.clone());
                if let (None, Some(index)) =
                    (current.assigned_link(&self.rival), current.first_unclaimed())
                {
                    let taken = current.with_assignment(index, &self.rival, Utc::now())?;
                    self.inner.save(&taken)?;
                }
                return Err(MintPoolError::StoreConflict);
            }
            self.inner.compare_and_swap(expected, new)
        }
    }

    #[tokio::test]
    async fn test_claim_assigns_first_link() {
        let allocator = new_allocator(seed_pool());

        let outcome = allocator.claim(&wallet(1)).await.unwrap();
        let ClaimOutcome::Assigned(link) = outcome else {
            panic!("expected a fresh assignment, got {outcome:?}");
        };
        assert_eq!(link.id, "nq1ez5");
        assert!(link.is_claimed_by(&wallet(1)));
        assert!(link.claimed_at.is_some());
        assert_eq!(allocator.available_count(), 8);
        assert_eq!(allocator.total_count(), 9);
        assert!(allocator.is_already_claimed(&wallet(1)));
    }

    #[tokio::test]
    async fn test_claim_is_idempotent() {
        let allocator = new_allocator(seed_pool());

        let first = allocator.claim(&wallet(1)).await.unwrap();
        let second = allocator.claim(&wallet(1)).await.unwrap();

        assert!(matches!(first, ClaimOutcome::Assigned(_)));
        assert!(matches!(second, ClaimOutcome::Existing(_)));
        assert_eq!(first.link().unwrap(), second.link().unwrap());
        assert_eq!(allocator.available_count(), 8);
    }

    #[tokio::test]
    async fn test_claim_is_fifo_by_pool_position() {
        let mut links = vec![
            MintLink::new("a", "https://poap.xyz/mint/a"),
            MintLink::new("b", "https://poap.xyz/mint/b"),
            MintLink::new("c", "https://poap.xyz/mint/c"),
        ];
        links[2].mark_claimed(&wallet(9), Utc::now());
        let allocator = new_allocator(MintPool::new(links).unwrap());

        let outcome = allocator.claim(&wallet(1)).await.unwrap();
        assert_eq!(outcome.link().unwrap().id, "a");
        let outcome = allocator.claim(&wallet(2)).await.unwrap();
        assert_eq!(outcome.link().unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_exhausted_pool() {
        let mut links = default_seed_links();
        for (i, link) in links.iter_mut().enumerate() {
            link.mark_claimed(&wallet(100 + i as u8), Utc::now());
        }
        let allocator = new_allocator(MintPool::new(links).unwrap());

        let outcome = allocator.claim(&wallet(1)).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Exhausted);
        assert!(!outcome.is_success());
        assert_eq!(allocator.available_count(), 0);

        let response = ClaimResponse::from(outcome);
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some(NO_LINKS_AVAILABLE));
    }

    #[tokio::test]
    async fn test_no_wallet_gets_two_links() {
        let allocator = new_allocator(seed_pool());

        for round in 0..3 {
            for n in 1..=12u8 {
                let outcome = allocator.claim(&wallet(n)).await.unwrap();
                if n <= 9 {
                    assert!(outcome.is_success(), "round {round} wallet {n}");
                } else {
                    assert_eq!(outcome, ClaimOutcome::Exhausted);
                }
            }
        }

        let pool = allocator.snapshot();
        let mut claimants: Vec<_> = pool
            .mint_links
            .iter()
            .filter_map(|l| l.claimed_by.clone())
            .collect();
        claimants.sort();
        claimants.dedup();
        assert_eq!(claimants.len(), 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_for_last_link() {
        let mut links = default_seed_links();
        for (i, link) in links.iter_mut().take(8).enumerate() {
            link.mark_claimed(&wallet(100 + i as u8), Utc::now());
        }
        let allocator = Arc::new(
            new_allocator(MintPool::new(links).unwrap()).with_latency(ClaimLatency {
                availability_check: Duration::from_millis(10),
                jitter: Duration::from_millis(20),
                assignment: Duration::from_millis(30),
            }),
        );

        let handles: Vec<_> = [wallet(1), wallet(2)]
            .into_iter()
            .map(|w| {
                let allocator = allocator.clone();
                tokio::spawn(async move { allocator.claim(&w).await.unwrap() })
            })
            .collect();

        let mut outcomes = vec![];
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let winners: Vec<_> = outcomes.iter().filter_map(|o| o.link()).collect();
        assert_eq!(winners.len(), 1, "outcomes: {outcomes:?}");
        assert_eq!(winners[0].id, "8wa9ea");
        assert!(outcomes.contains(&ClaimOutcome::Exhausted));

        // the loser retrying still finds nothing
        let loser = if allocator.is_already_claimed(&wallet(1)) {
            wallet(2)
        } else {
            wallet(1)
        };
        assert_eq!(
            allocator.claim(&loser).await.unwrap(),
            ClaimOutcome::Exhausted
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_same_wallet() {
        let allocator = Arc::new(new_allocator(seed_pool()).with_latency(ClaimLatency {
            availability_check: Duration::from_millis(5),
            jitter: Duration::from_millis(10),
            assignment: Duration::from_millis(20),
        }));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let allocator = allocator.clone();
                tokio::spawn(async move { allocator.claim(&wallet(1)).await.unwrap() })
            })
            .collect();

        let mut ids = vec![];
        let mut fresh = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            if matches!(outcome, ClaimOutcome::Assigned(_)) {
                fresh += 1;
            }
            ids.push(outcome.link().unwrap().id.clone());
        }

        assert_eq!(fresh, 1);
        assert!(ids.iter().all(|id| id == "nq1ez5"));
        assert_eq!(allocator.available_count(), 8);
    }

    #[tokio::test]
    async fn test_reset_restores_seed() {
        let allocator = new_allocator(seed_pool());
        for n in 1..=4u8 {
            allocator.claim(&wallet(n)).await.unwrap();
        }
        assert_eq!(allocator.available_count(), 5);

        allocator.reset().unwrap();

        assert_eq!(allocator.total_count(), 9);
        assert_eq!(allocator.available_count(), 9);
        assert!((1..=4u8).all(|n| allocator.assigned_link(&wallet(n)).is_none()));
        assert_eq!(allocator.snapshot(), seed_pool());
    }

    #[tokio::test]
    async fn test_restart_restores_claims() {
        let path =
            std::env::temp_dir().join(format!("poap-storage-{}.json", rand::random::<u64>()));

        let allocator = MintLinkAllocator::new(
            seed_pool(),
            AllowList::default(),
            JsonFileStore::new(&path),
        )
        .unwrap();
        let assigned = allocator.claim(&wallet(1)).await.unwrap();
        allocator.claim(&wallet(2)).await.unwrap();
        let before = allocator.snapshot();
        drop(allocator);

        let restarted = MintLinkAllocator::new(
            seed_pool(),
            AllowList::default(),
            JsonFileStore::new(&path),
        )
        .unwrap();
        assert_eq!(restarted.snapshot(), before);
        assert_eq!(
            restarted.claim(&wallet(1)).await.unwrap(),
            ClaimOutcome::Existing(assigned.link().unwrap().clone())
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_allocators_sharing_one_file() {
        for _ in 0..25 {
            let store = JsonFileStore::new(
                std::env::temp_dir().join(format!("poap-storage-{}.json", rand::random::<u64>())),
            );
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let handles: Vec<_> = [wallet(1), wallet(2)]
                .into_iter()
                .map(|claimant| {
                    let allocator =
                        MintLinkAllocator::new(seed_pool(), AllowList::default(), store.clone())
                            .unwrap();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        let runtime = tokio::runtime::Builder::new_current_thread()
                            .enable_time()
                            .build()
                            .unwrap();
                        barrier.wait();
                        let outcome = runtime.block_on(allocator.claim(&claimant));
                        (claimant, outcome)
                    })
                })
                .collect();

            let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let persisted = store.load().unwrap().unwrap();
            assert_eq!(persisted.available_count(), 7);

            for (claimant, outcome) in &outcomes {
                let Ok(ClaimOutcome::Assigned(link)) = outcome else {
                    panic!("{claimant} did not get a link: {outcome:?}");
                };
                // every acknowledged claim is on disk
                assert_eq!(persisted.assigned_link(claimant), Some(link));
            }
            assert_ne!(
                outcomes[0].1.as_ref().unwrap().link(),
                outcomes[1].1.as_ref().unwrap().link()
            );

            std::fs::remove_file(store.path()).unwrap();
            let _ = std::fs::remove_file(store.lock_path());
        }
    }

    #[tokio::test]
    async fn test_failed_write_is_not_committed() {
        let allocator =
            MintLinkAllocator::new(seed_pool(), AllowList::default(), FlakyStore::default())
                .unwrap();
        allocator.store.fail.store(true, Ordering::SeqCst);

        assert!(matches!(
            allocator.claim(&wallet(1)).await,
            Err(MintPoolError::IoError(_))
        ));
        assert!(!allocator.is_already_claimed(&wallet(1)));
        assert_eq!(allocator.available_count(), 9);

        allocator.store.fail.store(false, Ordering::SeqCst);
        let outcome = allocator.claim(&wallet(1)).await.unwrap();
        assert_eq!(outcome.link().unwrap().id, "nq1ez5");
        assert_eq!(allocator.store.load().unwrap(), Some(allocator.snapshot()));
    }

    #[tokio::test]
    async fn test_lost_write_race_reloads_and_retries() {
        let store = ContendedStore {
            inner: MemoryStore::new(),
            conflicts: AtomicUsize::new(2),
            rival: wallet(50),
        };
        let allocator = MintLinkAllocator::new(seed_pool(), AllowList::default(), store).unwrap();

        let outcome = allocator.claim(&wallet(1)).await.unwrap();

        // the rival process took the first link, then the second attempt lost again
        // without a new link being free for the rival, so we land on the second link
        assert_eq!(outcome.link().unwrap().id, "slr6qp");
        assert_eq!(
            allocator.assigned_link(&wallet(50)).unwrap().id,
            "nq1ez5"
        );
        assert_eq!(allocator.store.load().unwrap(), Some(allocator.snapshot()));
    }

    #[tokio::test]
    async fn test_gives_up_after_repeated_conflicts() {
        let store = ContendedStore {
            inner: MemoryStore::new(),
            conflicts: AtomicUsize::new(usize::MAX),
            rival: wallet(50),
        };
        let allocator = MintLinkAllocator::new(seed_pool(), AllowList::default(), store).unwrap();

        assert!(matches!(
            allocator.claim(&wallet(1)).await,
            Err(MintPoolError::CommitConflict(_, MAX_COMMIT_ATTEMPTS))
        ));
    }

    #[tokio::test]
    async fn test_claim_ignores_allow_list() {
        let allocator = MintLinkAllocator::new(
            seed_pool(),
            AllowList::new(default_allow_list()),
            MemoryStore::new(),
        )
        .unwrap();
        let outsider = wallet(0xee);
        assert!(!allocator.is_whitelisted(&outsider));

        let outcome = allocator.claim(&outsider).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Assigned(_)));
        assert!(!allocator.is_whitelisted(&outsider));
    }

    #[test]
    fn test_whitelist_is_case_insensitive() {
        let allocator = MintLinkAllocator::new(
            seed_pool(),
            AllowList::new(default_allow_list()),
            MemoryStore::new(),
        )
        .unwrap();

        let checksummed: WalletAddress = "0x77B7f7E65BDcF87958B99a1Adb1ADBa6F388f2aa"
            .parse()
            .unwrap();
        assert!(allocator.is_whitelisted(&checksummed));

        let newcomer = wallet(0x42);
        assert!(!allocator.is_whitelisted(&newcomer));
        assert_eq!(allocator.extend_allow_list([newcomer.clone()]), 1);
        assert!(allocator.is_whitelisted(&newcomer));
    }

    #[test]
    fn test_serialize_claim_response() {
        let link = MintLink::new("nq1ez5", "https://poap.xyz/mint/nq1ez5");
        let json = serde_json::to_value(ClaimResponse::from(ClaimOutcome::Existing(link))).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["isExisting"], true);
        assert_eq!(json["link"]["id"], "nq1ez5");
        assert!(json.get("error").is_none());
    }
}
