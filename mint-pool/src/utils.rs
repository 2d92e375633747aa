use rand::{distributions::Alphanumeric, Rng};

use crate::{mint_link::MintLink, wallet::WalletAddress};

pub const POAP_MINT_BASE_URL: &str = "https://poap.xyz/mint";

/// Length of the short code in a POAP mint url
pub const MINT_LINK_ID_LEN: usize = 6;

const SEED_LINK_IDS: [&str; 9] = [
    "nq1ez5", "slr6qp", "a7ky2s", "8eme57", "oouh5j", "pzn97u", "yizp36", "f48xpe", "8wa9ea",
];

const SEED_WALLETS: [&str; 10] = [
    "0x1234567890123456789012345678901234567890",
    "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd",
    "0x9876543210987654321098765432109876543210",
    "0xfedcbafedcbafedcbafedcbafedcbafedcbafedcba",
    "0x1111222211112222111122221111222211112222",
    "0x3333444433334444333344443333444433334444",
    "0x5555666655556666555566665555666655556666",
    "0x7777888877778888777788887777888877778888",
    "0x9999aaaa9999aaaa9999aaaa9999aaaa9999aaaa",
    "0x77B7f7E65BDcF87958B99a1Adb1ADBa6F388f2aa",
];

pub fn poap_mint_url(id: &str) -> String {
    format!("{POAP_MINT_BASE_URL}/{id}")
}

/// The links the campaign ships with, all unclaimed.
pub fn default_seed_links() -> Vec<MintLink> {
    SEED_LINK_IDS
        .iter()
        .map(|id| MintLink::new(*id, poap_mint_url(id)))
        .collect()
}

/// The built-in allow-list. Entries that are not well-formed addresses are skipped.
pub fn default_allow_list() -> Vec<WalletAddress> {
    SEED_WALLETS
        .iter()
        .filter_map(|w| w.parse().ok())
        .collect()
}

/// Random lower-case alphanumeric code shaped like a POAP mint code
pub fn random_link_id<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(MINT_LINK_ID_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}
