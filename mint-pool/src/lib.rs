pub mod allocator;
pub mod allow_list;
pub mod csv_entry;
pub mod directory;
pub mod eligibility;
pub mod error;
pub mod gateway;
pub mod mint_link;
pub mod mint_pool;
pub mod social;
pub mod store;
pub mod utils;
pub mod wallet;
