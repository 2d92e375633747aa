mod instructions;

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use csv::Writer;
use instructions::*;
use poap_mint_pool::{
    allocator::{ClaimOutcome, MintLinkAllocator},
    allow_list::AllowList,
    mint_pool::MintPool,
    store::{JsonFileStore, PoolStore, DEFAULT_STORE_FILE},
    utils::{default_allow_list, random_link_id, POAP_MINT_BASE_URL},
    wallet::WalletAddress,
};
use tracing::info;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,

    /// Persisted pool record
    #[clap(long, env, default_value = DEFAULT_STORE_FILE)]
    pub store_path: PathBuf,
}

impl Args {
    fn get_store(&self) -> JsonFileStore {
        JsonFileStore::new(&self.store_path)
    }

    /// Persisted pool, failing if no pool was created yet
    fn load_pool(&self) -> Result<MintPool> {
        self.get_store().load()?.ok_or_else(|| {
            anyhow!(
                "no mint pool at {}, run create-pool first",
                self.store_path.display()
            )
        })
    }
}

// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the persisted pool from a CSV of mint links
    CreatePool(CreatePoolArgs),
    /// Print pool counts and every assignment
    Stats,
    /// Show the link held by a wallet
    Status(StatusArgs),
    /// Claim a link for a wallet
    Claim(ClaimArgs),
    /// Put every link back to unclaimed
    Reset,
    /// Generate a CSV of random mint links
    CreateDummyCsv(CreateDummyCsvArgs),
}

#[derive(Parser, Debug)]
pub struct CreatePoolArgs {
    /// CSV path with `id,url` columns
    #[clap(long, env)]
    pub csv_path: PathBuf,

    /// Replace a pool that already has claims
    #[clap(long, env)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[clap(long, env)]
    pub wallet: WalletAddress,
}

#[derive(Parser, Debug)]
pub struct ClaimArgs {
    #[clap(long, env)]
    pub wallet: WalletAddress,

    /// CSV with a `wallet` column, the built-in list is used when absent
    #[clap(long, env)]
    pub allow_list_csv: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CreateDummyCsvArgs {
    /// CSV path
    #[clap(long, env)]
    pub csv_path: PathBuf,

    #[clap(long, env)]
    pub num_records: usize,

    #[clap(long, env, default_value = POAP_MINT_BASE_URL)]
    pub base_url: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        Commands::CreatePool(create_pool_args) => {
            process_create_pool(&args, create_pool_args)?;
        }
        Commands::Stats => {
            process_stats(&args)?;
        }
        Commands::Status(status_args) => {
            process_status(&args, status_args)?;
        }
        Commands::Claim(claim_args) => {
            process_claim(&args, claim_args)?;
        }
        Commands::Reset => {
            process_reset(&args)?;
        }
        Commands::CreateDummyCsv(dummy_csv_args) => {
            process_create_dummy_csv(dummy_csv_args)?;
        }
    }

    Ok(())
}

#[cfg(test)]
fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}", rand::random::<u64>(), name))
}

#[cfg(test)]
fn remove_if_exists(path: &std::path::Path) {
    if path.exists() {
        std::fs::remove_file(path).unwrap();
    }
}
