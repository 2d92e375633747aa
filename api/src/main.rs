mod error;
mod router;

use std::{fmt::Debug, net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc};

use clap::{Parser, ValueEnum};
use poap_mint_pool::{
    allocator::{ClaimLatency, MintLinkAllocator},
    allow_list::AllowList,
    directory::InMemoryEventDirectory,
    eligibility::{EligibilityGate, GateStrategy},
    gateway::{PoapGatewayClient, POAP_API_BASE_URL},
    mint_pool::MintPool,
    social::StaticPostVerifier,
    store::{JsonFileStore, DEFAULT_STORE_FILE},
    utils::{default_allow_list, default_seed_links},
};
use router::RouterState;
use tracing::{info, instrument, warn};

use crate::error::ApiError;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum GateMode {
    /// Only wallets on the allow-list may claim
    AllowList,
    /// Only registered participants of the requested event may claim
    EventRoster,
}

impl From<GateMode> for GateStrategy {
    fn from(mode: GateMode) -> Self {
        match mode {
            GateMode::AllowList => GateStrategy::AllowList,
            GateMode::EventRoster => GateStrategy::EventRoster,
        }
    }
}

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Bind address for the server
    #[clap(long, env, default_value_t = SocketAddr::from_str("0.0.0.0:7001").unwrap())]
    bind_addr: SocketAddr,

    /// Persisted pool record
    #[clap(long, env, default_value = DEFAULT_STORE_FILE)]
    store_path: PathBuf,

    /// CSV of `id,url` mint links, the built-in links are used when absent
    #[clap(long, env)]
    seed_csv: Option<PathBuf>,

    /// CSV with a `wallet` column, the built-in allow-list is used when absent
    #[clap(long, env)]
    allow_list_csv: Option<PathBuf>,

    #[clap(long, env, value_enum, default_value_t = GateMode::AllowList)]
    gate: GateMode,

    /// JSON map of event code to event record
    #[clap(long, env)]
    events_path: Option<PathBuf>,

    /// JSON map of social handle to the tags of each of its posts
    #[clap(long, env)]
    posts_path: Option<PathBuf>,

    /// Wait between the steps of a claim the way a real issuer would
    #[clap(long, env)]
    simulate_latency: bool,

    #[clap(long, env)]
    enable_reset_endpoint: bool,

    /// Expected value of the `x-admin-token` header on event admin and reset routes
    #[clap(long, env)]
    admin_token: Option<String>,

    /// Enables the POAP API proxy routes
    #[clap(long, env)]
    poap_api_key: Option<String>,

    #[clap(long, env, default_value = POAP_API_BASE_URL)]
    poap_api_url: String,
}

impl Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("bind_addr", &self.bind_addr)
            .field("store_path", &self.store_path)
            .field("seed_csv", &self.seed_csv)
            .field("allow_list_csv", &self.allow_list_csv)
            .field("gate", &self.gate)
            .field("events_path", &self.events_path)
            .field("posts_path", &self.posts_path)
            .field("simulate_latency", &self.simulate_latency)
            .field("enable_reset_endpoint", &self.enable_reset_endpoint)
            .field("poap_api_url", &self.poap_api_url)
            .finish_non_exhaustive()
    }
}

#[tokio::main]
#[instrument]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt().init();

    info!("args: {:?}", args);

    info!("starting server at {}", args.bind_addr);

    let seed = match &args.seed_csv {
        Some(path) => MintPool::new_from_csv(path)?,
        None => MintPool::new(default_seed_links())?,
    };
    let allow_list = match &args.allow_list_csv {
        Some(path) => AllowList::new_from_csv(path)?,
        None => AllowList::new(default_allow_list()),
    };
    info!("allow-list holds {} wallets", allow_list.len());

    let mut allocator =
        MintLinkAllocator::new(seed, allow_list, JsonFileStore::new(&args.store_path))?;
    if args.simulate_latency {
        allocator = allocator.with_latency(ClaimLatency::simulated());
    }

    let directory = Arc::new(match &args.events_path {
        Some(path) => InMemoryEventDirectory::new_from_file(path)?,
        None => InMemoryEventDirectory::default(),
    });
    let verifier = match &args.posts_path {
        Some(path) => StaticPostVerifier::new_from_file(path)?,
        None => StaticPostVerifier::default(),
    };
    let gateway = match &args.poap_api_key {
        Some(key) => Some(PoapGatewayClient::new(key, args.poap_api_url.clone())?),
        None => None,
    };

    if args.admin_token.is_none() {
        warn!("no --admin-token set, event admin and reset requests will be refused");
    }

    let state = Arc::new(RouterState {
        allocator,
        gate: EligibilityGate::new(args.gate.into(), directory.clone()),
        directory,
        verifier,
        gateway,
        admin_token: args.admin_token.clone(),
    });

    info!("state: {:?}", state);

    let app = router::get_routes(state, args.enable_reset_endpoint);

    axum::Server::bind(&args.bind_addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
