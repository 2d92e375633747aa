use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
    time::Duration,
};

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use http::Request;
use poap_mint_pool::{
    allocator::{ClaimResponse, MintLinkAllocator},
    directory::{EventData, EventDirectory, EventPage, InMemoryEventDirectory, NewEvent},
    eligibility::{register_attendance, Eligibility, EligibilityGate},
    gateway::{DeliveryRequest, PoapEventInfo, PoapGatewayClient},
    mint_link::MintLink,
    social::StaticPostVerifier,
    store::JsonFileStore,
    wallet::WalletAddress,
};
use serde_derive::{Deserialize, Serialize};
use tower::{
    buffer::BufferLayer, limit::RateLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer,
    ServiceBuilder,
};
use tower_http::{
    trace::{DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::{info, instrument, warn, Span};

use crate::{error, error::ApiError, Result};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

pub struct RouterState {
    pub allocator: MintLinkAllocator<JsonFileStore>,
    pub gate: EligibilityGate<InMemoryEventDirectory>,
    pub directory: Arc<InMemoryEventDirectory>,
    pub verifier: StaticPostVerifier,
    pub gateway: Option<PoapGatewayClient>,
    pub admin_token: Option<String>,
}

impl Debug for RouterState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterState")
            .field("strategy", &self.gate.strategy())
            .field("total", &self.allocator.total_count())
            .field("available", &self.allocator.available_count())
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}

#[instrument]
pub fn get_routes(state: Arc<RouterState>, enable_reset_endpoint: bool) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(error::handle_error)) // handle middleware errors explicitly!
        .layer(BufferLayer::new(100)) // buffer up to 100 requests in queue
        .layer(RateLimitLayer::new(1000, Duration::from_secs(10)))
        .layer(TimeoutLayer::new(Duration::from_secs(20)))
        .layer(LoadShedLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .on_request(|request: &Request<Body>, _span: &Span| {
                    info!("started {} {}", request.method(), request.uri().path())
                })
                .on_response(
                    DefaultOnResponse::new()
                        .level(tracing_core::Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/pool", get(get_pool))
        .route("/status/:wallet", get(get_status))
        .route("/claim", post(claim))
        .route("/events", get(list_events).post(create_event))
        .route("/events/:event_code/attendance", post(post_attendance))
        .route("/events/:event_code/close", post(close_event));

    if state.gateway.is_some() {
        router = router
            .route("/poap/event/:event_id", get(get_poap_event))
            .route("/poap/delivery", post(post_delivery));
    }

    // wipes every claim, keep off in production
    if enable_reset_endpoint {
        warn!("admin reset endpoint is enabled");
        router = router.route("/admin/reset", post(admin_reset));
    }

    router.layer(middleware).with_state(state)
}

fn parse_wallet(wallet: &str) -> Result<WalletAddress> {
    wallet
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidWallet(wallet.to_string()))
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PoolSummary {
    pub total: usize,
    pub available: usize,
    pub links: Vec<MintLink>,
}

impl PoolSummary {
    fn new(allocator: &MintLinkAllocator<JsonFileStore>) -> Self {
        let pool = allocator.snapshot();
        Self {
            total: pool.total_count(),
            available: pool.available_count(),
            links: pool.mint_links,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WalletStatus {
    pub wallet: WalletAddress,
    pub whitelisted: bool,
    pub claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<MintLink>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ClaimRequest {
    pub wallet: String,
    #[serde(default)]
    pub event_code: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EventsQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Serialize, Deserialize, Debug)]
struct AttendanceRequest {
    #[serde(default)]
    pub handle: String,
    pub wallet: String,
}

async fn root() -> impl IntoResponse {
    "POAP Claim API"
}

/// Counts plus every link with its claim state
async fn get_pool(State(state): State<Arc<RouterState>>) -> Json<PoolSummary> {
    Json(PoolSummary::new(&state.allocator))
}

#[instrument(skip(state), ret, err)]
async fn get_status(
    State(state): State<Arc<RouterState>>,
    Path(wallet): Path<String>,
) -> Result<Json<WalletStatus>> {
    let wallet = parse_wallet(&wallet)?;
    let link = state.allocator.assigned_link(&wallet);

    Ok(Json(WalletStatus {
        whitelisted: state.allocator.is_whitelisted(&wallet),
        claimed: link.is_some(),
        link,
        wallet,
    }))
}

/// Gate the wallet, then hand it a mint link.
/// An exhausted pool is a normal answer (`success: false`), not an error.
#[instrument(skip(state), ret, err)]
async fn claim(
    State(state): State<Arc<RouterState>>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>> {
    let wallet = parse_wallet(&request.wallet)?;

    if let Eligibility::Ineligible(reason) = state
        .gate
        .is_eligible(&state.allocator, &wallet, request.event_code.as_deref())
        .await
    {
        return Err(ApiError::NotEligible(wallet, reason));
    }

    let outcome = state.allocator.claim(&wallet).await?;
    Ok(Json(ClaimResponse::from(outcome)))
}

/// Record a wallet as event participant after checking the handle's posts
#[instrument(skip(state), err)]
async fn post_attendance(
    State(state): State<Arc<RouterState>>,
    Path(event_code): Path<String>,
    Json(request): Json<AttendanceRequest>,
) -> Result<Json<EventData>> {
    if request.handle.trim().is_empty() {
        return Err(ApiError::BadRequest("Handle is required".to_string()));
    }
    let wallet = parse_wallet(&request.wallet)?;

    let event = register_attendance(
        state.directory.as_ref(),
        &state.verifier,
        &event_code,
        &request.handle,
        &wallet,
    )
    .await?;

    Ok(Json(event))
}

#[instrument(skip(state), err)]
async fn get_poap_event(
    State(state): State<Arc<RouterState>>,
    Path(event_id): Path<String>,
) -> Result<Json<PoapEventInfo>> {
    let gateway = state.gateway.as_ref().ok_or(ApiError::InternalError)?;
    Ok(Json(gateway.get_event_info(&event_id).await?))
}

#[instrument(skip_all, err)]
async fn post_delivery(
    State(state): State<Arc<RouterState>>,
    Json(request): Json<DeliveryRequest>,
) -> Result<Json<serde_json::Value>> {
    if request.secret_codes.is_empty() {
        return Err(ApiError::BadRequest(
            "Missing required field: secret_codes".to_string(),
        ));
    }
    if request.addresses.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one address is required".to_string(),
        ));
    }

    let gateway = state.gateway.as_ref().ok_or(ApiError::InternalError)?;
    Ok(Json(gateway.create_delivery(request).await?))
}

/// Fails unless the request carries the configured admin token
fn check_admin_token(state: &RouterState, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    match (&state.admin_token, presented) {
        (Some(expected), Some(presented)) if expected == presented => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Zero-based page of events in registration order
#[instrument(skip(state), err)]
async fn list_events(
    State(state): State<Arc<RouterState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventPage>> {
    let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
    Ok(Json(state.directory.list_events(query.page, page_size).await?))
}

#[instrument(skip_all, err)]
async fn create_event(
    State(state): State<Arc<RouterState>>,
    headers: HeaderMap,
    Json(event): Json<NewEvent>,
) -> Result<Json<EventData>> {
    check_admin_token(&state, &headers)?;
    if event.code.trim().is_empty() {
        return Err(ApiError::BadRequest("Event code is required".to_string()));
    }
    if event.tags.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one tag is required".to_string(),
        ));
    }

    let code = event.code.clone();
    let created = state.directory.create_event(event).await?;
    info!("created event {}", code);
    Ok(Json(created))
}

#[instrument(skip(state, headers), err)]
async fn close_event(
    State(state): State<Arc<RouterState>>,
    Path(event_code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<EventData>> {
    check_admin_token(&state, &headers)?;
    let event = state.directory.close_event(&event_code)?;
    info!("closed event {}", event_code);
    Ok(Json(event))
}

#[instrument(skip_all, err)]
async fn admin_reset(
    State(state): State<Arc<RouterState>>,
    headers: HeaderMap,
) -> Result<Json<PoolSummary>> {
    check_admin_token(&state, &headers)?;

    state.allocator.reset()?;
    Ok(Json(PoolSummary::new(&state.allocator)))
}
