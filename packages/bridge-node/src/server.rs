//! HTTP API server
//!
//! - `GET /health`, `/healthz`, `/readyz` - Health and probes
//! - `GET /metrics` - Prometheus metrics
//! - `GET /status`, `/stats`, `/fees`, `/chains`, `/chains/{chain_id}`,
//!   `/validators`, `/events` - Read-only query surface
//! - `GET /transactions/active`, `/transactions/{tx_id}`
//! - `POST /transactions` - Initiate a transfer; requires the watcher token
//! - `POST /transactions/{tx_id}/attestations` - Submit a validator attestation;
//!   requires the submitting validator's own token
//! - `POST /transactions/{tx_id}/refund` - Claim a refund after timeout
//! - `/admin/*` - Configuration and pause; requires `Authorization: Bearer <token>`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use bridge_core::{
    Address, Amount, AttestationOutcome, AttestationPayload, BridgeCoordinator, BridgeError,
    BridgeStats, ChainId, ChainStatus, ChainUpdate, EventLog, EventRecord, FeeConfig, FeeInfo,
    InitiateRequest, OperationalStatus, Transaction, TxId, ValidatorSet,
};
use eyre::eyre;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::parse_chain_id;

// ============================================================================
// Metrics
// ============================================================================

/// Prometheus metrics
pub struct Metrics {
    /// Events observed by the monitor, by event type
    pub events_total: IntCounterVec,
    /// Attestation submissions, by outcome
    pub attestations_total: IntCounterVec,
    /// Requests rejected by the protocol, by error code
    pub rejections_total: IntCounterVec,
    pub releases_total: IntCounter,
    pub refunds_total: IntCounter,
    /// Events the monitor missed because it fell behind
    pub events_lagged_total: IntCounter,
    pub pending_transactions: IntGauge,
    pub paused: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_total = IntCounterVec::new(
            Opts::new("bridge_events_total", "Bridge events emitted, by type"),
            &["type"],
        )
        .expect("constant metric name is valid");

        let attestations_total = IntCounterVec::new(
            Opts::new(
                "bridge_attestations_total",
                "Attestation submissions, by outcome",
            ),
            &["outcome"],
        )
        .expect("constant metric name is valid");

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "bridge_rejections_total",
                "Requests rejected by the protocol, by error code",
            ),
            &["code"],
        )
        .expect("constant metric name is valid");

        let releases_total = IntCounter::new(
            "bridge_releases_total",
            "Destination releases triggered",
        )
        .expect("constant metric name is valid");

        let refunds_total = IntCounter::new("bridge_refunds_total", "Source refunds triggered")
            .expect("constant metric name is valid");

        let events_lagged_total = IntCounter::new(
            "bridge_monitor_events_lagged_total",
            "Events skipped by the monitor because it fell behind",
        )
        .expect("constant metric name is valid");

        let pending_transactions = IntGauge::new(
            "bridge_pending_transactions",
            "Transactions not yet completed or refunded",
        )
        .expect("constant metric name is valid");

        let paused = IntGauge::new("bridge_paused", "1 while the bridge is paused")
            .expect("constant metric name is valid");

        registry
            .register(Box::new(events_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(attestations_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(rejections_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(releases_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(refunds_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(events_lagged_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(pending_transactions.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(paused.clone()))
            .expect("metric registration must not be called twice");

        Self {
            events_total,
            attestations_total,
            rejections_total,
            releases_total,
            refunds_total,
            events_lagged_total,
            pending_transactions,
            paused,
            registry,
        }
    }
}

// ============================================================================
// State & Errors
// ============================================================================

pub type SharedMetrics = Arc<Metrics>;

/// Combined app state
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<BridgeCoordinator>,
    pub events: Arc<EventLog>,
    pub metrics: SharedMetrics,
    /// Bearer token granting the admin identity
    pub admin_token: Arc<str>,
    /// Bearer token for watchers reporting source-chain locks
    pub watcher_token: Arc<str>,
    /// Bearer token per validator; a validator may only attest as itself
    pub validator_tokens: Arc<[(Address, String)]>,
}

impl AppState {
    /// Count a protocol rejection and convert it for the response
    fn reject(&self, err: BridgeError) -> ApiError {
        self.metrics
            .rejections_total
            .with_label_values(&[err.code()])
            .inc();
        ApiError::from(err)
    }

    /// Resolve the bearer token to the admin address
    fn authorize(&self, headers: &HeaderMap) -> Result<Address, ApiError> {
        let token = bearer_token(headers)?;
        if !constant_time_eq(token.as_bytes(), self.admin_token.as_bytes()) {
            warn!("Rejected admin request with invalid token");
            return Err(ApiError::unauthenticated("invalid bearer token"));
        }
        Ok(self.bridge.admin().clone())
    }

    /// Check the bearer token of a watcher submission
    fn authorize_watcher(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let token = bearer_token(headers)?;
        if !constant_time_eq(token.as_bytes(), self.watcher_token.as_bytes()) {
            warn!("Rejected initiate request with invalid token");
            return Err(ApiError::unauthenticated("invalid bearer token"));
        }
        Ok(())
    }

    /// Resolve the bearer token to the validator it was issued to
    fn authorize_validator(&self, headers: &HeaderMap) -> Result<Address, ApiError> {
        let token = bearer_token(headers)?;

        // Compare against every entry so timing does not reveal the match position
        let mut matched = None;
        for (validator, expected) in self.validator_tokens.iter() {
            if constant_time_eq(token.as_bytes(), expected.as_bytes()) && matched.is_none() {
                matched = Some(validator.clone());
            }
        }
        matched.ok_or_else(|| {
            warn!("Rejected attestation with invalid token");
            ApiError::unauthenticated("invalid bearer token")
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: message.to_string(),
                code: code.to_string(),
            },
        }
    }

    fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    fn unauthenticated(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }
}

/// HTTP status for each protocol error
pub fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::Unauthorized | BridgeError::UnknownValidator { .. } => StatusCode::FORBIDDEN,
        BridgeError::Paused => StatusCode::LOCKED,
        BridgeError::VolumeExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        BridgeError::NotFound { .. } | BridgeError::ChainNotConfigured { .. } => {
            StatusCode::NOT_FOUND
        }
        BridgeError::DuplicateTransaction { .. }
        | BridgeError::DuplicateAttestation { .. }
        | BridgeError::AlreadyTerminal { .. }
        | BridgeError::TransactionExpired { .. }
        | BridgeError::TimeoutNotElapsed { .. } => StatusCode::CONFLICT,
        BridgeError::ChainInactive { .. }
        | BridgeError::InvalidAmount { .. }
        | BridgeError::BelowMinimumAmount { .. }
        | BridgeError::AboveMaximumAmount { .. }
        | BridgeError::InvalidAttestation { .. }
        | BridgeError::InvalidAddress { .. }
        | BridgeError::InvalidTransactionId { .. }
        | BridgeError::InvalidFeeConfig { .. }
        | BridgeError::InvalidValidatorSet { .. } => StatusCode::BAD_REQUEST,
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self::new(status_for(&err), err.code(), &err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_tx_id(raw: &str) -> Result<TxId, ApiError> {
    TxId::from_hex(raw).map_err(ApiError::from)
}

fn parse_chain(raw: &str) -> Result<ChainId, ApiError> {
    parse_chain_id(raw).map_err(|e| ApiError::bad_request(&e.to_string()))
}

// ============================================================================
// Health & Metrics
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub local_chain_id: ChainId,
    pub paused: bool,
    pub chains: usize,
    pub threshold: u64,
}

/// Health check endpoint handler
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.bridge.get_operational_status();
    Json(HealthResponse {
        status: "healthy".to_string(),
        local_chain_id: status.local_chain_id,
        paused: status.paused,
        chains: status.chain_count,
        threshold: status.threshold,
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe: at least one chain and a configured validator set
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let status = state.bridge.get_operational_status();
    if status.chain_count > 0 && status.threshold > 0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

/// Prometheus metrics endpoint
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    // Update gauges from current state
    let stats = state.bridge.get_bridge_stats();
    state
        .metrics
        .pending_transactions
        .set(stats.pending_transactions as i64);
    state.metrics.paused.set(state.bridge.is_paused() as i64);

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

// ============================================================================
// Queries
// ============================================================================

async fn get_status(State(state): State<AppState>) -> Json<OperationalStatus> {
    Json(state.bridge.get_operational_status())
}

async fn get_stats(State(state): State<AppState>) -> Json<BridgeStats> {
    Json(state.bridge.get_bridge_stats())
}

async fn get_fees(State(state): State<AppState>) -> Json<FeeInfo> {
    Json(state.bridge.get_fee_info())
}

async fn list_chains(State(state): State<AppState>) -> Json<Vec<ChainStatus>> {
    Json(state.bridge.get_all_chain_status())
}

async fn get_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> ApiResult<ChainStatus> {
    let chain_id = parse_chain(&chain_id)?;
    Ok(Json(state.bridge.get_chain_status(&chain_id)?))
}

async fn get_validators(State(state): State<AppState>) -> Json<ValidatorSet> {
    Json(state.bridge.get_validator_set())
}

async fn active_transactions(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.bridge.get_active_transactions())
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
) -> ApiResult<Transaction> {
    let tx_id = parse_tx_id(&tx_id)?;
    Ok(Json(state.bridge.get_transaction(&tx_id)?))
}

/// Maximum records per `/events` page
const MAX_EVENTS_PAGE: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Return records with a sequence strictly greater than this
    pub after: Option<u64>,
    pub limit: Option<usize>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<EventRecord>> {
    let limit = query.limit.unwrap_or(100).min(MAX_EVENTS_PAGE);
    Json(state.events.events_since(query.after.unwrap_or(0), limit))
}

// ============================================================================
// User & Validator Submissions
// ============================================================================

/// Lock observed on the source chain, as reported by the watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateBody {
    pub sender: Address,
    pub dest_chain: ChainId,
    pub receiver: Address,
    pub token: Address,
    pub amount: Amount,
    pub nonce: u64,
}

impl InitiateBody {
    fn into_parts(self) -> (Address, InitiateRequest) {
        (
            self.sender,
            InitiateRequest {
                dest_chain: self.dest_chain,
                receiver: self.receiver,
                token: self.token,
                amount: self.amount,
                nonce: self.nonce,
            },
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiateResponse {
    pub tx_id: TxId,
}

async fn initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<InitiateBody>,
) -> Result<(StatusCode, Json<InitiateResponse>), ApiError> {
    state.authorize_watcher(&headers)?;
    let (sender, request) = body.into_parts();
    let tx_id = state
        .bridge
        .initiate(&sender, request)
        .map_err(|e| state.reject(e))?;
    Ok((StatusCode::CREATED, Json(InitiateResponse { tx_id })))
}

async fn attest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tx_id): Path<String>,
    Json(payload): Json<AttestationPayload>,
) -> ApiResult<AttestationOutcome> {
    let validator = state.authorize_validator(&headers)?;
    if payload.validator != validator {
        warn!(
            authenticated = %validator,
            claimed = %payload.validator,
            "Rejected attestation for another validator"
        );
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "validator_mismatch",
            "token was not issued to this validator",
        ));
    }
    let tx_id = parse_tx_id(&tx_id)?;
    let result = state.bridge.attest(&tx_id, &payload);

    let label = match &result {
        Ok(AttestationOutcome::Released { .. }) => "released",
        Ok(AttestationOutcome::Recorded { .. }) => "recorded",
        Ok(AttestationOutcome::Duplicate) => "duplicate",
        Ok(AttestationOutcome::AlreadyCompleted) => "already_completed",
        Err(_) => "rejected",
    };
    state
        .metrics
        .attestations_total
        .with_label_values(&[label])
        .inc();

    Ok(Json(result.map_err(|e| state.reject(e))?))
}

async fn claim_refund(
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
) -> ApiResult<Transaction> {
    let tx_id = parse_tx_id(&tx_id)?;
    Ok(Json(
        state
            .bridge
            .claim_refund(&tx_id)
            .map_err(|e| state.reject(e))?,
    ))
}

// ============================================================================
// Admin
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub address: Address,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSetBody {
    pub validators: Vec<ValidatorEntry>,
    pub threshold: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdBody {
    pub threshold: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

fn ack() -> Json<AckResponse> {
    Json(AckResponse { ok: true })
}

async fn admin_pause(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<AckResponse> {
    let caller = state.authorize(&headers)?;
    state.bridge.pause(&caller).map_err(|e| state.reject(e))?;
    Ok(ack())
}

async fn admin_unpause(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<AckResponse> {
    let caller = state.authorize(&headers)?;
    state.bridge.unpause(&caller).map_err(|e| state.reject(e))?;
    Ok(ack())
}

async fn admin_configure_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chain_id): Path<String>,
    Json(update): Json<ChainUpdate>,
) -> ApiResult<ChainStatus> {
    let caller = state.authorize(&headers)?;
    let chain_id = parse_chain(&chain_id)?;
    state
        .bridge
        .configure_chain(&caller, chain_id, update)
        .map_err(|e| state.reject(e))?;
    Ok(Json(state.bridge.get_chain_status(&chain_id)?))
}

async fn admin_set_fees(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(config): Json<FeeConfig>,
) -> ApiResult<FeeInfo> {
    let caller = state.authorize(&headers)?;
    state
        .bridge
        .set_fee_config(&caller, config)
        .map_err(|e| state.reject(e))?;
    Ok(Json(state.bridge.get_fee_info()))
}

async fn admin_set_validators(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ValidatorSetBody>,
) -> ApiResult<ValidatorSet> {
    let caller = state.authorize(&headers)?;
    let set: Vec<(Address, u32)> = body
        .validators
        .into_iter()
        .map(|v| (v.address, v.weight))
        .collect();
    state
        .bridge
        .set_validators(&caller, &set, body.threshold)
        .map_err(|e| state.reject(e))?;
    Ok(Json(state.bridge.get_validator_set()))
}

async fn admin_add_validator(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(entry): Json<ValidatorEntry>,
) -> ApiResult<ValidatorSet> {
    let caller = state.authorize(&headers)?;
    state
        .bridge
        .add_validator(&caller, entry.address, entry.weight)
        .map_err(|e| state.reject(e))?;
    Ok(Json(state.bridge.get_validator_set()))
}

async fn admin_remove_validator(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(address): Path<String>,
) -> ApiResult<ValidatorSet> {
    let caller = state.authorize(&headers)?;
    let address = Address::new(address)?;
    state
        .bridge
        .remove_validator(&caller, &address)
        .map_err(|e| state.reject(e))?;
    Ok(Json(state.bridge.get_validator_set()))
}

async fn admin_set_threshold(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ThresholdBody>,
) -> ApiResult<ValidatorSet> {
    let caller = state.authorize(&headers)?;
    state
        .bridge
        .set_threshold(&caller, body.threshold)
        .map_err(|e| state.reject(e))?;
    Ok(Json(state.bridge.get_validator_set()))
}

// ============================================================================
// Server
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .route("/status", get(get_status))
        .route("/stats", get(get_stats))
        .route("/fees", get(get_fees))
        .route("/chains", get(list_chains))
        .route("/chains/{chain_id}", get(get_chain))
        .route("/validators", get(get_validators))
        .route("/events", get(list_events))
        .route("/transactions", post(initiate))
        .route("/transactions/active", get(active_transactions))
        .route("/transactions/{tx_id}", get(get_transaction))
        .route("/transactions/{tx_id}/attestations", post(attest))
        .route("/transactions/{tx_id}/refund", post(claim_refund))
        .route("/admin/pause", post(admin_pause))
        .route("/admin/unpause", post(admin_unpause))
        .route("/admin/chains/{chain_id}", put(admin_configure_chain))
        .route("/admin/fees", put(admin_set_fees))
        .route(
            "/admin/validators",
            put(admin_set_validators).post(admin_add_validator),
        )
        .route("/admin/validators/{address}", delete(admin_remove_validator))
        .route("/admin/threshold", put(admin_set_threshold))
        .with_state(state)
}

/// Start the HTTP server; returns once `shutdown` fires and in-flight
/// requests have finished
pub async fn start_server(
    bind_address: &str,
    port: u16,
    state: AppState,
    mut shutdown: mpsc::Receiver<()>,
) -> eyre::Result<()> {
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("API server listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(|e| {
            error!(error = %e, "API server failed");
            eyre!("API server failed: {}", e)
        })?;

    Ok(())
}
