#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Gantry bridge node.
//!
//! Hosts the verification engine behind a relayer-facing HTTP surface:
//! proposal submission, execution-status queries, health and metrics.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use config::NodeConfig;
use gantry_bridge::{
    Engine, EngineError, LoggingHandler, OpenAccess, ProposalOutcome, ResourceRegistry, RootOracle,
};
use gantry_core::{DomainId, Proposal, ResourceId, RouteTable, SecurityModel};
use gantry_storage::NonceStore;
use prometheus::{Encoder, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Gantry bridge node")]
pub struct Settings {
    #[arg(long, env = "GANTRY_DB_PATH", default_value = "./data/gantry")]
    pub db_path: String,
    #[arg(long, env = "GANTRY_LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,
    /// Domain id this node executes into.
    #[arg(long, env = "GANTRY_DOMAIN_ID", default_value_t = 1)]
    pub domain_id: u8,
    /// Path to the routes/verifier-sets config file. Optional; without
    /// it the node starts empty and rejects every proposal.
    #[arg(long, env = "GANTRY_CONFIG_PATH")]
    pub config_path: Option<String>,
}

#[derive(Debug, Error)]
enum NodeError {
    #[error("storage error: {0}")]
    Storage(#[from] gantry_storage::NonceStoreError),
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("server error: {0}")]
    Server(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
struct Metrics {
    registry: Registry,
    uptime_ms: IntGauge,
    executed: IntGauge,
    skipped: IntGauge,
    verification_failed: IntGauge,
    execution_failed: IntGauge,
    rollbacks: IntGauge,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();
        let gauge = |name: &str, help: &str| {
            let gauge = IntGauge::with_opts(Opts::new(name, help)).expect("gauge opts");
            registry
                .register(Box::new(gauge.clone()))
                .expect("register gauge");
            gauge
        };
        let uptime_ms = gauge("gantry_uptime_ms", "Uptime of the bridge node in milliseconds");
        let executed = gauge("gantry_proposals_executed", "Proposals executed exactly once");
        let skipped = gauge(
            "gantry_proposals_skipped",
            "Proposals skipped as already executed",
        );
        let verification_failed = gauge(
            "gantry_proposals_verification_failed",
            "Proposals rejected by verification",
        );
        let execution_failed = gauge(
            "gantry_proposals_execution_failed",
            "Handler dispatches that failed",
        );
        let rollbacks = gauge(
            "gantry_proposals_rollbacks",
            "Nonce marks rolled back after a failed dispatch",
        );
        Self {
            registry,
            uptime_ms,
            executed,
            skipped,
            verification_failed,
            execution_failed,
            rollbacks,
        }
    }
}

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    start_instant: Instant,
    metrics: Metrics,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "node terminated with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), NodeError> {
    let settings = Settings::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    info!(?settings, "starting gantry-node");
    let db = sled::open(&settings.db_path)?;
    let nonces = NonceStore::open(&db)?;

    let node_config = match &settings.config_path {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    let routes: RouteTable = node_config.route_table()?;

    let oracle = RootOracle::new();
    for (model, sources) in node_config.verifier_sources()? {
        info!(model = %model, verifiers = sources.len(), "installing verifier set");
        oracle.set_sources(model, sources);
    }

    let registry = Arc::new(ResourceRegistry::new());
    for resource in node_config.resource_ids()? {
        info!(resource = %resource, "registering default handler");
        registry.register(resource, Arc::new(LoggingHandler));
    }

    let engine = Arc::new(Engine::new(
        DomainId(settings.domain_id),
        routes,
        oracle,
        registry,
        nonces,
        Arc::new(OpenAccess),
    ));

    let state = AppState {
        engine,
        start_instant: Instant::now(),
        metrics: Metrics::new(),
    };

    let app = Router::new()
        .route("/proposals", post(submit_proposals))
        .route("/executed/:domain/:nonce", get(executed))
        .route("/healthz", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    let addr: SocketAddr = settings.listen_addr.parse().expect("invalid listen addr");
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| NodeError::Server(e.to_string()))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Deserialize)]
struct ProposalDto {
    origin_domain: u8,
    security_model: u8,
    deposit_nonce: u64,
    resource_id: String,
    data: String,
    storage_proof: Vec<String>,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    block_ref: u64,
    account_proof: Vec<String>,
    proposals: Vec<ProposalDto>,
}

#[derive(Serialize)]
struct OutcomeDto {
    proposal_id: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn decode_hex_field(field: &str, raw: &str) -> Result<Vec<u8>, (StatusCode, Json<ErrorResponse>)> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(stripped).map_err(|err| bad_request(format!("invalid hex in {field}: {err}")))
}

fn decode_proposal(dto: &ProposalDto) -> Result<Proposal, (StatusCode, Json<ErrorResponse>)> {
    let resource_id = ResourceId::from_hex(&dto.resource_id)
        .map_err(|err| bad_request(format!("invalid resource id: {err}")))?;
    let data = decode_hex_field("data", &dto.data)?;
    let storage_proof = dto
        .storage_proof
        .iter()
        .map(|node| decode_hex_field("storage_proof", node))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Proposal {
        origin_domain: DomainId(dto.origin_domain),
        security_model: SecurityModel(dto.security_model),
        deposit_nonce: dto.deposit_nonce,
        resource_id,
        data,
        storage_proof,
    })
}

fn outcome_dto(outcome: &ProposalOutcome) -> OutcomeDto {
    match outcome {
        ProposalOutcome::Executed {
            proposal_id,
            output,
        } => OutcomeDto {
            proposal_id: hex::encode(proposal_id.0),
            status: "executed",
            output: Some(hex::encode(output)),
            detail: None,
        },
        ProposalOutcome::Skipped { proposal_id } => OutcomeDto {
            proposal_id: hex::encode(proposal_id.0),
            status: "skipped",
            output: None,
            detail: None,
        },
        ProposalOutcome::VerificationFailed { proposal_id, error } => OutcomeDto {
            proposal_id: hex::encode(proposal_id.0),
            status: "verification_failed",
            output: None,
            detail: Some(error.to_string()),
        },
        ProposalOutcome::ExecutionFailed { proposal_id, error } => OutcomeDto {
            proposal_id: hex::encode(proposal_id.0),
            status: "execution_failed",
            output: None,
            detail: Some(error.to_string()),
        },
    }
}

async fn submit_proposals(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<Vec<OutcomeDto>>, (StatusCode, Json<ErrorResponse>)> {
    let proposals = request
        .proposals
        .iter()
        .map(decode_proposal)
        .collect::<Result<Vec<_>, _>>()?;
    let account_proof = request
        .account_proof
        .iter()
        .map(|node| decode_hex_field("account_proof", node))
        .collect::<Result<Vec<_>, _>>()?;

    match state
        .engine
        .execute_proposals(&proposals, &account_proof, request.block_ref)
    {
        Ok(outcomes) => Ok(Json(outcomes.iter().map(outcome_dto).collect())),
        Err(EngineError::EmptyBatch) => Err(bad_request("empty proposal batch")),
        Err(err) => {
            error!(error = %err, "proposal batch failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            ))
        }
    }
}

#[derive(Serialize)]
struct ExecutedResponse {
    domain: u8,
    nonce: u64,
    executed: bool,
}

async fn executed(
    State(state): State<AppState>,
    Path((domain, nonce)): Path<(u8, u64)>,
) -> Result<Json<ExecutedResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.engine.is_proposal_executed(DomainId(domain), nonce) {
        Ok(executed) => Ok(Json(ExecutedResponse {
            domain,
            nonce,
            executed,
        })),
        Err(err) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )),
    }
}

async fn health() -> impl IntoResponse {
    "ok"
}

#[derive(Serialize)]
struct StatusResponse {
    service: ServiceInfo,
    uptime_ms: u64,
    destination_domain: u8,
    counters: gantry_bridge::EngineMetricsSnapshot,
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_millis = state.start_instant.elapsed().as_millis();
    let uptime_ms = u64::try_from(uptime_millis).unwrap_or(u64::MAX);
    Json(StatusResponse {
        service: ServiceInfo {
            name: "gantry-node",
            version: env!("CARGO_PKG_VERSION"),
        },
        uptime_ms,
        destination_domain: state.engine.destination_domain().0,
        counters: state.engine.metrics().snapshot(),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_millis = state.start_instant.elapsed().as_millis();
    let uptime_ms = i64::try_from(uptime_millis).unwrap_or(i64::MAX);
    state.metrics.uptime_ms.set(uptime_ms);

    let snapshot = state.engine.metrics().snapshot();
    let to_gauge = |count: u64| i64::try_from(count).unwrap_or(i64::MAX);
    state.metrics.executed.set(to_gauge(snapshot.executed));
    state.metrics.skipped.set(to_gauge(snapshot.skipped));
    state
        .metrics
        .verification_failed
        .set(to_gauge(snapshot.verification_failed));
    state
        .metrics
        .execution_failed
        .set(to_gauge(snapshot.execution_failed));
    state.metrics.rollbacks.set(to_gauge(snapshot.rollbacks));

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encode metrics");
    (StatusCode::OK, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exports_every_engine_counter() {
        let metrics = Metrics::new();
        metrics.executed.set(2);
        metrics.rollbacks.set(3);

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&metrics.registry.gather(), &mut buffer)
            .expect("encode metrics");
        let text = String::from_utf8(buffer).expect("utf8");

        assert!(text.contains("gantry_proposals_executed 2"));
        assert!(text.contains("gantry_proposals_rollbacks 3"));
        assert!(text.contains("gantry_proposals_skipped 0"));
        assert!(text.contains("gantry_proposals_verification_failed 0"));
        assert!(text.contains("gantry_proposals_execution_failed 0"));
    }
}
