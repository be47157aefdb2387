//! Webhook HTTP API
//!
//! `POST /webhook` accepts the Alchemy address-activity envelope, runs
//! admission inline and hands the fill to a background task, so the provider
//! gets an answer without waiting on any destination-chain RPC.
//! `GET /health` is a liveness check.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use ethereum_types::H160;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::error::ErrorKind;
use crate::orchestrator::{Admission, DepositEvent, FillOrchestrator, OriginChain};

const MAX_BODY_BYTES: u64 = 1024 * 1024;

// ============================================================================
// ENVELOPE
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event: WebhookEvent,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    /// Provider network name, e.g. `ETH_SEPOLIA`
    pub network: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub block: WebhookBlock,
}

#[derive(Debug, Deserialize)]
pub struct WebhookBlock {
    #[serde(default)]
    pub logs: Vec<WebhookLog>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookLog {
    pub transaction: WebhookTransaction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTransaction {
    pub hash: String,
    pub input_data: String,
    #[serde(default)]
    pub from: Option<WebhookAccount>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookAccount {
    pub address: H160,
}

impl WebhookEnvelope {
    /// The first log's transaction is the deposit.
    pub fn into_deposit_event(self) -> Result<DepositEvent, String> {
        let network = self.event.network;
        let log = self
            .event
            .data
            .block
            .logs
            .into_iter()
            .next()
            .ok_or_else(|| "envelope has no logs".to_string())?;
        Ok(DepositEvent {
            origin: OriginChain::Network(network),
            tx_hash: log.transaction.hash,
            calldata: log.transaction.input_data,
            from: log.transaction.from.map(|account| account.address),
        })
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    #[serde(rename = "depositHash", skip_serializing_if = "Option::is_none", default)]
    pub deposit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl WebhookResponse {
    fn new(status: &str, deposit_hash: Option<String>, error: Option<String>) -> Self {
        Self { status: status.to_string(), deposit_hash, error }
    }
}

#[derive(Debug)]
struct InvalidEnvelope(String);

impl warp::reject::Reject for InvalidEnvelope {}

// ============================================================================
// ROUTES
// ============================================================================

/// All API routes, with rejections rendered as JSON.
pub fn routes(
    orchestrator: Arc<FillOrchestrator>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let orchestrator_filter = warp::any().map(move || orchestrator.clone());

    let webhook = warp::path("webhook")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json::<WebhookEnvelope>())
        .and(orchestrator_filter)
        .and_then(webhook_handler);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

    webhook.or(health).recover(handle_rejection)
}

/// Serves the API until the process is stopped.
pub async fn run_server(orchestrator: Arc<FillOrchestrator>, host: String, port: u16) {
    // Fall back to loopback if host parsing fails.
    let ip: IpAddr = host.parse().unwrap_or(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
    info!("Webhook API listening on {}:{}", ip, port);
    warp::serve(routes(orchestrator)).run((ip, port)).await;
}

/// Admits the deposit and spawns its execution.
///
/// Fatal admission errors answer 200 with `status: "error"` so the provider
/// does not redeliver; retryable ones (store outage) answer 503.
async fn webhook_handler(
    envelope: WebhookEnvelope,
    orchestrator: Arc<FillOrchestrator>,
) -> Result<impl Reply, Rejection> {
    let event = envelope
        .into_deposit_event()
        .map_err(|e| warp::reject::custom(InvalidEnvelope(e)))?;
    let tx_hash = event.tx_hash.clone();
    debug!("Webhook delivered deposit {} from {:?}", tx_hash, event.origin);

    let (status, response) = match orchestrator.admit(&event).await {
        Ok(Admission::Accepted(deposit)) => {
            let worker = orchestrator.clone();
            // Outcome is logged and persisted by execute.
            tokio::spawn(async move {
                let _ = worker.execute(deposit).await;
            });
            (StatusCode::OK, WebhookResponse::new("accepted", Some(tx_hash), None))
        }
        Ok(Admission::Duplicate { .. }) => {
            (StatusCode::OK, WebhookResponse::new("duplicate", Some(tx_hash), None))
        }
        Err(e) => {
            warn!("Deposit {} rejected: {}", tx_hash, e.reason());
            let status = match e.kind() {
                ErrorKind::Fatal => StatusCode::OK,
                ErrorKind::Retryable => StatusCode::SERVICE_UNAVAILABLE,
            };
            (status, WebhookResponse::new("error", Some(tx_hash), Some(e.reason())))
        }
    };

    Ok(warp::reply::with_status(warp::reply::json(&response), status))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(InvalidEnvelope(msg)) = err.find::<InvalidEnvelope>() {
        (StatusCode::BAD_REQUEST, msg.clone())
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("malformed envelope: {}", e))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&WebhookResponse::new("error", None, Some(message))),
        status,
    ))
}
