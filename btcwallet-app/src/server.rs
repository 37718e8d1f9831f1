//! HTTP API over the wallet services
//!
//! Every handler returns JSON. Failures carry the error's category and its
//! user-facing message, with the status code chosen by [`ApiError`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use btcwallet_core::bitcoin_utils::requested_amount_sats;
use btcwallet_core::{
    BtcWalletError, ErrorCategory, FeeEstimateReport, NetworkSnapshot, TransactionRecord, TransactionStatus,
    WalletBalance, WalletSummary, VERSION,
};

use crate::context::AppContext;

pub type SharedContext = Arc<AppContext>;

/// A wallet error on its way to an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BtcWalletError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.category() {
            ErrorCategory::InvalidInput | ErrorCategory::InvalidTransaction => StatusCode::BAD_REQUEST,
            ErrorCategory::Balance if self.0.is_wallet_not_found() => StatusCode::NOT_FOUND,
            ErrorCategory::Network => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BtcWalletError> for ApiError {
    fn from(err: BtcWalletError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = json!({
            "error": self.0.category().as_str(),
            "message": self.0.user_message(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(alias = "key")]
    pub private_key: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub wallet_id: String,
    pub recipient_address: String,
    pub amount_btc: Decimal,
    #[serde(default = "default_simulate")]
    pub simulate: bool,
}

fn default_simulate() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub amount_btc: String,
    pub fee_btc: String,
    pub total_amount: u64,
    pub raw_hex: String,
}

impl From<TransactionRecord> for TransactionResponse {
    fn from(record: TransactionRecord) -> Self {
        Self {
            amount_btc: record.amount_btc(),
            fee_btc: record.fee_btc(),
            total_amount: record.total_amount(),
            raw_hex: record.raw_hex(),
            record,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub wallet_id: String,
    pub confirmed: u64,
    pub unconfirmed: u64,
    pub total: u64,
    pub confirmed_btc: String,
    pub unconfirmed_btc: String,
    pub total_btc: String,
    pub utxo_count: usize,
    pub chain_height: u64,
    pub last_updated: String,
}

impl From<WalletBalance> for BalanceResponse {
    fn from(balance: WalletBalance) -> Self {
        Self {
            wallet_id: balance.wallet_id().to_string(),
            confirmed: balance.confirmed(),
            unconfirmed: balance.unconfirmed(),
            total: balance.total(),
            confirmed_btc: balance.confirmed_btc(),
            unconfirmed_btc: balance.unconfirmed_btc(),
            total_btc: balance.total_btc(),
            utxo_count: balance.utxo_count(),
            chain_height: balance.chain_height(),
            last_updated: balance.last_updated().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddressValidation {
    pub address: String,
    pub valid: bool,
    pub network: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionStatusResponse {
    pub transaction_id: String,
    pub status: TransactionStatus,
}

/// All API routes with permissive CORS
pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/wallet/generate", post(generate_wallet))
        .route("/api/wallet/generate-mnemonic", post(generate_wallet_with_mnemonic))
        .route("/api/wallet/import", post(import_wallet))
        .route("/api/wallet/validate/:address", get(validate_address))
        .route("/api/transaction/create", post(create_transaction))
        .route("/api/transaction/fee-estimate", get(fee_estimate))
        .route("/api/transaction/wallet/:wallet_id", get(list_transactions))
        .route("/api/transaction/:txid/status", get(transaction_status))
        .route("/api/balance/:wallet_id", get(wallet_balance))
        .route("/api/network/info", get(network_info))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ctx)
}

/// Bind and serve until the process is stopped
pub async fn serve(ctx: SharedContext, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "btcwallet",
        "version": VERSION,
    }))
}

async fn generate_wallet(State(ctx): State<SharedContext>) -> ApiResult<(StatusCode, Json<WalletSummary>)> {
    let wallet = ctx.wallets.generate_wallet()?;
    Ok((StatusCode::CREATED, Json(wallet.summary())))
}

/// The mnemonic is not part of the response; only the CLI reveals it
async fn generate_wallet_with_mnemonic(
    State(ctx): State<SharedContext>,
) -> ApiResult<(StatusCode, Json<WalletSummary>)> {
    let (wallet, _mnemonic) = ctx.wallets.generate_wallet_with_mnemonic()?;
    Ok((StatusCode::CREATED, Json(wallet.summary())))
}

async fn import_wallet(
    State(ctx): State<SharedContext>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<(StatusCode, Json<WalletSummary>)> {
    let wallet = ctx.wallets.import_wallet(&request.private_key)?;
    Ok((StatusCode::CREATED, Json(wallet.summary())))
}

async fn validate_address(State(ctx): State<SharedContext>, Path(address): Path<String>) -> Json<AddressValidation> {
    let store = ctx.wallets.store();
    Json(AddressValidation {
        valid: store.is_valid_address(&address),
        network: store.network().to_string(),
        address,
    })
}

async fn create_transaction(
    State(ctx): State<SharedContext>,
    Json(request): Json<CreateTransactionRequest>,
) -> ApiResult<(StatusCode, Json<TransactionResponse>)> {
    let amount = requested_amount_sats(request.amount_btc)?;
    let record = ctx
        .transactions
        .create_transaction(&request.wallet_id, &request.recipient_address, amount, request.simulate)
        .await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn fee_estimate(State(ctx): State<SharedContext>) -> Json<FeeEstimateReport> {
    Json(ctx.transactions.fee_estimate_report())
}

async fn transaction_status(
    State(ctx): State<SharedContext>,
    Path(txid): Path<String>,
) -> Json<TransactionStatusResponse> {
    Json(TransactionStatusResponse {
        status: ctx.transactions.get_transaction_status(&txid),
        transaction_id: txid,
    })
}

async fn list_transactions(
    State(ctx): State<SharedContext>,
    Path(wallet_id): Path<String>,
) -> Json<Vec<TransactionResponse>> {
    let records = ctx.transactions.list_transactions(&wallet_id);
    Json(records.into_iter().map(TransactionResponse::from).collect())
}

async fn wallet_balance(
    State(ctx): State<SharedContext>,
    Path(wallet_id): Path<String>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = ctx.balances.get_wallet_balance(&wallet_id).await?;
    Ok(Json(balance.into()))
}

async fn network_info(State(ctx): State<SharedContext>) -> Json<NetworkSnapshot> {
    Json(ctx.monitor.snapshot())
}
