//! HTTP API for SURETY node

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surety_core::{
    AccountId, Amount, ErrorCategory, FlightKey, Hash, OracleIndex, SuretyError, SuretyResult,
    Timestamp,
};
use surety_insurance::{Airline, FlightView, InsurancePolicy, RegistrationOutcome, SuretyStatus};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::runtime::SuretyRuntime;

/// API state containing node runtime
pub type ApiState = Arc<SuretyRuntime>;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

/// HTTP status for a rejected operation
pub fn error_status(error: &SuretyError) -> StatusCode {
    match error.category() {
        ErrorCategory::Authorization => StatusCode::FORBIDDEN,
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Protocol => StatusCode::CONFLICT,
        ErrorCategory::Resource => match error {
            SuretyError::NothingOwed(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::PAYMENT_REQUIRED,
        },
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T: Serialize>(result: SuretyResult<T>, success: StatusCode) -> Reply<T> {
    match result {
        Ok(data) => (success, Json(ApiResponse::ok(data))),
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                warn!("Request failed: {}", e);
            }
            (status, Json(ApiResponse::err(e)))
        }
    }
}

fn bad_request<T: Serialize>(error: impl ToString) -> Reply<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::err(error)))
}

fn not_found<T: Serialize>(error: impl ToString) -> Reply<T> {
    (StatusCode::NOT_FOUND, Json(ApiResponse::err(error)))
}

fn parse_account(value: &str) -> Result<AccountId, String> {
    AccountId::from_hex(value).map_err(|_| format!("Invalid account id: {}", value))
}

fn parse_amount(value: &str) -> Result<Amount, String> {
    value
        .parse::<u128>()
        .map(Amount::new)
        .map_err(|_| format!("Invalid amount: {}", value))
}

fn lookup_flight(runtime: &SuretyRuntime, id: &str) -> Result<FlightKey, Reply<()>> {
    let id = Hash::from_hex(id).map_err(|_| bad_request("Invalid flight id"))?;
    runtime
        .surety()
        .flight_by_id(&id)
        .map(|f| f.key)
        .ok_or_else(|| not_found(format!("Unknown flight: {}", id)))
}

/// Re-type an error reply produced before the payload type was known
fn retype<T: Serialize>(reply: Reply<()>) -> Reply<T> {
    let (status, Json(body)) = reply;
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: body.error,
        }),
    )
}

/// Operating switch request
#[derive(Debug, Deserialize)]
pub struct OperatingStatusRequest {
    pub caller: String,
    pub operational: bool,
}

/// Airline registration request
#[derive(Debug, Deserialize)]
pub struct RegisterAirlineRequest {
    pub airline: String,
    pub name: String,
    pub requested_by: String,
}

/// Ante payment
#[derive(Debug, Deserialize)]
pub struct FundRequest {
    pub amount: String,
}

/// Flight registration request
#[derive(Debug, Deserialize)]
pub struct RegisterFlightRequest {
    pub airline: String,
    pub designator: String,
    pub timestamp: u64,
}

/// Status request body
#[derive(Debug, Deserialize)]
pub struct StatusRequestBody {
    pub requester: String,
}

/// Issued oracle request
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusRequestResponse {
    pub flight_id: String,
    pub index: OracleIndex,
}

/// Insurance purchase
#[derive(Debug, Deserialize)]
pub struct BuyInsuranceRequest {
    pub passenger: String,
    pub flight_id: String,
    pub stake: String,
}

/// Payout balance
#[derive(Debug, Serialize, Deserialize)]
pub struct PayoutResponse {
    pub passenger: String,
    pub amount: String,
}

/// Oracle registration request
#[derive(Debug, Deserialize)]
pub struct RegisterOracleRequest {
    pub oracle: String,
    pub fee: String,
}

/// Oracle identity and its indices
#[derive(Debug, Serialize, Deserialize)]
pub struct OracleResponseView {
    pub oracle: String,
    pub indices: Vec<OracleIndex>,
}

/// Oracle report
#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub oracle: String,
    pub flight_id: String,
    pub index: OracleIndex,
    pub status_code: u8,
}

/// Result of an oracle report
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponseView {
    pub resolved: bool,
    pub status_code: u8,
    pub support: usize,
}

/// Node status response
#[derive(Debug, Serialize)]
pub struct NodeStatusResponse {
    pub name: String,
    #[serde(flatten)]
    pub surety: SuretyStatus,
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    let enable_cors = state.config().api.enable_cors;

    let router = Router::new()
        // Health
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/admin/operating-status", post(set_operating_status))
        // Airlines
        .route("/airlines", get(list_airlines).post(register_airline))
        .route("/airlines/:id/fund", post(fund_airline))
        // Flights
        .route("/flights", get(list_flights).post(register_flight))
        .route("/flights/:id/status-request", post(request_status))
        // Insurance
        .route("/insurance", post(buy_insurance))
        .route("/insurance/:passenger/:flight", get(get_insurance))
        .route("/payouts/:passenger", get(get_payout))
        .route("/payouts/:passenger/withdraw", post(withdraw))
        // Oracles
        .route("/oracles", post(register_oracle))
        .route("/oracles/responses", post(submit_response))
        .route("/oracles/:id", get(get_oracle))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Node status
async fn status(State(runtime): State<ApiState>) -> impl IntoResponse {
    let status = NodeStatusResponse {
        name: runtime.config().name.clone(),
        surety: runtime.surety().status(),
    };
    Json(ApiResponse::ok(status))
}

async fn set_operating_status(
    State(runtime): State<ApiState>,
    Json(req): Json<OperatingStatusRequest>,
) -> Reply<bool> {
    let caller = match parse_account(&req.caller) {
        Ok(caller) => caller,
        Err(e) => return bad_request(e),
    };
    let result = runtime
        .surety()
        .set_operating_status(&caller, req.operational)
        .map(|_| req.operational);
    reply(result, StatusCode::OK)
}

async fn list_airlines(State(runtime): State<ApiState>) -> impl IntoResponse {
    Json(ApiResponse::<Vec<Airline>>::ok(runtime.surety().airlines()))
}

async fn register_airline(
    State(runtime): State<ApiState>,
    Json(req): Json<RegisterAirlineRequest>,
) -> Reply<RegistrationOutcome> {
    let (airline, requested_by) = match (parse_account(&req.airline), parse_account(&req.requested_by)) {
        (Ok(a), Ok(r)) => (a, r),
        (Err(e), _) | (_, Err(e)) => return bad_request(e),
    };
    reply(
        runtime.surety().register_airline(airline, &req.name, requested_by),
        StatusCode::OK,
    )
}

async fn fund_airline(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<FundRequest>,
) -> Reply<bool> {
    let (airline, amount) = match (parse_account(&id), parse_amount(&req.amount)) {
        (Ok(a), Ok(m)) => (a, m),
        (Err(e), _) | (_, Err(e)) => return bad_request(e),
    };
    reply(
        runtime.surety().fund_airline(airline, amount).map(|_| true),
        StatusCode::OK,
    )
}

async fn list_flights(State(runtime): State<ApiState>) -> impl IntoResponse {
    Json(ApiResponse::<Vec<FlightView>>::ok(runtime.surety().flight_catalog()))
}

async fn register_flight(
    State(runtime): State<ApiState>,
    Json(req): Json<RegisterFlightRequest>,
) -> Reply<FlightView> {
    let airline = match parse_account(&req.airline) {
        Ok(airline) => airline,
        Err(e) => return bad_request(e),
    };
    let result = runtime
        .surety()
        .register_flight(airline, &req.designator, Timestamp(req.timestamp))
        .map(|flight| FlightView::from(&flight));
    reply(result, StatusCode::CREATED)
}

async fn request_status(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequestBody>,
) -> Reply<StatusRequestResponse> {
    let requester = match parse_account(&req.requester) {
        Ok(requester) => requester,
        Err(e) => return bad_request(e),
    };
    let key = match lookup_flight(&runtime, &id) {
        Ok(key) => key,
        Err(e) => return retype(e),
    };
    let result = runtime
        .surety()
        .request_flight_status(&key, requester)
        .map(|index| StatusRequestResponse { flight_id: id, index });
    reply(result, StatusCode::ACCEPTED)
}

async fn buy_insurance(
    State(runtime): State<ApiState>,
    Json(req): Json<BuyInsuranceRequest>,
) -> Reply<InsurancePolicy> {
    let (passenger, stake) = match (parse_account(&req.passenger), parse_amount(&req.stake)) {
        (Ok(p), Ok(s)) => (p, s),
        (Err(e), _) | (_, Err(e)) => return bad_request(e),
    };
    let key = match lookup_flight(&runtime, &req.flight_id) {
        Ok(key) => key,
        Err(e) => return retype(e),
    };
    reply(
        runtime.surety().buy_insurance(passenger, &key, stake),
        StatusCode::OK,
    )
}

async fn get_insurance(
    State(runtime): State<ApiState>,
    Path((passenger, flight)): Path<(String, String)>,
) -> Reply<InsurancePolicy> {
    let passenger = match parse_account(&passenger) {
        Ok(passenger) => passenger,
        Err(e) => return bad_request(e),
    };
    let key = match lookup_flight(&runtime, &flight) {
        Ok(key) => key,
        Err(e) => return retype(e),
    };
    match runtime.surety().insurance(&passenger, &key) {
        Some(policy) => (StatusCode::OK, Json(ApiResponse::ok(policy))),
        None => not_found("No policy"),
    }
}

async fn get_payout(
    State(runtime): State<ApiState>,
    Path(passenger): Path<String>,
) -> Reply<PayoutResponse> {
    match parse_account(&passenger) {
        Ok(account) => {
            let response = PayoutResponse {
                passenger: account.to_hex(),
                amount: runtime.surety().payout_owed(&account).0.to_string(),
            };
            (StatusCode::OK, Json(ApiResponse::ok(response)))
        }
        Err(e) => bad_request(e),
    }
}

async fn withdraw(
    State(runtime): State<ApiState>,
    Path(passenger): Path<String>,
) -> Reply<PayoutResponse> {
    let account = match parse_account(&passenger) {
        Ok(account) => account,
        Err(e) => return bad_request(e),
    };
    let result = runtime.surety().withdraw(&account).map(|amount| PayoutResponse {
        passenger: account.to_hex(),
        amount: amount.0.to_string(),
    });
    reply(result, StatusCode::OK)
}

async fn register_oracle(
    State(runtime): State<ApiState>,
    Json(req): Json<RegisterOracleRequest>,
) -> Reply<OracleResponseView> {
    let (oracle, fee) = match (parse_account(&req.oracle), parse_amount(&req.fee)) {
        (Ok(o), Ok(f)) => (o, f),
        (Err(e), _) | (_, Err(e)) => return bad_request(e),
    };
    let result = runtime
        .surety()
        .register_oracle(oracle, fee)
        .map(|indices| OracleResponseView {
            oracle: oracle.to_hex(),
            indices,
        });
    reply(result, StatusCode::CREATED)
}

async fn get_oracle(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
) -> Reply<OracleResponseView> {
    let oracle = match parse_account(&id) {
        Ok(oracle) => oracle,
        Err(e) => return bad_request(e),
    };
    match runtime.surety().oracle_indices(&oracle) {
        Ok(indices) => (
            StatusCode::OK,
            Json(ApiResponse::ok(OracleResponseView {
                oracle: oracle.to_hex(),
                indices,
            })),
        ),
        Err(e) => not_found(e),
    }
}

async fn submit_response(
    State(runtime): State<ApiState>,
    Json(req): Json<SubmitResponseRequest>,
) -> Reply<SubmitResponseView> {
    let oracle = match parse_account(&req.oracle) {
        Ok(oracle) => oracle,
        Err(e) => return bad_request(e),
    };
    let key = match lookup_flight(&runtime, &req.flight_id) {
        Ok(key) => key,
        Err(e) => return retype(e),
    };
    let result = runtime
        .surety()
        .submit_oracle_code(oracle, &key, req.index, req.status_code)
        .map(|outcome| match outcome {
            surety_consensus::ResponseOutcome::Recorded { support, .. } => SubmitResponseView {
                resolved: false,
                status_code: req.status_code,
                support,
            },
            surety_consensus::ResponseOutcome::Resolved(resolution) => SubmitResponseView {
                resolved: true,
                status_code: resolution.status.code(),
                support: resolution.oracles.len(),
            },
        });
    reply(result, StatusCode::OK)
}

/// Start API server
pub async fn start_api_server(runtime: ApiState, listen_addr: &str) -> anyhow::Result<()> {
    let router = create_router(runtime);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("API server listening on {}", listen_addr);

    axum::serve(listener, router).await?;

    Ok(())
}
