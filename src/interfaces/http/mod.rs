//! JSON-over-HTTP boundary.
//!
//! Decodes requests, converts decimal amounts to minor units and maps ledger outcomes to
//! status codes. All ledger semantics live in the application layer.

pub mod dto;

use crate::application::query::QueryService;
use crate::application::transfer::TransferEngine;
use crate::domain::account::Address;
use crate::error::{ErrorCategory, LedgerError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dto::{
    BalanceResponse, ListParams, SendRequest, SendResponse, TransferDto, format_minor_units,
    to_minor_units,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::error;

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TransferEngine>,
    pub queries: QueryService,
    pub transfer_timeout: Duration,
    pub query_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/wallet/:address/balance", get(get_balance))
        .route("/api/send", post(post_send))
        .route("/api/transactions", get(list_transactions))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body `{"error": "..."}` with a status derived from the ledger outcome.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            ErrorCategory::ContentionExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &err {
            LedgerError::SameAddress => "from must differ from to",
            LedgerError::InvalidAmount(_) => "amount must be > 0",
            LedgerError::MalformedAddress(_) => "invalid address format",
            LedgerError::WalletNotFound => "wallet not found",
            LedgerError::InsufficientFunds { .. } => "insufficient funds",
            LedgerError::Timeout => "request timed out",
            LedgerError::ContentionExhausted { .. } => "ledger busy, retry later",
            LedgerError::Internal(source) => {
                error!(error = %source, "ledger storage failure");
                "internal error"
            }
        };
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| LedgerError::Timeout)?
}

async fn get_balance(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let address = Address::parse(&raw)?;
    let balance = with_deadline(state.query_timeout, state.queries.balance(&address)).await?;
    Ok(Json(BalanceResponse {
        address: address.to_string(),
        balance: format_minor_units(balance),
    }))
}

async fn post_send(
    State(state): State<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_request("invalid json"))?;
    let from = Address::parse(&request.from)?;
    let to = Address::parse(&request.to)?;
    let amount = to_minor_units(request.amount)?;

    let deadline = Instant::now() + state.transfer_timeout;
    let record = state
        .engine
        .transfer(&from, &to, amount, Some(deadline))
        .await?;

    Ok(Json(SendResponse {
        status: "ok".to_string(),
        id: record.id,
    }))
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TransferDto>>, ApiError> {
    let limit = match params.count.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| ApiError::bad_request("invalid count"))?,
        ),
    };

    let records = with_deadline(state.query_timeout, state.queries.recent_transfers(limit)).await?;
    Ok(Json(records.into_iter().map(TransferDto::from).collect()))
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transfer::RetryPolicy;
    use crate::domain::account::Account;
    use crate::domain::ports::LedgerStore;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn addr(c: char) -> String {
        c.to_string().repeat(64)
    }

    async fn app() -> Router {
        let store = Arc::new(InMemoryLedgerStore::new());
        store
            .populate(&[
                Account::new(Address::parse(&addr('a')).unwrap(), 10_000),
                Account::new(Address::parse(&addr('b')).unwrap(), 10_000),
            ])
            .await
            .unwrap();
        router(AppState {
            engine: Arc::new(TransferEngine::new(store.clone(), RetryPolicy::default())),
            queries: QueryService::new(store),
            transfer_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(5),
        })
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn send(body: &str) -> Request<Body> {
        Request::post("/api/send")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn balance_req(c: char) -> Request<Body> {
        get_req(&format!("/api/wallet/{}/balance", addr(c)))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_balance_endpoint() {
        let app = app().await;

        let (status, body) = call(&app, balance_req('a')).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], "100.00");

        let (status, body) = call(&app, balance_req('c')).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "wallet not found");

        let (status, _) = call(&app, get_req("/api/wallet/nope/balance")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_then_list() {
        let app = app().await;

        let payload = format!(
            r#"{{"from":"{}","to":"{}","amount":3.5}}"#,
            addr('a'),
            addr('b')
        );
        let (status, body) = call(&app, send(&payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (_, body) = call(&app, balance_req('a')).await;
        assert_eq!(body["balance"], "96.50");

        let (status, body) = call(&app, get_req("/api/transactions?count=5")).await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["amount"], "3.50");
        assert_eq!(items[0]["from"], addr('a'));
    }

    #[tokio::test]
    async fn test_send_error_mapping() {
        let app = app().await;

        let (status, body) = call(&app, send("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid json");

        let same = format!(r#"{{"from":"{0}","to":"{0}","amount":1}}"#, addr('a'));
        let (status, body) = call(&app, send(&same)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "from must differ from to");

        let bad_addr = format!(r#"{{"from":"abc","to":"{}","amount":1}}"#, addr('b'));
        let (status, body) = call(&app, send(&bad_addr)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid address format");

        let zero = format!(
            r#"{{"from":"{}","to":"{}","amount":0}}"#,
            addr('a'),
            addr('b')
        );
        let (status, _) = call(&app, send(&zero)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let too_much = format!(
            r#"{{"from":"{}","to":"{}","amount":1000}}"#,
            addr('a'),
            addr('b')
        );
        let (status, body) = call(&app, send(&too_much)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "insufficient funds");

        let unknown = format!(
            r#"{{"from":"{}","to":"{}","amount":1}}"#,
            addr('a'),
            addr('c')
        );
        let (status, _) = call(&app, send(&unknown)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_rejects_non_integer_count() {
        let app = app().await;
        let (status, body) = call(&app, get_req("/api/transactions?count=ten")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid count");

        let (status, body) = call(&app, get_req("/api/transactions")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());
    }

    #[test]
    fn test_status_mapping() {
        let timeout = ApiError::from(LedgerError::Timeout);
        assert_eq!(timeout.status, StatusCode::GATEWAY_TIMEOUT);
        let busy = ApiError::from(LedgerError::ContentionExhausted { attempts: 10 });
        assert_eq!(busy.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
