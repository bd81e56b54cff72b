use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Bearer token accepted by `/api/verify-otp`.
pub const TX_TOKEN: &str = "TX_TOKEN";
/// One-time code accepted by `/api/verify-otp`.
pub const VALID_OTP: &str = "123456";
/// Enrollment transaction seeded at startup; consumed by the first enroll.
pub const ENROLLMENT_TX: &str = "enroll_tx_1";
/// Login transaction seeded at startup; consumed by the first reject.
pub const LOGIN_TX: &str = "login_tx_1";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenantInfo {
    pub name: String,
    pub friendly_name: String,
    pub picture_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RejectReason {
    pub id: String,
    pub label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceAccount {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub push_enabled: bool,
}

#[derive(Deserialize)]
pub struct VerifyOtp {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct Enroll {
    pub enrollment_tx_id: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct Reject {
    pub reason: Option<String>,
}

/// Error body in the shape the real API sends.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error_code: String,
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: &str) -> (StatusCode, Json<ApiError>) {
        let body = ApiError {
            error_code: code.to_string(),
            error: status.canonical_reason().unwrap_or_default().to_string(),
            message: message.to_string(),
            status_code: status.as_u16(),
        };
        (status, Json(body))
    }
}

#[derive(Default)]
pub struct Backend {
    pub enrollment_transactions: HashSet<String>,
    pub login_transactions: HashSet<String>,
    pub devices: HashMap<Uuid, DeviceAccount>,
}

pub type Db = Arc<RwLock<Backend>>;

pub fn app() -> Router {
    let mut backend = Backend::default();
    backend.enrollment_transactions.insert(ENROLLMENT_TX.to_string());
    backend.login_transactions.insert(LOGIN_TX.to_string());
    let db: Db = Arc::new(RwLock::new(backend));

    Router::new()
        .route("/api/tenant-info", get(tenant_info))
        .route("/api/verify-otp", post(verify_otp))
        .route("/api/reject-reasons", get(reject_reasons))
        .route("/api/enroll", post(enroll))
        .route(
            "/api/device-accounts/{id}",
            delete(delete_device).patch(update_device),
        )
        .route("/api/transactions/{id}/reject", post(reject_transaction))
        .route("/api/search", get(search))
        .route("/api/broken", get(broken))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn tenant_info() -> Json<TenantInfo> {
    Json(TenantInfo {
        name: "acme".to_string(),
        friendly_name: "Acme Corp".to_string(),
        picture_url: "http://x/p.png".to_string(),
    })
}

async fn verify_otp(headers: HeaderMap, Json(input): Json<VerifyOtp>) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {TX_TOKEN}").as_str());
    if !authorized {
        return ApiError::new(StatusCode::UNAUTHORIZED, "invalid_token", "invalid bearer token")
            .into_response();
    }
    if input.kind != "push_notification" || input.code != VALID_OTP {
        return ApiError::new(StatusCode::UNAUTHORIZED, "invalid_otp", "invalid otp code")
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn reject_reasons() -> Json<Vec<RejectReason>> {
    Json(vec![
        RejectReason {
            id: "hack".to_string(),
            label: "I did not request this".to_string(),
        },
        RejectReason {
            id: "mistake".to_string(),
            label: "I made a mistake".to_string(),
        },
    ])
}

async fn enroll(State(db): State<Db>, Json(input): Json<Enroll>) -> Response {
    let mut backend = db.write().await;
    if !backend.enrollment_transactions.remove(&input.enrollment_tx_id) {
        return ApiError::new(
            StatusCode::NOT_FOUND,
            "enrollment_transaction_not_found",
            "enrollment transaction not found",
        )
        .into_response();
    }
    let device = DeviceAccount {
        id: Uuid::new_v4(),
        name: input.name,
        push_enabled: false,
    };
    backend.devices.insert(device.id, device.clone());
    (StatusCode::CREATED, Json(device)).into_response()
}

async fn update_device(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(patch): Json<Map<String, Value>>,
) -> Response {
    let mut backend = db.write().await;
    let Some(device) = backend.devices.get_mut(&id) else {
        return device_not_found();
    };
    if let Some(name) = patch.get("name").and_then(Value::as_str) {
        device.name = name.to_string();
    }
    if let Some(enabled) = patch.get("push_enabled").and_then(Value::as_bool) {
        device.push_enabled = enabled;
    }
    Json(device.clone()).into_response()
}

async fn delete_device(State(db): State<Db>, Path(id): Path<Uuid>) -> Response {
    let mut backend = db.write().await;
    match backend.devices.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => device_not_found(),
    }
}

fn device_not_found() -> Response {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "device_account_not_found",
        "device account not found",
    )
    .into_response()
}

async fn reject_transaction(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(_input): Json<Reject>,
) -> Response {
    let mut backend = db.write().await;
    if backend.login_transactions.remove(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "login_transaction_not_found",
            "login transaction not found",
        )
        .into_response()
    }
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<HashMap<String, String>> {
    Json(params)
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}
