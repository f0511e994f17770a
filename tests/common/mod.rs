//! Fake M-Pesa API for integration tests
//!
//! Serves the credential and STK push endpoints on an ephemeral port and
//! records what the adapter sent.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use mpesa_gateway::{BillingDetails, ConnectionParams, GatewayConfig, PaymentData};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub const CHECKOUT_ID: &str = "ws_CO_1";

#[derive(Clone, Default)]
pub struct FakeMpesa {
    token_requests: Arc<AtomicUsize>,
    stk_requests: Arc<AtomicUsize>,
    stk_script: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    stk_delay: Arc<Mutex<Option<Duration>>>,
    token_delay: Arc<Mutex<Option<Duration>>>,
    credential_failure: Arc<Mutex<Option<(StatusCode, String)>>>,
    revoked_tokens: Arc<Mutex<Vec<String>>>,
    bearer_tokens: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl FakeMpesa {
    /// Start the fake server and return it with its base URL
    pub async fn start() -> (Self, String) {
        let fake = FakeMpesa::default();
        let app = Router::new()
            .route("/oauth/v1/generate", get(generate_token))
            .route("/mpesa/stkpush/v1/processrequest", post(stk_push))
            .with_state(fake.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (fake, format!("http://{}/", addr))
    }

    /// Queue a response for the next STK push call; unscripted calls succeed
    pub async fn push_stk_response(&self, status: StatusCode, body: impl Into<String>) {
        self.stk_script.lock().await.push_back((status, body.into()));
    }

    pub async fn set_stk_delay(&self, delay: Duration) {
        *self.stk_delay.lock().await = Some(delay);
    }

    pub async fn set_token_delay(&self, delay: Duration) {
        *self.token_delay.lock().await = Some(delay);
    }

    pub async fn fail_credentials(&self, status: StatusCode, body: impl Into<String>) {
        *self.credential_failure.lock().await = Some((status, body.into()));
    }

    /// STK calls bearing `token` are answered with "Invalid Access Token"
    pub async fn revoke_token(&self, token: &str) {
        self.revoked_tokens.lock().await.push(token.to_string());
    }

    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn stk_requests(&self) -> usize {
        self.stk_requests.load(Ordering::SeqCst)
    }

    pub async fn bearer_tokens(&self) -> Vec<String> {
        self.bearer_tokens.lock().await.clone()
    }

    pub async fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().await.clone()
    }
}

async fn generate_token(State(fake): State<FakeMpesa>, headers: HeaderMap) -> (StatusCode, String) {
    let n = fake.token_requests.fetch_add(1, Ordering::SeqCst) + 1;

    let delay = *fake.token_delay.lock().await;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if let Some((status, body)) = fake.credential_failure.lock().await.clone() {
        return (status, body);
    }

    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !basic {
        return (
            StatusCode::BAD_REQUEST,
            json!({"errorMessage": "Invalid Authentication passed"}).to_string(),
        );
    }

    (
        StatusCode::OK,
        json!({"access_token": format!("token-{}", n), "expires_in": "3599"}).to_string(),
    )
}

async fn stk_push(
    State(fake): State<FakeMpesa>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    fake.stk_requests.fetch_add(1, Ordering::SeqCst);

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    fake.bearer_tokens.lock().await.push(bearer.clone());
    fake.bodies.lock().await.push(body);

    let delay = *fake.stk_delay.lock().await;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if fake.revoked_tokens.lock().await.contains(&bearer) {
        return (
            StatusCode::UNAUTHORIZED,
            json!({"errorCode": "404.001.03", "errorMessage": "Invalid Access Token"}).to_string(),
        );
    }

    match fake.stk_script.lock().await.pop_front() {
        Some(scripted) => scripted,
        None => (
            StatusCode::OK,
            json!({
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": CHECKOUT_ID,
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            })
            .to_string(),
        ),
    }
}

pub fn gateway_config(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        gateway_name: "Mpesa".to_string(),
        auto_capture: false,
        connection_params: ConnectionParams {
            consumer_key: "consumer-key".to_string(),
            consumer_secret: "consumer-secret".to_string(),
            base_url: base_url.to_string(),
            shortcode: "174379".to_string(),
            passkey: "passkey".to_string(),
            callback_url: "https://shop.example/mpesa/callback".to_string(),
            initiator_name: "apitest425".to_string(),
            initiator_security_credential: None,
        },
    }
}

pub fn payment() -> PaymentData {
    PaymentData {
        amount: dec!(1500),
        currency: "KES".to_string(),
        billing: Some(BillingDetails {
            phone: "+254 712 345 678".to_string(),
        }),
        token: "payment-token-1".to_string(),
        reference: None,
    }
}
