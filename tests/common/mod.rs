//! Common test utilities for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fedsign::federation::{
    ClientOptions, FederationClient, GeneratedKeys, InMemoryKeyStore, RawResponse,
    ReqwestTransport, Transport, TransportRequest, generate_rsa_keypair,
};
use fedsign::AppError;
use http::HeaderMap;

pub const BASE_URL: &str = "https://example.test";
pub const ACTOR: &str = "A";
pub const KEY_ID: &str = "https://example.test/users/A#main-key";

/// One RSA keypair shared by every test in the binary
pub fn test_keys() -> &'static GeneratedKeys {
    static KEYS: OnceLock<GeneratedKeys> = OnceLock::new();
    KEYS.get_or_init(|| generate_rsa_keypair(1024).expect("key generation should work"))
}

/// Key store holding actor A
pub async fn key_store() -> Arc<InMemoryKeyStore> {
    let store = InMemoryKeyStore::new(BASE_URL);
    store.insert(ACTOR, test_keys().private_key_pem.clone()).await;
    Arc::new(store)
}

pub fn options(timeout: Duration) -> ClientOptions {
    ClientOptions {
        user_agent: "fedsign-tests/0.1".to_string(),
        timeout,
        strict_delivery_status: false,
        max_concurrency: 4,
    }
}

/// Client over the real reqwest transport
pub async fn reqwest_client(timeout: Duration, max_response_bytes: usize) -> FederationClient {
    let http_client = ReqwestTransport::build_client("fedsign-tests/0.1", timeout)
        .expect("http client");
    let transport = ReqwestTransport::new(Arc::new(http_client), max_response_bytes);
    FederationClient::new(key_store().await, Arc::new(transport), options(timeout))
}

/// Transport that records requests and answers with a canned response
#[derive(Clone)]
pub struct RecordingTransport {
    pub requests: Arc<Mutex<Vec<TransportRequest>>>,
    status: u16,
    body: Bytes,
}

impl RecordingTransport {
    pub fn new(status: u16, body: &'static str) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            status,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    pub fn recorded(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn call(&self, request: TransportRequest) -> Result<RawResponse, AppError> {
        self.requests.lock().expect("lock").push(request);
        Ok(RawResponse {
            status: self.status,
            headers: HeaderMap::new(),
            body: self.body.clone(),
        })
    }
}

/// Header map as a receiving server would see it
pub fn header_map(request: &TransportRequest) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in &request.headers {
        map.append(
            http::HeaderName::from_bytes(name.as_bytes()).expect("header name"),
            http::HeaderValue::from_str(value).expect("header value"),
        );
    }
    map
}
