//! Federation client
//!
//! Public entry points: signed delivery (POST) and signed fetch (GET).
//! Each call runs Key -> Sign -> Dispatch -> (Decode) and stops at the
//! first failing stage.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use super::dispatcher::{Direction, RawResponse, ReqwestTransport, RequestDispatcher, Transport};
use super::keys::KeyProvider;
use super::signature::{key_id_matches_actor, sign_request};
use crate::config::AppConfig;
use crate::error::AppError;

/// Content type for ActivityStreams payloads
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// Accept header sent with signed fetches
pub const ACCEPT_ACTIVITY: &str = "application/activity+json, application/ld+json";

/// Anything that can be delivered: a content type and the exact bytes to send.
pub trait OutboundObject: Send + Sync {
    fn content_type(&self) -> &str;

    fn to_bytes(&self) -> Result<Vec<u8>, AppError>;
}

impl OutboundObject for serde_json::Value {
    fn content_type(&self) -> &str {
        ACTIVITY_JSON
    }

    fn to_bytes(&self) -> Result<Vec<u8>, AppError> {
        serde_json::to_vec(self).map_err(|e| AppError::Serialize(e.to_string()))
    }
}

/// Any serializable value sent as `application/activity+json`
#[derive(Debug, Clone)]
pub struct ActivityJson<T>(pub T);

impl<T: Serialize + Send + Sync> OutboundObject for ActivityJson<T> {
    fn content_type(&self) -> &str {
        ACTIVITY_JSON
    }

    fn to_bytes(&self) -> Result<Vec<u8>, AppError> {
        serde_json::to_vec(&self.0).map_err(|e| AppError::Serialize(e.to_string()))
    }
}

/// Pre-serialized payload
#[derive(Debug, Clone)]
pub struct RawObject {
    pub content_type: String,
    pub bytes: Bytes,
}

impl OutboundObject for RawObject {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn to_bytes(&self) -> Result<Vec<u8>, AppError> {
        Ok(self.bytes.to_vec())
    }
}

/// Client behaviour that does not come from collaborators
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Deadline per request
    pub timeout: Duration,
    /// Turn non-2xx inbox responses into `HttpStatus` errors
    pub strict_delivery_status: bool,
    /// Parallel deliveries in `deliver_many`
    pub max_concurrency: usize,
}

impl ClientOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.instance.user_agent.clone(),
            timeout: config.http.timeout(),
            strict_delivery_status: config.delivery.strict_status,
            max_concurrency: config.delivery.max_concurrency,
        }
    }
}

/// Result of a delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// Target inbox URI
    pub inbox_uri: String,
    /// Whether delivery succeeded
    pub success: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// HTTP status code if available
    pub status_code: Option<u16>,
}

/// Signed federation client
///
/// Cheap to clone; clones share the key provider and transport.
#[derive(Clone)]
pub struct FederationClient {
    keys: Arc<dyn KeyProvider>,
    dispatcher: RequestDispatcher,
    user_agent: Arc<str>,
    strict_delivery_status: bool,
    max_concurrency: usize,
}

impl FederationClient {
    /// Create new client
    ///
    /// # Arguments
    /// * `keys` - Source of actor keypairs
    /// * `transport` - Network transport
    /// * `options` - User-Agent, timeout and delivery policy
    pub fn new(
        keys: Arc<dyn KeyProvider>,
        transport: Arc<dyn Transport>,
        options: ClientOptions,
    ) -> Self {
        Self {
            keys,
            dispatcher: RequestDispatcher::new(transport, options.timeout),
            user_agent: Arc::from(options.user_agent),
            strict_delivery_status: options.strict_delivery_status,
            max_concurrency: options.max_concurrency.max(1),
        }
    }

    /// Create a client using a reqwest transport configured from `config`
    pub fn from_config(config: &AppConfig, keys: Arc<dyn KeyProvider>) -> Result<Self, AppError> {
        let options = ClientOptions::from_config(config);
        let http_client = ReqwestTransport::build_client(&options.user_agent, options.timeout)?;
        let transport = ReqwestTransport::new(Arc::new(http_client), config.http.max_response_bytes);

        Ok(Self::new(keys, Arc::new(transport), options))
    }

    /// Deliver an object to a remote inbox
    ///
    /// # Arguments
    /// * `actor_id` - Local actor signing the request
    /// * `inbox_uri` - Target inbox URL
    /// * `object` - Object to deliver
    ///
    /// # Errors
    /// Key lookup, signing or transport failures. A non-2xx response is
    /// only an error when strict delivery status is configured.
    pub async fn deliver<O>(&self, actor_id: &str, inbox_uri: &str, object: &O) -> Result<(), AppError>
    where
        O: OutboundObject + ?Sized,
    {
        // 1. Serialize object
        let body = Bytes::from(object.to_bytes()?);

        let status = self
            .deliver_bytes(actor_id, inbox_uri, object.content_type(), body)
            .await?;

        if self.strict_delivery_status && !is_success(status) {
            return Err(AppError::HttpStatus { code: status });
        }
        Ok(())
    }

    /// Sign and POST `body`, returning the inbox's HTTP status
    ///
    /// Non-2xx statuses are logged, not turned into errors.
    async fn deliver_bytes(
        &self,
        actor_id: &str,
        inbox_uri: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<u16, AppError> {
        // 2. Sign request
        let headers = self
            .signed_headers(
                actor_id,
                &Method::POST,
                inbox_uri,
                Some(body.as_ref()),
                &[("Content-Type", content_type)],
            )
            .await?;

        // 3. POST to inbox with signed headers
        let response = self
            .dispatcher
            .send(Direction::Deliver, Method::POST, inbox_uri, headers, Some(body))
            .await?;

        // 4. Handle response
        if !response.is_success() {
            tracing::warn!(
                inbox = %inbox_uri,
                actor = %actor_id,
                status = response.status,
                body = %body_excerpt(&response),
                "Inbox rejected activity"
            );
            return Ok(response.status);
        }

        tracing::info!(inbox = %inbox_uri, actor = %actor_id, "Delivered activity");
        Ok(response.status)
    }

    /// Fetch a remote object with a signed GET
    ///
    /// # Errors
    /// - `HttpStatus` for non-2xx responses (the body is not decoded)
    /// - `Decode` if the body is not valid JSON for `T`
    pub async fn fetch_signed<T>(&self, url: &str, actor_id: &str) -> Result<T, AppError>
    where
        T: DeserializeOwned,
    {
        let headers = self
            .signed_headers(
                actor_id,
                &Method::GET,
                url,
                None,
                &[("Accept", ACCEPT_ACTIVITY)],
            )
            .await?;

        let response = self
            .dispatcher
            .send(Direction::Fetch, Method::GET, url, headers, None)
            .await?
            .ensure_success()?;

        let object = serde_json::from_slice(&response.body).map_err(|e| {
            tracing::debug!(url = %url, error = %e, "Fetched object is not valid JSON");
            AppError::Decode(e.to_string())
        })?;

        tracing::debug!(url = %url, actor = %actor_id, "Fetched remote object");
        Ok(object)
    }

    /// Fetch the PEM public key published at `key_id`
    ///
    /// The owning actor document is fetched with a signed GET. Its `id` must
    /// own `key_id`, and its `publicKey.id` must equal `key_id` whenever it is
    /// present (it is required when `key_id` carries a fragment).
    pub async fn fetch_public_key(&self, key_id: &str, actor_id: &str) -> Result<String, AppError> {
        let actor_url = key_id.split('#').next().unwrap_or(key_id);
        let actor: serde_json::Value = self.fetch_signed(actor_url, actor_id).await?;

        let id = actor
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| AppError::Decode("Missing id in actor".to_string()))?;
        if !key_id_matches_actor(key_id, id) {
            return Err(AppError::Decode(format!(
                "Actor document {} does not own key {}",
                id, key_id
            )));
        }

        let public_key = actor
            .get("publicKey")
            .ok_or_else(|| AppError::Decode("Missing publicKey in actor".to_string()))?;

        match public_key.get("id").and_then(|id| id.as_str()) {
            Some(advertised_key_id) if advertised_key_id != key_id => {
                return Err(AppError::Decode(
                    "keyId does not match actor public key id".to_string(),
                ));
            }
            None if key_id.contains('#') => {
                return Err(AppError::Decode("Missing publicKey.id in actor".to_string()));
            }
            _ => {}
        }

        public_key
            .get("publicKeyPem")
            .and_then(|pem| pem.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::Decode("Missing publicKeyPem in actor".to_string()))
    }

    /// Deliver one object to many inboxes
    ///
    /// Identical inbox URIs are delivered once. Deliveries run concurrently up
    /// to the configured limit; failures are reported per inbox, not retried.
    pub async fn deliver_many<O>(
        &self,
        actor_id: &str,
        inbox_uris: Vec<String>,
        object: &O,
    ) -> Vec<DeliveryResult>
    where
        O: OutboundObject + ?Sized,
    {
        let total_targets = inbox_uris.len();
        let delivery_targets = unique_inbox_targets(inbox_uris);

        let body = match object.to_bytes() {
            Ok(body) => Bytes::from(body),
            Err(error) => {
                tracing::error!(%error, "Failed to serialize object for delivery");
                return delivery_targets
                    .into_iter()
                    .map(|inbox_uri| failed_result(inbox_uri, &error))
                    .collect();
            }
        };

        tracing::info!(
            "Delivering to {} unique inboxes (deduplicated from {} total)",
            delivery_targets.len(),
            total_targets
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let content_type: Arc<str> = Arc::from(object.content_type());
        let actor_id: Arc<str> = Arc::from(actor_id);

        let mut tasks = Vec::with_capacity(delivery_targets.len());
        for inbox_uri in delivery_targets {
            let target = inbox_uri.clone();
            let semaphore = semaphore.clone();
            let client = self.clone();
            let body = body.clone();
            let content_type = content_type.clone();
            let actor_id = actor_id.clone();

            let task = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return failed_result(
                            inbox_uri,
                            &AppError::Network("delivery cancelled".to_string()),
                        );
                    }
                };

                let result = client
                    .deliver_bytes(&actor_id, &inbox_uri, &content_type, body)
                    .await;

                match result {
                    Ok(status) if is_success(status) => DeliveryResult {
                        inbox_uri,
                        success: true,
                        error: None,
                        status_code: Some(status),
                    },
                    Ok(status) => failed_result(inbox_uri, &AppError::HttpStatus { code: status }),
                    Err(error) => failed_result(inbox_uri, &error),
                }
            });

            tasks.push((target, task));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (inbox_uri, task) in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(error) => {
                    tracing::error!(inbox = %inbox_uri, %error, "Delivery task failed");
                    let error = AppError::Network(format!("delivery task aborted: {}", error));
                    results.push(failed_result(inbox_uri, &error));
                }
            }
        }

        let success_count = results.iter().filter(|r| r.success).count();
        tracing::info!(
            "Batch delivery complete: {} succeeded, {} failed",
            success_count,
            results.len() - success_count
        );

        results
    }

    /// Look up the actor's keypair and sign. The keypair is dropped on return.
    async fn signed_headers(
        &self,
        actor_id: &str,
        method: &Method,
        url: &str,
        body: Option<&[u8]>,
        extra_headers: &[(&str, &str)],
    ) -> Result<Vec<(String, String)>, AppError> {
        let keypair = self.keys.keypair(actor_id).await.map_err(|error| {
            tracing::warn!(actor = %actor_id, %error, "Keypair lookup failed");
            error
        })?;

        let mut extras = Vec::with_capacity(extra_headers.len() + 1);
        extras.extend_from_slice(extra_headers);
        extras.push(("User-Agent", self.user_agent.as_ref()));

        let signed = sign_request(method, url, body, keypair.signing_key(), &extras)?;
        Ok(signed.into_iter().collect())
    }
}

fn failed_result(inbox_uri: String, error: &AppError) -> DeliveryResult {
    DeliveryResult {
        inbox_uri,
        success: false,
        error: Some(error.to_string()),
        status_code: error.status_code(),
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn body_excerpt(response: &RawResponse) -> String {
    const MAX_EXCERPT: usize = 256;
    let end = response.body.len().min(MAX_EXCERPT);
    String::from_utf8_lossy(&response.body[..end]).into_owned()
}

/// Deduplicate identical inbox URIs while keeping distinct personal inboxes.
fn unique_inbox_targets(inbox_uris: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    inbox_uris
        .into_iter()
        .filter(|inbox_uri| seen.insert(inbox_uri.clone()))
        .collect()
}
