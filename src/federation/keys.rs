//! Actor keypairs
//!
//! The federation client never owns key material. It asks a [`KeyProvider`]
//! for the actor's keypair right before signing and drops it once the
//! signature has been computed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::sync::RwLock;

use crate::error::AppError;

/// Actor keypair as handed out by key storage
#[derive(Clone)]
pub struct Keypair {
    /// Actor the keypair belongs to
    pub owner_id: String,
    /// RSA private key (PEM, PKCS#8 or PKCS#1)
    pub private_key_pem: String,
    /// Full URL of the public key (actor#main-key)
    pub key_id: String,
}

impl Keypair {
    /// Borrow the parts needed for signing.
    pub fn signing_key(&self) -> SigningKey<'_> {
        SigningKey {
            private_key_pem: &self.private_key_pem,
            key_id: &self.key_id,
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("owner_id", &self.owner_id)
            .field("private_key_pem", &"<redacted>")
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Borrowed signing material for a single request
#[derive(Clone, Copy)]
pub struct SigningKey<'a> {
    pub private_key_pem: &'a str,
    pub key_id: &'a str,
}

impl fmt::Debug for SigningKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Source of actor keypairs
///
/// Implementations may hit storage; the call is awaited before any
/// network I/O happens for the request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Look up the keypair of `actor_id`
    ///
    /// # Errors
    /// `AppError::KeyNotFound` if the actor has no usable keypair
    async fn keypair(&self, actor_id: &str) -> Result<Keypair, AppError>;
}

#[async_trait]
impl<T: KeyProvider + ?Sized> KeyProvider for Arc<T> {
    async fn keypair(&self, actor_id: &str) -> Result<Keypair, AppError> {
        (**self).keypair(actor_id).await
    }
}

/// In-process key store
///
/// Key IDs are derived from the site URL as `<base>/users/<id>#main-key`.
#[derive(Clone)]
pub struct InMemoryKeyStore {
    base_url: String,
    keys: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryKeyStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Key ID this store publishes for `actor_id`
    pub fn key_id_for(&self, actor_id: &str) -> String {
        format!("{}/users/{}#main-key", self.base_url, actor_id)
    }

    /// Store (or replace) the private key of an actor
    pub async fn insert(&self, actor_id: impl Into<String>, private_key_pem: impl Into<String>) {
        let mut keys = self.keys.write().await;
        keys.insert(actor_id.into(), private_key_pem.into());
    }

    /// Forget an actor's key
    pub async fn remove(&self, actor_id: &str) -> bool {
        let mut keys = self.keys.write().await;
        keys.remove(actor_id).is_some()
    }
}

#[async_trait]
impl KeyProvider for InMemoryKeyStore {
    async fn keypair(&self, actor_id: &str) -> Result<Keypair, AppError> {
        let keys = self.keys.read().await;
        let private_key_pem = keys
            .get(actor_id)
            .ok_or_else(|| AppError::KeyNotFound(actor_id.to_string()))?;

        Ok(Keypair {
            owner_id: actor_id.to_string(),
            private_key_pem: private_key_pem.clone(),
            key_id: self.key_id_for(actor_id),
        })
    }
}

/// PEM-encoded RSA keypair
#[derive(Clone)]
pub struct GeneratedKeys {
    /// PKCS#8 private key
    pub private_key_pem: String,
    /// SPKI public key
    pub public_key_pem: String,
}

/// Generate a fresh RSA keypair in PEM form
///
/// Production actors use 4096 bits; tests may use less.
pub fn generate_rsa_keypair(bits: usize) -> Result<GeneratedKeys, AppError> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| AppError::InvalidKey(format!("Key generation failed: {}", e)))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AppError::InvalidKey(e.to_string()))?
        .to_string();
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AppError::InvalidKey(e.to_string()))?;

    Ok(GeneratedKeys {
        private_key_pem,
        public_key_pem,
    })
}
