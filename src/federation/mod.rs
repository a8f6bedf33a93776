//! ActivityPub federation module
//!
//! Handles:
//! - Actor keypair lookup
//! - HTTP Signatures (signing and verification)
//! - Request dispatch with deadlines
//! - Signed delivery and signed fetch

mod client;
mod dispatcher;
mod keys;
mod signature;

pub use client::{
    ACCEPT_ACTIVITY, ACTIVITY_JSON, ActivityJson, ClientOptions, DeliveryResult, FederationClient,
    OutboundObject, RawObject,
};
pub use dispatcher::{
    Direction, RawResponse, ReqwestTransport, RequestDispatcher, Transport, TransportRequest,
};
pub use keys::{
    GeneratedKeys, InMemoryKeyStore, KeyProvider, Keypair, SigningKey, generate_rsa_keypair,
};
pub use signature::{
    ParsedSignature, SignedHeaders, extract_signature_key_id, generate_digest, host_and_target,
    key_id_matches_actor, parse_signature_header, sign_request, sign_request_at, verify_signature,
};
