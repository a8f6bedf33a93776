//! fedsign - signed federation requests for ActivityPub servers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   FederationClient                          │
//! │  - deliver(actor, inbox, object)     signed POST            │
//! │  - fetch_signed(url, actor)          signed GET             │
//! └─────────────────────────────────────────────────────────────┘
//!        │                   │                      │
//! ┌──────────────┐  ┌──────────────────┐  ┌──────────────────────┐
//! │ KeyProvider  │  │ sign_request     │  │ RequestDispatcher    │
//! │ (key store)  │  │ (HTTP Signature) │  │ (Transport+deadline) │
//! └──────────────┘  └──────────────────┘  └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `federation`: keys, signatures, dispatch and the client
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod config;
pub mod error;
pub mod federation;
pub mod metrics;

pub use error::{AppError, Result};
pub use federation::{FederationClient, KeyProvider, Keypair, Transport};
