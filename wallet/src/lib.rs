// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Wallet: Payment Build Session Engine
//!
//! Everything a wallet does between "the user started typing into the send
//! form" and "this exact payment may be signed". Input arrives faster than
//! lookups resolve, the user may edit the form after reviewing it, and the
//! UI may close at any moment. This crate keeps that race-free.
//!
//! ## Architecture
//!
//! - **account**: ledger addresses (`nova1…`).
//! - **amount**: fixed-point parsing, conversion and display. No floats.
//! - **resolver**: the amount field: outside currency or native, with worth.
//! - **checklist**: per-call readiness flags.
//! - **slot**: preempting gate; newest input wins.
//! - **registry**: the table of live builds and RAII leases on them.
//! - **build**: payment and request validation, snapshot freezing.
//! - **review**: the numbered notify/acknowledge protocol with the UI.
//! - **guard**: send must match the reviewed snapshot exactly.
//! - **cache**: the lookup collaborator and its in-memory implementation.
//! - **service**: [`PaymentBuildService`], the entry point.
//! - **config**: ledger limits and tunables.
//!
//! ## Flow
//!
//! ```text
//! start ─► build* ─► review ─► send (check) ─► stop
//!            │          │           │
//!            │          │           └─ MismatchedField / NotReadyToSend
//!            │          └─ spinning → enabled (+ack)
//!            └─ freeze snapshot when every field passes
//! ```

pub mod account;
pub mod amount;
pub mod build;
pub mod cache;
pub mod checklist;
pub mod config;
pub mod error;
pub mod guard;
pub mod registry;
pub mod resolver;
pub mod review;
pub mod service;
pub mod session;
pub mod slot;
pub mod types;

pub use account::{AccountId, AccountIdError};
pub use build::{BuildPaymentArgs, BuildPaymentResult, BuildRequestArgs, BuildRequestResult};
pub use cache::{AccountOwnership, BuildPaymentCache, CacheError, MemoryCache, Recipient};
pub use config::BuildConfig;
pub use error::{BuildError, PaymentField};
pub use review::{NotifyError, PaymentReviewed, ReviewNotifier};
pub use service::PaymentBuildService;
pub use session::{ApprovedPayment, FrozenPayment, SendPaymentArgs, SessionData};
pub use types::{
    Asset, BannerLevel, BuildPaymentId, ExchangeRate, NextButton, OutsideCurrencyCode,
    SendBanner, SessionId,
};
