//! Growth Audit Wizard Library
//!
//! Core of the growth-audit questionnaire: step sequencing, per-session
//! persistent storage, URL attribution capture, the enrichment wait and the
//! client for the remote audit webhooks, plus the JSON HTTP surface the
//! front end talks to.
//!
//! # Modules
//!
//! - `audit_client`: Remote audit webhook client.
//! - `checksum`: Integrity envelope for stored values.
//! - `circuit_breaker`: Breaker guarding best-effort state snapshots.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema.
//! - `enrichment_wait`: Waiting for website analysis results.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Answer record, company profile and results models.
//! - `sequencer`: Step sequence state machine.
//! - `storage`: Per-session key-value store.
//! - `url_params`: Attribution parameter capture and merge.
//! - `validation`: Answer predicates and normalizers.
//! - `webhook_models`: Webhook request/response payloads.
//! - `wizard`: One browser's audit run.

pub mod audit_client;
pub mod checksum;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod enrichment_wait;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod sequencer;
pub mod storage;
pub mod url_params;
pub mod validation;
pub mod webhook_models;
pub mod wizard;
