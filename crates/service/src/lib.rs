//! `tarsy-service` — the alert-response orchestrator: validates an
//! incoming alert, resolves its chain, drives [`tarsy_chain::ChainExecutor`]
//! (or [`tarsy_chain::ResumeCoordinator`] on resume), and exposes the
//! result over HTTP/WebSocket. Binary entrypoint is `tarsyd`.

pub mod alert_service;
pub mod auth;
pub mod bootstrap;
pub mod cancel;
pub mod cli;
pub mod dedupe;
pub mod llm_client;
pub mod report;
pub mod routes;
pub mod state;

pub use state::AppState;
