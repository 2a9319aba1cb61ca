//! EduPulse Server - API backend for the EduPulse learning platform
//!
//! Architecture:
//! - REST API: auth, assignments, pathways, points, achievements, tutoring,
//!   academic integrity, privacy and portfolios
//! - Points economy: rate limiting (rule engine) and fraud scoring in front
//!   of every learner award, achievement evaluation after it
//! - Tutor proxy: forwards tutoring conversations to an external AI service
//! - WebSocket: per-user push notifications
//!
//! Key invariants:
//! - A user's balance is the sum of their ledger and never goes negative
//! - Every award is either recorded in full (possibly capped) or refused
//!   with a fraud log entry explaining why
//! - Consent and privacy requests are append-only history

pub mod achievements;
pub mod analysis;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fraud;
pub mod models;
pub mod observability;
pub mod points;
pub mod privacy;
pub mod rule_engine;
pub mod similarity;
pub mod state;
pub mod tutor_proxy;
pub mod websocket;

pub use config::ServerConfig;
pub use db::DbPool;
pub use error::{ApiError, ApiResult};
pub use observability::{init_sentry, AuditEventType, AuditLogger};
pub use rule_engine::RuleEngine;
pub use state::AppState;
