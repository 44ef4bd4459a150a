//! Surprise Sender: session state and campaign tooling for a bulk email/SMS sender.
//!
//! The session store owns the signed-in user, the account registry, capped
//! activity logs, SMTP configurations and drafts, persisted to Sled.
//! Sending is simulated by the dispatcher; text suggestions go through a
//! pluggable provider (Gemini by default), which also answers the support chat.
//! Agents are purpose-built composers with their own templates and drafts.

pub mod models;
pub mod storage;
pub mod role;
pub mod activity;
pub mod drafts;
pub mod smtp;
pub mod auth;
pub mod session;
pub mod autosave;
pub mod dispatch;
pub mod agents;
pub mod ai;
pub mod support;
pub mod config;
pub mod telemetry;
// REST API module: Axum HTTP handlers on port 11111
pub mod rest;
