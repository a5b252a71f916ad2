//! DocChase - document collection backend for accounting practices
//!
//! Chases clients for documents over WhatsApp, follows up on a reminder
//! schedule, answers simple questions with an AI assistant and files what
//! comes back into the accountant's Google Drive.

pub mod account;
pub mod api;
pub mod assistant;
pub mod auth;
pub mod billing;
pub mod blog;
pub mod campaigns;
pub mod chase;
pub mod clients;
pub mod config;
pub mod context;
pub mod conversion;
pub mod db;
pub mod documents;
pub mod drive;
pub mod error;
pub mod jobs;
pub mod mailer;
pub mod messaging;
pub mod metrics;
pub mod notifications;
pub mod rate_limit;
pub mod server;
pub mod validation;
