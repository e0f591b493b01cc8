//! Infrastructure layer for Agentry.
//!
//! Contains implementations of the ports defined in `agentry-core`:
//! SQLite storage for every repository, HTTP clients for the completion
//! gateway, the tool service and the notification service, and the
//! `config.toml` loader.

pub mod config;
pub mod llm;
pub mod notify;
pub mod sqlite;
pub mod tool;
