//! Agent execution engine and repository trait definitions for Agentry.
//!
//! This crate holds the run scheduler, memory, policy, persona, evaluation
//! and approval logic, plus the "ports" (collaborator and repository traits)
//! that the infrastructure layer implements. It depends only on
//! `agentry-types` -- never on `agentry-infra` or any database/IO crate.

pub mod approval;
pub mod engine;
pub mod evaluation;
pub mod event;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod persona;
pub mod policy;
pub mod repository;
pub mod roles;
pub mod service;
pub mod tool;
