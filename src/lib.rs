//! Client-side lifecycle controller for world generation jobs.
//!
//! Submits generation requests to a remote service, polls their status until
//! they finish, keeps a short list of recent jobs and retrieves the generated
//! world files.

pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod service;
mod text_summary;
