//! Verify OpenID Connect ID tokens against a client id and extract the subject.
//!
//! The verification capability (`services::auth::TokenVerifier`) is kept apart from
//! argument and configuration parsing (`cli`, `config`) so it can be embedded on its own.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
