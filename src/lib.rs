//! Self-hosted account registration, login, and signed session tokens.
//!
//! Layers, innermost first: [`account`] owns credential records and their
//! persistence, [`password`] hashes and verifies passwords, [`token`] mints
//! and validates the HMAC-signed access/refresh pair, [`auth`] wires those
//! three into the registration/login/refresh flows, and [`gateway`] exposes
//! them over HTTP.

pub mod account;
pub mod auth;
pub mod config;
pub mod gateway;
pub mod password;
pub mod token;
