//! Registration, login, token refresh, and access-token resolution.
//!
//! Provides:
//! - Registration with ordered validation: password confirmation first,
//!   then email shape, then store-level uniqueness
//! - Login with username-enumeration resistance and a disabled-account check
//! - Refresh-token exchange that rotates the full token pair
//! - Access-token resolution used by the gateway's authorization gate
//!
//! ## Design Decisions
//! - A login naming an unknown user and one with a wrong password both fail
//!   with the same `InvalidCredentials` error, and the unknown-user path
//!   burns a dummy password verification so the two cost the same.
//! - All persistence goes through the `CredentialStore` trait object; the
//!   flows run unchanged against SQLite in production and the in-memory
//!   store in tests.
//! - Every operation takes the current instant as a parameter instead of
//!   reading the clock, so timestamp and expiry behavior is exact in tests.

pub mod service;

pub use service::{AuthError, AuthService, Registration};
