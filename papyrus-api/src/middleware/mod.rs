//! Axum middleware.

mod secret;

pub use secret::{require_secret, SecretGate, SECRET_HEADER, SECRET_QUERY_PARAM};
